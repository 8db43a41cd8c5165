// Конфигурация клиента
// Уровень логирования по умолчанию зависит от типа сборки

use crate::media::MediaConstraints;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "callroom_lib=debug,callroom=debug,webrtc=warn"; // В режиме отладки подробный лог

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "warn"; // В продакшене только предупреждения

pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:8080/chat/websocket";
pub const DEFAULT_CHAT_TOPIC: &str = "/topic/messages";
pub const DEFAULT_SIGNAL_TOPIC: &str = "/topic/ice-candidates";
pub const DEFAULT_SEND_DESTINATION: &str = "/app/send";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub video: bool,
    pub audio: bool,
    /// Разрешён ли доступ к устройствам захвата
    pub granted: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            granted: true,
        }
    }
}

impl MediaConfig {
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: self.video,
            audio: self.audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub signaling_url: String,
    /// Значение заголовка `host` во фрейме CONNECT
    pub stomp_host: String,
    pub chat_topic: String,
    pub signal_topic: String,
    pub send_destination: String,
    /// Только STUN; TURN не поддерживается
    pub ice_servers: Vec<String>,
    pub media: MediaConfig,
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.into(),
            stomp_host: "localhost".into(),
            chat_topic: DEFAULT_CHAT_TOPIC.into(),
            signal_topic: DEFAULT_SIGNAL_TOPIC.into(),
            send_destination: DEFAULT_SEND_DESTINATION.into(),
            ice_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            media: MediaConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.signaling_url.starts_with("ws://") || self.signaling_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "signaling_url must be a ws:// or wss:// URL, got '{}'",
                self.signaling_url
            )));
        }

        for (name, value) in [
            ("chat_topic", &self.chat_topic),
            ("signal_topic", &self.signal_topic),
            ("send_destination", &self.send_destination),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} cannot be empty")));
            }
        }

        if self.chat_topic == self.signal_topic {
            return Err(ConfigError::Invalid(
                "chat_topic and signal_topic must differ".into(),
            ));
        }

        if self.ice_servers.iter().any(|u| u.trim().is_empty()) {
            return Err(ConfigError::Invalid("ICE server URL cannot be empty".into()));
        }

        if self
            .ice_servers
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
        {
            return Err(ConfigError::Invalid("TURN servers are not supported".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_broker() {
        let c = ClientConfig::default();
        assert_eq!(c.chat_topic, "/topic/messages");
        assert_eq!(c.signal_topic, "/topic/ice-candidates");
        assert_eq!(c.send_destination, "/app/send");
        assert!(c.media.constraints().video && c.media.constraints().audio);
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ClientConfig::from_toml(
            r#"
            signaling_url = "wss://chat.example.org/chat/websocket"

            [media]
            granted = false
            "#,
        )
        .unwrap();
        assert_eq!(c.signaling_url, "wss://chat.example.org/chat/websocket");
        assert!(!c.media.granted);
        assert!(c.media.video);
        assert_eq!(c.send_destination, DEFAULT_SEND_DESTINATION);
    }

    #[test]
    fn rejects_http_url() {
        let err = ClientConfig::from_toml(r#"signaling_url = "http://localhost:8080/chat""#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_turn_servers() {
        let mut c = ClientConfig::default();
        c.ice_servers = vec!["turn:turn.example.org:3478".into()];
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_bad_toml() {
        let err = ClientConfig::from_toml("signaling_url = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
