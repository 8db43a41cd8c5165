use crate::peer::state::CallState;
use thiserror::Error;

/// Ошибки звонка: всё, что может вернуть сессия, реле чата или клиент
#[derive(Debug, Error)]
pub enum CallError {
    /// Доступ к камере/микрофону запрещён или устройство недоступно
    #[error("media access denied: {0}")]
    MediaAccess(String),

    /// Сигнальный канал закрыт; отправка не выполняется и не ставится в очередь
    #[error("signaling channel disconnected")]
    ChannelDisconnected,

    #[error("malformed signal: {0}")]
    MalformedSignal(String),

    #[error("negotiation already in progress (state: {0})")]
    NegotiationInProgress(CallState),

    #[error("unexpected {signal} in state {state}")]
    UnexpectedSignal {
        signal: &'static str,
        state: CallState,
    },

    #[error("remote description already applied for this call")]
    RemoteDescriptionAlreadySet,

    /// Сессия в состоянии Failed или уже закрыта
    #[error("call session terminated")]
    Terminated,

    #[error("webrtc error: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::MalformedSignal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
