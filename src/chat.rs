use crate::error::Result;
use crate::session::SessionEvent;
use crate::stomp::Publisher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// История чата в порядке прихода; только добавление
#[derive(Debug, Default, Clone)]
pub struct ChatLog {
    entries: Vec<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: String) {
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// текст по каналу
pub struct ChatRelay<S: ?Sized> {
    publisher: Arc<S>,
    destination: String,
    log: ChatLog,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<S: Publisher + ?Sized> ChatRelay<S> {
    pub fn new(
        publisher: Arc<S>,
        destination: impl Into<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            publisher,
            destination: destination.into(),
            log: ChatLog::new(),
            events,
        }
    }

    /// Публикует текст как есть. Подтверждения доставки нет.
    pub async fn send(&self, text: &str) -> Result<()> {
        debug!("send_text called with {} bytes", text.len());
        self.publisher.publish(&self.destination, text).await
    }

    pub fn receive(&mut self, text: String) {
        self.log.append(text.clone());
        let _ = self.events.send(SessionEvent::ChatMessage(text));
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        offline: bool,
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, destination: &str, body: &str) -> Result<()> {
            if self.offline {
                return Err(CallError::ChannelDisconnected);
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_publishes_raw_text() {
        let rec = Arc::new(Recorder::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let relay = ChatRelay::new(rec.clone(), "/app/send", tx);
        relay.send("hello {not json}").await.unwrap();
        assert_eq!(
            rec.sent.lock().unwrap().as_slice(),
            &[("/app/send".to_string(), "hello {not json}".to_string())]
        );
    }

    #[tokio::test]
    async fn send_fails_when_channel_is_gone() {
        let rec = Arc::new(Recorder {
            offline: true,
            ..Default::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let relay = ChatRelay::new(rec, "/app/send", tx);
        assert!(matches!(
            relay.send("hi").await,
            Err(CallError::ChannelDisconnected)
        ));
    }

    #[test]
    fn received_messages_keep_arrival_order_and_duplicates() {
        let rec = Arc::new(Recorder::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut relay = ChatRelay::new(rec, "/app/send", tx);
        let incoming = ["b", "a", "a", "", "c"];
        for m in incoming {
            relay.receive(m.to_string());
        }
        assert_eq!(relay.log().entries(), &incoming.map(String::from));

        let mut seen = Vec::new();
        while let Ok(SessionEvent::ChatMessage(m)) = rx.try_recv() {
            seen.push(m);
        }
        assert_eq!(seen, incoming.map(String::from).to_vec());
    }
}
