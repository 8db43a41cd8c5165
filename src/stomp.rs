//! Сигнальный канал: STOMP 1.2 поверх WebSocket.
//!
//! Клиент подписывается на два топика (чат и сигналы) и публикует всё в одну точку
//! отправки. Переподключения нет: после закрытия сокета каждая публикация
//! возвращает [`CallError::ChannelDisconnected`], ничего не ставится в очередь.

use crate::config::ClientConfig;
use crate::error::CallError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

const CHAT_SUBSCRIPTION: &str = "sub-0";
const SIGNAL_SUBSCRIPTION: &str = "sub-1";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("bad STOMP frame: {0}")]
    Frame(String),

    #[error("STOMP handshake failed: {0}")]
    Handshake(String),

    #[error("channel closed")]
    Closed,
}

impl From<ChannelError> for CallError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => CallError::ChannelDisconnected,
            other => CallError::Transport(other.to_string()),
        }
    }
}

// ========== FRAMES ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Значение заголовка; при повторах побеждает первый (STOMP 1.2)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // CONNECT и CONNECTED не экранируются
    fn escapes_headers(&self) -> bool {
        self.command != "CONNECT" && self.command != "CONNECTED"
    }

    pub fn encode(&self) -> String {
        let escape = self.escapes_headers();
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, ChannelError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChannelError::Frame(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Разбирает все фреймы из одного WebSocket-сообщения.
/// Пустые строки между фреймами (heart-beat) пропускаются.
pub fn decode_frames(data: &str) -> Result<Vec<Frame>, ChannelError> {
    let bytes = data.as_bytes();
    let mut pos = 0;
    let mut frames = Vec::new();

    loop {
        while pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let rest = &data[pos..];
        let (head, head_len) = match (rest.find("\n\n"), rest.find("\r\n\r\n")) {
            (Some(a), Some(b)) if b < a => (&rest[..b], b + 4),
            (Some(a), _) => (&rest[..a], a + 2),
            (None, Some(b)) => (&rest[..b], b + 4),
            (None, None) => return Err(ChannelError::Frame("missing header terminator".into())),
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ChannelError::Frame("missing command".into()))?;

        let mut frame = Frame::new(&command);
        let escape = frame.escapes_headers();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| ChannelError::Frame(format!("bad header line: {line}")))?;
            if escape {
                frame.headers.push((unescape_header(k)?, unescape_header(v)?));
            } else {
                frame.headers.push((k.to_string(), v.to_string()));
            }
        }

        let body_start = pos + head_len;
        let body_end = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| ChannelError::Frame(format!("bad content-length: {len}")))?;
                match body_start.checked_add(len).filter(|&e| e < bytes.len()) {
                    Some(end) if bytes[end] == 0 => end,
                    _ => {
                        return Err(ChannelError::Frame(
                            "body shorter than content-length".into(),
                        ))
                    }
                }
            }
            None => bytes[body_start..]
                .iter()
                .position(|b| *b == 0)
                .map(|i| body_start + i)
                .ok_or_else(|| ChannelError::Frame("unterminated frame".into()))?,
        };

        frame.body = std::str::from_utf8(&bytes[body_start..body_end])
            .map_err(|e| ChannelError::Frame(e.to_string()))?
            .to_string();
        frames.push(frame);
        pos = body_end + 1;
    }

    Ok(frames)
}

// ========== CHANNEL ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Chat,
    Signal,
}

/// Сообщение из подписки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: Topic,
    pub body: String,
}

/// Точка публикации сигнального канала
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, destination: &str, body: &str) -> Result<(), CallError>;
}

pub struct StompChannel {
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl StompChannel {
    /// Подключается, проходит STOMP-рукопожатие и подписывается на оба топика.
    /// Входящие сообщения приходят в возвращаемый приёмник.
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>), ChannelError> {
        info!("Connecting to signaling server at {}", config.signaling_url);
        let (ws, _response) = connect_async(config.signaling_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let connect = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", &config.stomp_host)
            .header("heart-beat", "0,0");
        sink.send(Message::Text(connect.encode())).await?;

        // ждём CONNECTED
        loop {
            let msg = stream.next().await.ok_or(ChannelError::Closed)??;
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => return Err(ChannelError::Closed),
                _ => continue,
            };
            let frames = decode_frames(&text)?;
            let Some(frame) = frames.into_iter().next() else {
                continue;
            };
            match frame.command.as_str() {
                "CONNECTED" => {
                    debug!("STOMP session established, version={:?}", frame.get("version"));
                    break;
                }
                "ERROR" => {
                    return Err(ChannelError::Handshake(
                        frame.get("message").unwrap_or(frame.body.as_str()).to_string(),
                    ))
                }
                other => {
                    return Err(ChannelError::Handshake(format!(
                        "unexpected frame before CONNECTED: {other}"
                    )))
                }
            }
        }

        for (id, destination) in [
            (CHAT_SUBSCRIPTION, &config.chat_topic),
            (SIGNAL_SUBSCRIPTION, &config.signal_topic),
        ] {
            let sub = Frame::new("SUBSCRIBE")
                .header("id", id)
                .header("destination", destination)
                .header("ack", "auto");
            sink.send(Message::Text(sub.encode())).await?;
            debug!("Subscribed to {} as {}", destination, id);
        }

        let connected = Arc::new(AtomicBool::new(true));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();

        let writer_flag = connected.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!("Signaling socket write failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_flag.store(false, Ordering::SeqCst);
        });

        let reader_flag = connected.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(frame)) => {
                        info!("Signaling socket closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Signaling socket read failed: {e}");
                        break;
                    }
                };
                let frames = match decode_frames(&text) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!("Dropping undecodable STOMP payload: {e}");
                        continue;
                    }
                };
                for frame in frames {
                    if !route_frame(frame, &in_tx) {
                        reader_flag.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }
            reader_flag.store(false, Ordering::SeqCst);
        });

        info!("Signaling channel ready");
        Ok((
            Self {
                outbound: out_tx,
                connected,
                reader,
                writer,
            },
            in_rx,
        ))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    pub async fn close(&self) {
        if self.is_connected() {
            let _ = self
                .outbound
                .send(Message::Text(Frame::new("DISCONNECT").encode()));
            let _ = self.outbound.send(Message::Close(None));
        }
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
    }
}

impl Drop for StompChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl Publisher for StompChannel {
    async fn publish(&self, destination: &str, body: &str) -> Result<(), CallError> {
        if !self.is_connected() {
            return Err(CallError::ChannelDisconnected);
        }
        let frame = send_frame(destination, body);
        self.outbound
            .send(Message::Text(frame.encode()))
            .map_err(|_| CallError::ChannelDisconnected)
    }
}

pub fn send_frame(destination: &str, body: &str) -> Frame {
    Frame::new("SEND")
        .header("destination", destination)
        .header("content-type", "text/plain;charset=UTF-8")
        .header("content-length", &body.len().to_string())
        .with_body(body)
}

/// Передаёт MESSAGE в нужный топик. `false` означает конец сессии.
fn route_frame(frame: Frame, tx: &mpsc::UnboundedSender<Inbound>) -> bool {
    match frame.command.as_str() {
        "MESSAGE" => {
            let topic = match frame.get("subscription") {
                Some(CHAT_SUBSCRIPTION) => Topic::Chat,
                Some(SIGNAL_SUBSCRIPTION) => Topic::Signal,
                other => {
                    warn!("MESSAGE for unknown subscription {:?}", other);
                    return true;
                }
            };
            tx.send(Inbound {
                topic,
                body: frame.body,
            })
            .is_ok()
        }
        "ERROR" => {
            error!(
                "STOMP error from server: {} {}",
                frame.get("message").unwrap_or_default(),
                frame.body
            );
            false
        }
        "RECEIPT" => true,
        other => {
            debug!("Ignoring STOMP frame {}", other);
            true
        }
    }
}
