use crate::error::{CallError, Result};
use crate::peer::types::{IceCandidate, SessionDescription};
use crate::peer::PeerLink;
use crate::session::CallSession;
use crate::stomp::Publisher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Содержимое сигнального сообщения, различается по полю `type`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    Offer { offer: SessionDescription },
    Answer { answer: SessionDescription },
    IceCandidate { candidate: IceCandidate },
    /// Любой другой `type`: не ошибка разбора, но и не маршрутизируется
    #[serde(other)]
    Unrecognized,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::IceCandidate { .. } => "ice-candidate",
            Signal::Unrecognized => "unrecognized",
        }
    }
}

/// Конверт сигнала: `{"type": ..., "offer"|"answer"|"candidate": ..., "origin": ...}`.
///
/// `origin` это id сессии-отправителя; браузерные клиенты его не ставят.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    #[serde(flatten)]
    pub signal: Signal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl SignalEnvelope {
    pub fn new(signal: Signal, origin: &str) -> Self {
        Self {
            signal,
            origin: Some(origin.to_string()),
        }
    }

    pub fn offer(desc: SessionDescription, origin: &str) -> Self {
        Self::new(Signal::Offer { offer: desc }, origin)
    }

    pub fn answer(desc: SessionDescription, origin: &str) -> Self {
        Self::new(Signal::Answer { answer: desc }, origin)
    }

    pub fn ice_candidate(candidate: IceCandidate, origin: &str) -> Self {
        Self::new(Signal::IceCandidate { candidate }, origin)
    }
}

/// Ошибки кодирования это ошибки отправителя, а не входящих данных
pub fn encode_signal(envelope: &SignalEnvelope) -> Result<String> {
    if envelope.signal == Signal::Unrecognized {
        return Err(CallError::Transport("cannot send a signal without a known type".into()));
    }
    serde_json::to_string(envelope)
        .map_err(|e| CallError::Transport(format!("failed to encode signal: {e}")))
}

pub fn decode_signal(body: &str) -> Result<SignalEnvelope> {
    Ok(serde_json::from_str(body)?)
}

/// Публикует конверт в точку отправки
pub async fn send_signal<S: Publisher + ?Sized>(
    publisher: &S,
    destination: &str,
    envelope: &SignalEnvelope,
) -> Result<()> {
    let body = encode_signal(envelope)?;
    debug!("Sending {} signal ({} bytes)", envelope.signal.name(), body.len());
    publisher.publish(destination, &body).await
}

/// Что диспетчер сделал с входящим сигналом
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Routed(&'static str),
    Malformed,
    OwnEcho,
    Unrecognized,
    Rejected(&'static str),
}

/// Разбирает входящее сообщение сигнального топика и передаёт его в сессию.
///
/// Ничего не возвращает наверх как ошибку: битый JSON, свои же сообщения и
/// неизвестные типы логируются и отбрасываются.
pub async fn dispatch_signal<P, S>(session: &mut CallSession<P, S>, body: &str) -> Dispatch
where
    P: PeerLink + ?Sized,
    S: Publisher + ?Sized,
{
    let envelope = match decode_signal(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping malformed signal: {e}");
            return Dispatch::Malformed;
        }
    };

    if envelope.origin.as_deref() == Some(session.id()) {
        debug!("Ignoring own {} signal", envelope.signal.name());
        return Dispatch::OwnEcho;
    }

    let name = envelope.signal.name();
    let result = match envelope.signal {
        Signal::IceCandidate { candidate } => session.handle_ice_candidate(candidate).await,
        Signal::Offer { offer } => session.handle_offer(offer).await,
        Signal::Answer { answer } => session.handle_answer(answer).await,
        Signal::Unrecognized => {
            warn!("Dropping signal with unrecognized type");
            return Dispatch::Unrecognized;
        }
    };

    match result {
        Ok(()) => Dispatch::Routed(name),
        Err(e) => {
            log_rejection(name, &e);
            Dispatch::Rejected(name)
        }
    }
}

fn log_rejection(name: &str, err: &CallError) {
    match err {
        CallError::RemoteDescriptionAlreadySet | CallError::UnexpectedSignal { .. } => {
            debug!("Ignoring {name} signal: {err}")
        }
        _ => warn!("Failed to handle {name} signal: {err}"),
    }
}
