use crate::error::{CallError, Result};
use crate::logger::describe_candidate;
use crate::media::{LocalStream, MediaConstraints, MediaSource};
use crate::peer::ice::{analyze_candidates, PendingCandidates};
use crate::peer::types::{IceCandidate, SdpKind, SessionDescription, StreamInfo};
use crate::peer::{CallState, PeerEvent, PeerLink};
use crate::signaling::{send_signal, SignalEnvelope};
use crate::stomp::Publisher;
use crate::utils::random_id;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// События для слоя отображения
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(CallState),
    LocalStream(StreamInfo),
    RemoteStream(StreamInfo),
    ChatMessage(String),
    ConnectionProblem,
    CallFailed(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Куда публикуются сигналы
    pub destination: String,
    pub constraints: MediaConstraints,
}

/// Один звонок: владеет peer connection и ведёт обмен offer/answer/ICE.
///
/// Все методы вызываются из одного цикла событий, поэтому сессия не
/// синхронизирована и берётся по `&mut self`.
pub struct CallSession<P: ?Sized, S: ?Sized> {
    id: String,
    peer: Arc<P>,
    publisher: Arc<S>,
    media: Arc<dyn MediaSource>,
    options: SessionOptions,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: CallState,
    remote_applied: bool,
    pending: PendingCandidates,
    local_candidates: Vec<IceCandidate>,
    local_stream: Option<LocalStream>,
    remote_streams: HashMap<String, StreamInfo>,
    created_at: DateTime<Local>,
    closed: bool,
}

impl<P, S> CallSession<P, S>
where
    P: PeerLink + ?Sized,
    S: Publisher + ?Sized,
{
    pub fn new(
        peer: Arc<P>,
        publisher: Arc<S>,
        media: Arc<dyn MediaSource>,
        options: SessionOptions,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let id = random_id();
        info!("Call session {} created", id);
        Self {
            id,
            peer,
            publisher,
            media,
            options,
            events,
            state: CallState::Idle,
            remote_applied: false,
            pending: PendingCandidates::new(),
            local_candidates: Vec::new(),
            local_stream: None,
            remote_streams: HashMap::new(),
            created_at: Local::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.remote_streams.values()
    }

    pub fn remote_description_applied(&self) -> bool {
        self.remote_applied
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A-сторона: захват медиа, offer, публикация
    pub async fn start_call(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.state.is_idle() {
            warn!("start_call rejected: negotiation in state {}", self.state);
            return Err(CallError::NegotiationInProgress(self.state));
        }

        // при отказе в доступе остаёмся в Idle, повтор делает пользователь
        let stream = self.media.capture(self.options.constraints).await?;
        self.emit(SessionEvent::LocalStream(stream.info()));
        let tracks = stream.tracks.clone();
        self.local_stream = Some(stream);
        self.set_state(CallState::Offering);

        for track in &tracks {
            if let Err(e) = self.peer.add_track(track).await {
                return Err(self.fail(e));
            }
        }

        debug!("Creating offer...");
        let offer = match self.peer.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail(e)),
        };
        debug!("Setting local description (offer)...");
        if let Err(e) = self.peer.set_local_description(offer.clone()).await {
            return Err(self.fail(e));
        }

        let envelope = SignalEnvelope::offer(offer, &self.id);
        if let Err(e) = self.publish(&envelope).await {
            return Err(self.fail(e));
        }
        info!("Offer sent");
        Ok(())
    }

    /// B-сторона: получает OFFER, делает и публикует ANSWER
    pub async fn handle_offer(&mut self, offer: SessionDescription) -> Result<()> {
        self.ensure_live()?;
        if self.remote_applied {
            return Err(CallError::RemoteDescriptionAlreadySet);
        }
        if !self.state.is_idle() {
            return Err(CallError::UnexpectedSignal {
                signal: "offer",
                state: self.state,
            });
        }
        if offer.kind != SdpKind::Offer {
            return Err(CallError::MalformedSignal(
                "offer envelope carries a non-offer description".into(),
            ));
        }

        self.set_state(CallState::AnswerPending);
        debug!("Setting remote description (offer)...");
        if let Err(e) = self.apply_remote(offer).await {
            return Err(self.fail(e));
        }

        debug!("Creating answer...");
        let answer = match self.peer.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(e)),
        };
        debug!("Setting local description (answer)...");
        if let Err(e) = self.peer.set_local_description(answer.clone()).await {
            return Err(self.fail(e));
        }

        let envelope = SignalEnvelope::answer(answer, &self.id);
        if let Err(e) = self.publish(&envelope).await {
            return Err(self.fail(e));
        }
        info!("Answer sent");
        self.set_state(CallState::Negotiating);
        Ok(())
    }

    /// A-сторона: получает ANSWER и завершает handshake
    pub async fn handle_answer(&mut self, answer: SessionDescription) -> Result<()> {
        self.ensure_live()?;
        if self.remote_applied {
            return Err(CallError::RemoteDescriptionAlreadySet);
        }
        if self.state != CallState::Offering {
            return Err(CallError::UnexpectedSignal {
                signal: "answer",
                state: self.state,
            });
        }
        if answer.kind != SdpKind::Answer {
            return Err(CallError::MalformedSignal(
                "answer envelope carries a non-answer description".into(),
            ));
        }

        debug!("Setting remote description (answer)...");
        if let Err(e) = self.apply_remote(answer).await {
            return Err(self.fail(e));
        }
        self.set_state(CallState::Negotiating);
        Ok(())
    }

    /// Применяет ICE кандидат от удаленной стороны или откладывает его
    pub async fn handle_ice_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        self.ensure_live()?;
        if self.remote_applied {
            debug!("Trickle REMOTE: {}", describe_candidate(&candidate));
            self.peer.add_ice_candidate(candidate).await
        } else {
            debug!("Remote description not set yet, queuing candidate");
            self.pending.push(candidate);
            Ok(())
        }
    }

    /// Реакция на события peer connection
    ///
    /// После teardown или перехода в Failed события отбрасываются: кандидаты не публикуются.
    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        if self.closed || self.state.is_terminal() {
            debug!("Dropping peer event in state {}: {:?}", self.state, event);
            return Ok(());
        }
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let envelope = SignalEnvelope::ice_candidate(candidate.clone(), &self.id);
                self.local_candidates.push(candidate);
                self.publish(&envelope).await
            }
            PeerEvent::GatheringComplete => {
                let stats = analyze_candidates(&self.local_candidates);
                info!(
                    "ICE gathering completed: {} host, {} srflx, {} relay",
                    stats.host, stats.srflx, stats.relay
                );
                Ok(())
            }
            PeerEvent::RemoteTrack { stream_id, kind } => {
                if self.remote_streams.contains_key(&stream_id) {
                    debug!("Stream {} already shown, adding {:?} track", stream_id, kind);
                    if let Some(info) = self.remote_streams.get_mut(&stream_id) {
                        if !info.tracks.contains(&kind) {
                            info.tracks.push(kind);
                        }
                    }
                    return Ok(());
                }
                let info = StreamInfo {
                    id: stream_id.clone(),
                    tracks: vec![kind],
                };
                self.remote_streams.insert(stream_id, info.clone());
                self.emit(SessionEvent::RemoteStream(info));
                Ok(())
            }
            PeerEvent::ConnectionState(st) => {
                self.on_connection_state(st);
                Ok(())
            }
        }
    }

    fn on_connection_state(&mut self, st: RTCPeerConnectionState) {
        match st {
            RTCPeerConnectionState::Connected => {
                if self.state == CallState::Negotiating {
                    self.set_state(CallState::Connected);
                }
            }
            RTCPeerConnectionState::Disconnected => {
                warn!("Peer connection disconnected");
                self.emit(SessionEvent::ConnectionProblem);
            }
            RTCPeerConnectionState::Failed => {
                self.fail(CallError::Transport("peer connection failed".into()));
            }
            other => debug!("Peer connection state: {:?}", other),
        }
    }

    /// Закрывает peer connection; повторный вызов ничего не делает
    pub async fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        self.local_candidates.clear();
        let lasted = Local::now().signed_duration_since(self.created_at);
        info!(
            "Tearing down call session {} (created {}, lasted {}s)",
            self.id,
            self.created_at.format("%H:%M:%S"),
            lasted.num_seconds()
        );
        self.peer.close().await
    }

    async fn apply_remote(&mut self, desc: SessionDescription) -> Result<()> {
        self.peer.set_remote_description(desc).await?;
        self.remote_applied = true;
        if !self.pending.is_empty() {
            let applied = self.pending.flush(self.peer.as_ref()).await;
            debug!("Applied {} pending candidates", applied);
        }
        Ok(())
    }

    async fn publish(&self, envelope: &SignalEnvelope) -> Result<()> {
        send_signal(self.publisher.as_ref(), &self.options.destination, envelope).await
    }

    fn ensure_live(&self) -> Result<()> {
        if self.closed || self.state.is_terminal() {
            return Err(CallError::Terminated);
        }
        Ok(())
    }

    fn fail(&mut self, err: CallError) -> CallError {
        warn!("Call failed in state {}: {}", self.state, err);
        self.set_state(CallState::Failed);
        self.emit(SessionEvent::CallFailed(err.to_string()));
        err
    }

    fn set_state(&mut self, state: CallState) {
        if self.state == state {
            return;
        }
        info!("Call state {} -> {}", self.state, state);
        self.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No presentation listener for session events");
        }
    }
}
