pub mod connection;
pub mod ice;
pub mod state;
pub mod types;

use crate::error::Result;
use crate::media::LocalTrack;
use async_trait::async_trait;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

pub use connection::RtcPeer;
pub use ice::PendingCandidates;
pub use state::CallState;
pub use types::{IceCandidate, SdpKind, SessionDescription, StreamInfo, TrackKind};

/// Операции над peer connection, которые нужны сессии звонка.
///
/// Реализация в проде: [`RtcPeer`]. События соединения (кандидаты, треки, состояние)
/// приходят отдельно, через канал [`PeerEvent`].
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// События, которые peer connection отдаёт в цикл сессии
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Trickle ICE: найден локальный кандидат
    LocalCandidate(IceCandidate),
    /// Сбор кандидатов завершён (null candidate)
    GatheringComplete,
    RemoteTrack { stream_id: String, kind: TrackKind },
    ConnectionState(RTCPeerConnectionState),
}
