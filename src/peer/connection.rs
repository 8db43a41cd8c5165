use crate::config::ClientConfig;
use crate::error::Result;
use crate::logger::describe_candidate;
use crate::media::LocalTrack;
use crate::peer::types::{IceCandidate, SessionDescription, TrackKind};
use crate::peer::{PeerEvent, PeerLink};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

/// Peer connection на базе webrtc-rs
pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeer {
    /// Создаём peer и подписываем его обработчики на канал событий сессии
    pub async fn new(config: &ClientConfig, events: mpsc::UnboundedSender<PeerEvent>) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(&config.ice_servers)).await?);

        // Trickle ICE: каждый кандидат сразу уходит в сессию
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let candidate = IceCandidate::from(init);
                            debug!("Trickle LOCAL: {}", describe_candidate(&candidate));
                            let _ = tx.send(PeerEvent::LocalCandidate(candidate));
                        }
                        Err(e) => warn!("Failed to serialize local candidate: {e}"),
                    },
                    // cand == None означает конец сбора
                    None => {
                        let _ = tx.send(PeerEvent::GatheringComplete);
                    }
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(TrackKind::Audio),
                RTPCodecType::Video => Some(TrackKind::Video),
                _ => None,
            };
            let stream_id = track.stream_id();
            match kind {
                Some(kind) => {
                    info!("Remote track arrived: stream={} kind={:?}", stream_id, kind);
                    let _ = tx.send(PeerEvent::RemoteTrack { stream_id, kind });
                }
                None => warn!("Ignoring remote track with unspecified kind"),
            }
            Box::pin(async {})
        }));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("Peer connection state changed to: {:?}", st);
            let _ = tx.send(PeerEvent::ConnectionState(st));
            Box::pin(async {})
        }));

        Ok(Self { pc })
    }
}

#[async_trait]
impl PeerLink for RtcPeer {
    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.track.clone();
        self.pc.add_track(local).await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        SessionDescription::try_from(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        SessionDescription::try_from(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let rtc = RTCSessionDescription::try_from(desc)?;
        self.pc.set_local_description(rtc).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let rtc = RTCSessionDescription::try_from(desc)?;
        self.pc.set_remote_description(rtc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Создает конфигурацию для peer connection
fn rtc_config(ice_servers: &[String]) -> RTCConfiguration {
    let urls: Vec<String> = ice_servers.iter().map(|u| add_ice_url_scheme(u)).collect();
    let ice_servers = if urls.is_empty() {
        Vec::new()
    } else {
        vec![RTCIceServer {
            urls,
            ..Default::default()
        }]
    };
    RTCConfiguration {
        ice_servers,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_config_normalizes_urls() {
        let cfg = rtc_config(&["stun.example.org:3478".to_string()]);
        assert_eq!(cfg.ice_servers.len(), 1);
        assert_eq!(cfg.ice_servers[0].urls, vec!["stun:stun.example.org:3478"]);
        assert_eq!(cfg.bundle_policy, RTCBundlePolicy::MaxBundle);
    }

    #[tokio::test]
    async fn offer_is_created_after_adding_tracks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = ClientConfig::default();
        config.ice_servers.clear();
        let peer = RtcPeer::new(&config, tx).await.unwrap();

        peer.add_track(&LocalTrack::new(TrackKind::Video, "s1"))
            .await
            .unwrap();
        let offer = peer.create_offer().await.unwrap();
        assert_eq!(offer.kind, crate::peer::SdpKind::Offer);
        assert!(offer.sdp.contains("m=video"));
        peer.close().await.unwrap();
    }
}
