use crate::error::{CallError, Result};
use crate::peer::types::{StreamInfo, TrackKind};
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Запрашиваемые возможности устройства (`{video: true, audio: true}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl MediaConstraints {
    pub fn is_empty(&self) -> bool {
        !self.video && !self.audio
    }
}

/// Локальный трек, который можно добавить в peer connection
#[derive(Clone)]
pub struct LocalTrack {
    pub kind: TrackKind,
    pub track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let (mime_type, clock_rate, channels, id) = match kind {
            TrackKind::Video => (MIME_TYPE_VP8, 90_000, 0, "video"),
            TrackKind::Audio => (MIME_TYPE_OPUS, 48_000, 2, "audio"),
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                clock_rate,
                channels,
                ..Default::default()
            },
            id.to_owned(),
            stream_id.to_owned(),
        ));
        Self { kind, track }
    }
}

/// Набор локальных треков одного захвата
#[derive(Clone)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id.clone(),
            tracks: self.tracks.iter().map(|t| t.kind).collect(),
        }
    }

    /// Пишет закодированный кадр (VP8 / Opus) в трек нужного типа
    pub async fn write_sample(&self, kind: TrackKind, data: Bytes, duration: Duration) -> Result<()> {
        let local = self
            .tracks
            .iter()
            .find(|t| t.kind == kind)
            .ok_or_else(|| CallError::MediaAccess(format!("no {kind:?} track in stream")))?;
        local
            .track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

/// Доступ к устройствам захвата
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalStream>;
}

/// Источник, который создаёт VP8/Opus треки; кадры в них пишет внешний конвейер захвата
/// через [`LocalStream::write_sample`].
#[derive(Debug, Clone)]
pub struct TrackSource {
    granted: bool,
}

impl TrackSource {
    pub fn new(granted: bool) -> Self {
        Self { granted }
    }
}

#[async_trait]
impl MediaSource for TrackSource {
    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalStream> {
        if !self.granted {
            return Err(CallError::MediaAccess("permission denied".into()));
        }
        if constraints.is_empty() {
            return Err(CallError::MediaAccess(
                "neither audio nor video requested".into(),
            ));
        }

        let id = format!("local-{}", random_id());
        let mut tracks = Vec::new();
        // порядок как у getUserMedia: сначала audio, потом video
        if constraints.audio {
            tracks.push(LocalTrack::new(TrackKind::Audio, &id));
        }
        if constraints.video {
            tracks.push(LocalTrack::new(TrackKind::Video, &id));
        }
        debug!(stream = %id, count = tracks.len(), "captured local tracks");
        info!("Local media stream ready: {}", id);
        Ok(LocalStream { id, tracks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::track::track_local::TrackLocal;

    #[tokio::test]
    async fn denied_permission_is_media_access_error() {
        let err = TrackSource::new(false)
            .capture(MediaConstraints::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CallError::MediaAccess(_)));
    }

    #[tokio::test]
    async fn empty_constraints_are_rejected() {
        let constraints = MediaConstraints {
            video: false,
            audio: false,
        };
        let res = TrackSource::new(true).capture(constraints).await;
        assert!(matches!(res, Err(CallError::MediaAccess(_))));
    }

    #[tokio::test]
    async fn capture_produces_audio_and_video_under_one_stream() {
        let stream = TrackSource::new(true)
            .capture(MediaConstraints::default())
            .await
            .unwrap();
        let info = stream.info();
        assert_eq!(info.tracks, vec![TrackKind::Audio, TrackKind::Video]);
        assert!(info.id.starts_with("local-"));
        for t in &stream.tracks {
            assert_eq!(t.track.stream_id(), info.id);
        }
    }
}
