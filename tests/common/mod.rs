#![allow(dead_code)]

use async_trait::async_trait;
use callroom_lib::error::{CallError, Result};
use callroom_lib::media::{LocalTrack, MediaConstraints, MediaSource, TrackSource};
use callroom_lib::peer::{IceCandidate, PeerLink, SessionDescription};
use callroom_lib::session::{CallSession, SessionEvent, SessionOptions};
use callroom_lib::signaling::{decode_signal, Signal};
use callroom_lib::stomp::Publisher;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const DESTINATION: &str = "/app/send";

/// Вызовы, которые сессия сделала над peer connection
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(String),
    Close,
}

/// Peer connection без сети: отвечает "offer-N"/"answer-N" и пишет журнал вызовов
#[derive(Default)]
pub struct FakePeer {
    calls: Mutex<Vec<PeerCall>>,
    counter: AtomicUsize,
    fail_offer: bool,
    fail_remote: bool,
}

impl FakePeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_offer() -> Self {
        Self {
            fail_offer: true,
            ..Self::default()
        }
    }

    pub fn failing_remote() -> Self {
        Self {
            fail_remote: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn added_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PeerCall::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &PeerCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: PeerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        self.record(PeerCall::AddTrack(format!("{:?}", track.kind)));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(PeerCall::CreateOffer);
        if self.fail_offer {
            return Err(CallError::Transport("offer refused".into()));
        }
        Ok(SessionDescription::offer(format!("offer-{}", self.next())))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer(format!("answer-{}", self.next())))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(PeerCall::SetLocal(desc));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(PeerCall::SetRemote(desc));
        if self.fail_remote {
            return Err(CallError::Transport("bad remote sdp".into()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(PeerCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(PeerCall::Close);
        Ok(())
    }
}

/// Publisher, который складывает всё отправленное в память
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
    offline: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Дальше каждая публикация возвращает `ChannelDisconnected`
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    /// Опубликованные сигналы; всё, что не JSON-сигнал, пропускается
    pub fn signals(&self) -> Vec<Signal> {
        self.bodies()
            .iter()
            .filter_map(|b| decode_signal(b).ok())
            .map(|env| env.signal)
            .collect()
    }

    pub fn signal_names(&self) -> Vec<&'static str> {
        self.signals().iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, destination: &str, body: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CallError::ChannelDisconnected);
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub session: CallSession<FakePeer, RecordingPublisher>,
    pub peer: Arc<FakePeer>,
    pub publisher: Arc<RecordingPublisher>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakePeer::new(), true)
    }

    pub fn with(peer: FakePeer, media_granted: bool) -> Self {
        let peer = Arc::new(peer);
        let publisher = Arc::new(RecordingPublisher::new());
        let media: Arc<dyn MediaSource> = Arc::new(TrackSource::new(media_granted));
        let (tx, events) = mpsc::unbounded_channel();
        let session = CallSession::new(
            peer.clone(),
            publisher.clone(),
            media,
            SessionOptions {
                destination: DESTINATION.to_string(),
                constraints: MediaConstraints::default(),
            },
            tx,
        );
        Self {
            session,
            peer,
            publisher,
            events,
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

pub fn host_candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5{n:04} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Конверт так, как его шлёт браузер на другой стороне (без origin)
pub fn remote_offer(sdp: &str) -> String {
    format!(r#"{{"type":"offer","offer":{{"type":"offer","sdp":"{sdp}"}}}}"#)
}

pub fn remote_answer(sdp: &str) -> String {
    format!(r#"{{"type":"answer","answer":{{"type":"answer","sdp":"{sdp}"}}}}"#)
}

pub fn remote_candidate(c: &IceCandidate) -> String {
    serde_json::json!({ "type": "ice-candidate", "candidate": c }).to_string()
}
