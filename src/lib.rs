pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod stomp;
pub mod utils;
pub mod view;

pub use chat::{ChatLog, ChatRelay};
pub use client::{ChatHandle, VideoChat};
pub use config::{ClientConfig, ConfigError};
pub use error::{CallError, Result};
pub use media::{LocalStream, LocalTrack, MediaConstraints, MediaSource, TrackSource};
pub use peer::{CallState, IceCandidate, PeerEvent, PeerLink, SessionDescription, StreamInfo};
pub use session::{CallSession, SessionEvent, SessionOptions};
pub use signaling::{decode_signal, dispatch_signal, encode_signal, Signal, SignalEnvelope};
pub use stomp::{Inbound, Publisher, StompChannel, Topic};
pub use view::CallView;
