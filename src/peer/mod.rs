pub mod connection;
pub mod engine;
pub mod ice;
pub mod media;
pub mod state;
pub mod types;

pub use connection::{PeerFactory, PeerTransport, WebRtcPeerFactory};
pub use engine::{EngineConfig, NegotiationEngine, PeerOutcome, Session, SessionSummary};
pub use media::{FileMediaDevices, LocalTrack, MediaDevices};
pub use state::SessionState;
pub use types::{
    ConnectivityStatus, GatheringStatus, MediaConstraints, PeerEvent, ServerConfig, TrackKind,
};
