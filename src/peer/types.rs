use std::fmt;

/// Конфигурация ICE сервера
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Ограничения на захват (аналог getUserMedia constraints)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video_height: u32,
    pub max_frame_rate: u32,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video_height: 720,
            max_frame_rate: 30,
            audio: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Состояние сбора ICE кандидатов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringStatus {
    New,
    Gathering,
    Complete,
}

/// Агрегированное состояние ICE соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Асинхронные события от peer connection и таймеров.
/// `generation` указывает, какой сессии принадлежит событие.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Отдельный кандидат (None = конец сбора); для отправки не используется
    Candidate {
        generation: u64,
        candidate: Option<String>,
    },
    Gathering {
        generation: u64,
        status: GatheringStatus,
    },
    Connectivity {
        generation: u64,
        status: ConnectivityStatus,
    },
    NegotiationTimeout {
        generation: u64,
    },
}

impl PeerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            PeerEvent::Candidate { generation, .. }
            | PeerEvent::Gathering { generation, .. }
            | PeerEvent::Connectivity { generation, .. }
            | PeerEvent::NegotiationTimeout { generation } => *generation,
        }
    }
}
