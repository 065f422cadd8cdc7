use crate::overlay::DrawCommand;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Инициализация логирования с временными метками.
/// `RUST_LOG` имеет приоритет над уровнем из конфигурации.
pub fn init(level: &str) {
    if !crate::config::LOGGING_ENABLED {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Печать ICE-candidate при появлении
pub async fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        debug!(
            "{label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index
        );
    }
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    "STATS {moment}: {}:{} bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}

/// События для UI слоя (кнопки, alert, видео, canvas)
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum UiEvent {
    Connected,
    Disconnected,
    Alert {
        message: String,
    },
    VideoAttached {
        track_id: String,
    },
    VideoDetached,
    Overlay {
        width: u32,
        height: u32,
        commands: Vec<DrawCommand>,
    },
}

/// Отправитель UI событий. Без подписчика события просто теряются.
#[derive(Clone)]
pub struct UiNotifier {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: UiEvent) {
        debug!("emit {:?}", event);
        if self.tx.send(event).is_err() {
            debug!("UI listener is gone, dropping event");
        }
    }

    pub fn emit_connected(&self) {
        info!("Session connected");
        self.emit(UiEvent::Connected);
    }

    pub fn emit_disconnected(&self) {
        info!("Session disconnected");
        self.emit(UiEvent::Disconnected);
    }

    /// Пользовательское уведомление об ошибке (alert в веб-версии)
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("ALERT: {}", message);
        self.emit(UiEvent::Alert { message });
    }

    pub fn emit_video_attached(&self, track_id: &str) {
        self.emit(UiEvent::VideoAttached {
            track_id: track_id.to_string(),
        });
    }

    pub fn emit_video_detached(&self) {
        self.emit(UiEvent::VideoDetached);
    }

    pub fn emit_overlay(&self, width: u32, height: u32, commands: Vec<DrawCommand>) {
        self.emit(UiEvent::Overlay {
            width,
            height,
            commands,
        });
    }
}
