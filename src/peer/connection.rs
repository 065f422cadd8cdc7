use crate::error::ClientResult;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::ice::rtc_config;
use crate::peer::media::LocalTrack;
use crate::peer::types::{ConnectivityStatus, GatheringStatus, PeerEvent, ServerConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Соединение с удалённым пиром, как его видит движок согласования
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> ClientResult<()>;

    /// Применяет удалённый offer
    async fn set_remote_offer(&self, sdp: String) -> ClientResult<()>;

    /// Создаёт answer и ставит его локальным описанием; запускает сбор кандидатов
    async fn create_answer(&self) -> ClientResult<String>;

    async fn local_description(&self) -> Option<String>;

    async fn close(&self) -> ClientResult<()>;
}

/// Создаёт соединения; события соединения идут в `events` с меткой поколения
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn new_peer(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> ClientResult<Arc<dyn PeerTransport>>;
}

/// Фабрика поверх webrtc-rs
pub struct WebRtcPeerFactory {
    ice_servers: Vec<ServerConfig>,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn new_peer(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> ClientResult<Arc<dyn PeerTransport>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(&self.ice_servers)).await?);
        attach_handlers(&pc, generation, events);
        debug!(generation, "Peer connection created");

        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

/// Колбэки webrtc только публикуют события; состояние меняет цикл клиента
fn attach_handlers(
    pc: &Arc<RTCPeerConnection>,
    generation: u64,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            if let Some(c) = &cand {
                dump_candidate("LOCAL", c).await;
            }
            let candidate = cand.and_then(|c| c.to_json().ok()).map(|init| init.candidate);
            let _ = tx.send(PeerEvent::Candidate {
                generation,
                candidate,
            });
        })
    }));

    let tx = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        debug!(generation, "ICE gathering state changed to: {:?}", state);
        let status = match state {
            RTCIceGathererState::New => Some(GatheringStatus::New),
            RTCIceGathererState::Gathering => Some(GatheringStatus::Gathering),
            RTCIceGathererState::Complete => Some(GatheringStatus::Complete),
            _ => None,
        };
        if let Some(status) = status {
            let _ = tx.send(PeerEvent::Gathering { generation, status });
        }
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        info!(generation, "ICE connection state changed to: {:?}", state);
        let status = match state {
            RTCIceConnectionState::New => Some(ConnectivityStatus::New),
            RTCIceConnectionState::Checking => Some(ConnectivityStatus::Checking),
            RTCIceConnectionState::Connected => Some(ConnectivityStatus::Connected),
            RTCIceConnectionState::Completed => Some(ConnectivityStatus::Completed),
            RTCIceConnectionState::Disconnected => Some(ConnectivityStatus::Disconnected),
            RTCIceConnectionState::Failed => Some(ConnectivityStatus::Failed),
            RTCIceConnectionState::Closed => Some(ConnectivityStatus::Closed),
            _ => None,
        };
        if let Some(status) = status {
            let _ = tx.send(PeerEvent::Connectivity { generation, status });
        }
        Box::pin(async {})
    }));

    // Weak, чтобы колбэк не держал соединение живым
    let weak = Arc::downgrade(pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        info!(generation, "Peer connection state changed to: {:?}", st);
        if st == RTCPeerConnectionState::Connected {
            if let Some(pc) = weak.upgrade() {
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "CONNECTED").await;
                });
            }
        }
        Box::pin(async {})
    }));

    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _tr: Arc<RTCRtpTransceiver>| {
            info!(
                generation,
                "Remote track: kind={} id={}",
                track.kind(),
                track.id()
            );
            Box::pin(async {})
        },
    ));
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn add_track(&self, track: &LocalTrack) -> ClientResult<()> {
        let sender = self.pc.add_track(track.rtc_track()).await?;

        // RTCP нужно вычитывать, иначе интерсепторы не работают
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
        });
        debug!("Added local {} track {}", track.kind(), track.id());
        Ok(())
    }

    async fn set_remote_offer(&self, sdp: String) -> ClientResult<()> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.pc.set_remote_description(offer).await?;
        Ok(())
    }

    async fn create_answer(&self) -> ClientResult<String> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        Ok(self.local_description().await.unwrap_or_default())
    }

    async fn local_description(&self) -> Option<String> {
        self.pc.local_description().await.map(|d| d.sdp)
    }

    async fn close(&self) -> ClientResult<()> {
        self.pc.close().await?;
        Ok(())
    }
}
