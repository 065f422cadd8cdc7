use crate::error::{ClientError, ClientResult};
use crate::overlay::VideoView;
use crate::peer::connection::{PeerFactory, PeerTransport};
use crate::peer::ice::analyze_candidates;
use crate::peer::media::{LocalTrack, MediaDevices};
use crate::peer::state::SessionState;
use crate::peer::types::{ConnectivityStatus, GatheringStatus, MediaConstraints, PeerEvent, TrackKind};
use crate::utils::random_id;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Настройки движка согласования
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub constraints: MediaConstraints,
    /// 0 = без ограничения
    pub device_timeout: Duration,
    /// 0 = без ограничения
    pub negotiation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            constraints: MediaConstraints::default(),
            device_timeout: Duration::from_secs(30),
            negotiation_timeout: Duration::from_secs(30),
        }
    }
}

/// Контекст одной попытки согласования. После закрытия не переиспользуется.
pub struct Session {
    id: String,
    generation: u64,
    state: SessionState,
    tracks: Vec<LocalTrack>,
    peer: Option<Arc<dyn PeerTransport>>,
    local_description: Option<String>,
    remote_description: Option<String>,
    description_sent: bool,
    timer: Option<JoinHandle<()>>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn local_description(&self) -> Option<&str> {
        self.local_description.as_deref()
    }

    pub fn remote_description(&self) -> Option<&str> {
        self.remote_description.as_deref()
    }

    pub fn description_sent(&self) -> bool {
        self.description_sent
    }
}

/// Что осталось от закрытой сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub generation: u64,
    pub state: SessionState,
}

/// Результат обработки события соединения
#[derive(Debug, Clone, PartialEq)]
pub enum PeerOutcome {
    Ignored,
    /// Сбор кандидатов завершён, описание нужно отправить (ровно один раз)
    DescriptionReady(String),
    Connected,
    ConnectionLost(ConnectivityStatus),
    TimedOut,
}

pub struct NegotiationEngine {
    config: EngineConfig,
    devices: Arc<dyn MediaDevices>,
    peers: Arc<dyn PeerFactory>,
    view: Arc<dyn VideoView>,
    events: mpsc::UnboundedSender<PeerEvent>,
    session: Session,
    next_generation: u64,
    previous: Option<SessionSummary>,
}

impl NegotiationEngine {
    /// Создаёт движок с первой сессией в Idle
    pub async fn new(
        config: EngineConfig,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
        view: Arc<dyn VideoView>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        let session = Self::build_session(peers.as_ref(), 1, &events).await;
        Self {
            config,
            devices,
            peers,
            view,
            events,
            session,
            next_generation: 2,
            previous: None,
        }
    }

    async fn build_session(
        peers: &dyn PeerFactory,
        generation: u64,
        events: &mpsc::UnboundedSender<PeerEvent>,
    ) -> Session {
        // Ошибку фабрики не считаем фатальной: start() попробует ещё раз
        let peer = match peers.new_peer(generation, events.clone()).await {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!(generation, "Could not create peer connection: {}", e);
                None
            }
        };
        let session = Session {
            id: random_id(),
            generation,
            state: SessionState::Idle,
            tracks: Vec::new(),
            peer,
            local_description: None,
            remote_description: None,
            description_sent: false,
            timer: None,
        };
        debug!(generation, id = %session.id, "New session");
        session
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    /// Итог последней закрытой сессии
    pub fn previous_session(&self) -> Option<&SessionSummary> {
        self.previous.as_ref()
    }

    fn set_state(&mut self, next: SessionState) -> ClientResult<()> {
        let next = self.session.state.transition(next)?;
        info!(
            generation = self.session.generation,
            "Session state {} -> {}", self.session.state, next
        );
        self.session.state = next;
        Ok(())
    }

    async fn ensure_peer(&mut self) -> ClientResult<Arc<dyn PeerTransport>> {
        if let Some(peer) = &self.session.peer {
            return Ok(Arc::clone(peer));
        }
        let peer = self
            .peers
            .new_peer(self.session.generation, self.events.clone())
            .await?;
        self.session.peer = Some(Arc::clone(&peer));
        Ok(peer)
    }

    /// Захватывает медиа, добавляет треки в соединение, показывает видео и переходит в Negotiating.
    /// При ошибке вызывающий обязан сделать `stop(true)`.
    pub async fn start(&mut self) -> ClientResult<()> {
        if self.session.state != SessionState::Idle {
            return Err(ClientError::invalid_state(format!(
                "start() requires Idle, session is {}",
                self.session.state
            )));
        }
        info!(generation = self.session.generation, "Requesting local media");

        let tracks = self.acquire_media().await?;
        let peer = self.ensure_peer().await?;

        self.set_state(SessionState::Negotiating)?;
        self.session.tracks = tracks;

        for track in &self.session.tracks {
            peer.add_track(track).await?;
        }
        if let Some(video) = self
            .session
            .tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
        {
            self.view.attach(video.id());
        }

        self.arm_negotiation_timer();
        info!(
            generation = self.session.generation,
            "Local media attached ({} tracks), waiting for offer",
            self.session.tracks.len()
        );
        Ok(())
    }

    async fn acquire_media(&self) -> ClientResult<Vec<LocalTrack>> {
        let request = self.devices.get_user_media(self.config.constraints);
        let tracks = if self.config.device_timeout.is_zero() {
            request.await?
        } else {
            tokio::time::timeout(self.config.device_timeout, request)
                .await
                .map_err(|_| ClientError::DeviceTimeout {
                    seconds: self.config.device_timeout.as_secs(),
                })??
        };
        if tracks.is_empty() {
            return Err(ClientError::device("no tracks granted"));
        }
        Ok(tracks)
    }

    fn arm_negotiation_timer(&mut self) {
        if self.config.negotiation_timeout.is_zero() {
            return;
        }
        let generation = self.session.generation;
        let delay = self.config.negotiation_timeout;
        let tx = self.events.clone();
        self.session.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PeerEvent::NegotiationTimeout { generation });
        }));
    }

    /// Применяет offer сервера и ставит локальный answer.
    /// Ошибка WebRTC фатальна для сессии; offer не в Negotiating нет.
    pub async fn accept_offer(&mut self, sdp: String) -> ClientResult<()> {
        if self.session.state != SessionState::Negotiating {
            return Err(ClientError::invalid_state(format!(
                "offer received while session is {}",
                self.session.state
            )));
        }
        if self.session.remote_description.is_some() {
            warn!(
                generation = self.session.generation,
                "Ignoring repeated offer, renegotiation is not supported"
            );
            return Ok(());
        }

        let peer = self.ensure_peer().await?;
        peer.set_remote_offer(sdp.clone())
            .await
            .map_err(|e| ClientError::negotiation(format!("remote offer rejected: {}", e)))?;
        self.session.remote_description = Some(sdp);

        let answer = peer
            .create_answer()
            .await
            .map_err(|e| ClientError::negotiation(format!("answer failed: {}", e)))?;
        debug!(
            generation = self.session.generation,
            "Local answer set ({} bytes), gathering candidates",
            answer.len()
        );
        Ok(())
    }

    /// Единая точка обработки событий соединения и таймеров
    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> PeerOutcome {
        if event.generation() != self.session.generation {
            debug!(
                "Ignoring event of stale session generation {} (current {})",
                event.generation(),
                self.session.generation
            );
            return PeerOutcome::Ignored;
        }

        match event {
            PeerEvent::Candidate { candidate, .. } => {
                // Кандидаты уходят внутри финального описания
                debug!("Local candidate {:?}", candidate);
                PeerOutcome::Ignored
            }
            PeerEvent::Gathering { status, .. } => match status {
                GatheringStatus::Complete => self.finalize_description().await,
                _ => PeerOutcome::Ignored,
            },
            PeerEvent::Connectivity { status, .. } => self.on_connectivity(status),
            PeerEvent::NegotiationTimeout { .. } => {
                if self.session.state == SessionState::Negotiating {
                    warn!(generation = self.session.generation, "Negotiation timed out");
                    PeerOutcome::TimedOut
                } else {
                    PeerOutcome::Ignored
                }
            }
        }
    }

    async fn finalize_description(&mut self) -> PeerOutcome {
        if !self.session.state.may_own_tracks() {
            return PeerOutcome::Ignored;
        }
        if self.session.description_sent {
            debug!("Gathering completed again, description already sent");
            return PeerOutcome::Ignored;
        }
        if self.session.remote_description.is_none() {
            debug!("Gathering completed before the offer was applied");
            return PeerOutcome::Ignored;
        }
        let Some(peer) = self.session.peer.clone() else {
            return PeerOutcome::Ignored;
        };
        let Some(sdp) = peer.local_description().await else {
            warn!("Gathering complete but no local description");
            return PeerOutcome::Ignored;
        };

        analyze_candidates(&sdp);
        self.session.local_description = Some(sdp.clone());
        self.session.description_sent = true;
        info!(generation = self.session.generation, "Local description finalized");
        PeerOutcome::DescriptionReady(sdp)
    }

    fn on_connectivity(&mut self, status: ConnectivityStatus) -> PeerOutcome {
        match status {
            ConnectivityStatus::Connected | ConnectivityStatus::Completed => {
                if self.session.state != SessionState::Negotiating {
                    return PeerOutcome::Ignored;
                }
                if let Err(e) = self.set_state(SessionState::Connected) {
                    warn!("{}", e);
                    return PeerOutcome::Ignored;
                }
                if let Some(timer) = self.session.timer.take() {
                    timer.abort();
                }
                PeerOutcome::Connected
            }
            ConnectivityStatus::Disconnected | ConnectivityStatus::Failed => {
                if self.session.state.may_own_tracks() {
                    PeerOutcome::ConnectionLost(status)
                } else {
                    PeerOutcome::Ignored
                }
            }
            _ => PeerOutcome::Ignored,
        }
    }

    /// Teardown. Треки выключаются и останавливаются, видео отвязывается.
    /// С `close_connection` соединение закрывается и сразу создаётся новая сессия в Idle.
    pub async fn stop(&mut self, close_connection: bool) {
        for track in self.session.tracks.iter_mut() {
            track.set_enabled(false);
            track.stop();
        }
        self.session.tracks.clear();
        self.view.detach();

        if !close_connection {
            debug!(generation = self.session.generation, "Local tracks released");
            return;
        }

        if let Some(timer) = self.session.timer.take() {
            timer.abort();
        }
        if let Err(e) = self.set_state(SessionState::Closed) {
            warn!("{}", e);
        }
        if let Some(peer) = self.session.peer.take() {
            if let Err(e) = peer.close().await {
                warn!("Error while closing peer connection: {}", e);
            }
        }
        self.previous = Some(SessionSummary {
            id: self.session.id.clone(),
            generation: self.session.generation,
            state: self.session.state,
        });

        let generation = self.next_generation;
        self.next_generation += 1;
        self.session = Self::build_session(self.peers.as_ref(), generation, &self.events).await;
        info!(generation, "Session replaced");
    }
}
