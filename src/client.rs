//! Корень приложения: движок, канал и рендерер плюс один цикл событий.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::logger::UiNotifier;
use crate::overlay::{DisplayList, HeadlessView, OverlayRenderer, Surface, VideoView};
use crate::peer::connection::{PeerFactory, WebRtcPeerFactory};
use crate::peer::engine::{NegotiationEngine, PeerOutcome};
use crate::peer::media::{FileMediaDevices, MediaDevices};
use crate::peer::types::PeerEvent;
use crate::signaling::{ChannelEvent, ClientMessage, Dispatch, SignalingChannel};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Команды от UI (кнопки и окно)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Start,
    Stop,
    Resize { width: u32, height: u32 },
    Shutdown,
}

pub struct Client {
    engine: NegotiationEngine,
    channel: SignalingChannel,
    renderer: OverlayRenderer<DisplayList>,
    view: Arc<dyn VideoView>,
    ui: UiNotifier,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Client {
    pub async fn new(
        config: &ClientConfig,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
        view: Arc<dyn VideoView>,
        ui: UiNotifier,
    ) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();

        let engine = NegotiationEngine::new(
            config.engine.clone(),
            devices,
            peers,
            Arc::clone(&view),
            peer_tx,
        )
        .await;
        let channel = SignalingChannel::new(&config.signaling_url, &config.tenant_id, channel_tx);
        let renderer = OverlayRenderer::new(DisplayList::new(config.line_height), Arc::clone(&view));

        Self {
            engine,
            channel,
            renderer,
            view,
            ui,
            peer_rx,
            channel_rx,
        }
    }

    /// Клиент с файловыми источниками медиа, webrtc-rs и headless вью
    pub async fn from_config(config: &ClientConfig, ui: UiNotifier) -> Self {
        let devices = Arc::new(FileMediaDevices::new(
            config.video_file.clone(),
            config.audio_file.clone(),
        ));
        let peers = Arc::new(WebRtcPeerFactory::new(config.ice_servers.clone()));
        let (width, height) = config.view_size;
        let view = Arc::new(HeadlessView::new(width, height));
        Self::new(config, devices, peers, view, ui).await
    }

    pub fn engine(&self) -> &NegotiationEngine {
        &self.engine
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    pub fn renderer(&self) -> &OverlayRenderer<DisplayList> {
        &self.renderer
    }

    /// Главный цикл; завершается по Shutdown или когда UI ушёл
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<UiCommand>) {
        info!("Client loop started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let command = command.unwrap_or(UiCommand::Shutdown);
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = self.peer_rx.recv() => self.handle_peer_event(event).await,
                Some(event) = self.channel_rx.recv() => self.handle_channel_event(event).await,
            }
        }
        info!("Client loop finished");
    }

    /// Обрабатывает одно событие соединения или канала
    pub async fn process_next(&mut self) -> bool {
        tokio::select! {
            Some(event) = self.peer_rx.recv() => {
                self.handle_peer_event(event).await;
                true
            }
            Some(event) = self.channel_rx.recv() => {
                self.handle_channel_event(event).await;
                true
            }
            else => false,
        }
    }

    /// Возвращает false, когда цикл должен завершиться
    pub async fn handle_command(&mut self, command: UiCommand) -> bool {
        debug!("UI command {:?}", command);
        match command {
            UiCommand::Start => self.start().await,
            UiCommand::Stop => self.stop(true).await,
            UiCommand::Resize { width, height } => {
                self.view.set_rendered_size(width, height);
                self.renderer.reset_canvas();
                self.emit_overlay();
            }
            UiCommand::Shutdown => {
                self.stop(true).await;
                return false;
            }
        }
        true
    }

    async fn start(&mut self) {
        match self.engine.start().await {
            Ok(()) => {
                if let Some(track) = self.view.attached_track() {
                    self.ui.emit_video_attached(&track);
                }
                self.renderer.reset_canvas();
                self.channel.connect();
            }
            Err(e) if e.is_session_fatal() => self.fail_session("Error while starting", e).await,
            Err(e) => warn!("start ignored: {}", e),
        }
    }

    /// Полный или частичный teardown вместе с очисткой оверлея
    pub async fn stop(&mut self, close_connection: bool) {
        self.engine.stop(close_connection).await;
        if close_connection {
            self.channel.close();
        }
        self.renderer.reset_canvas();
        self.ui.emit_video_detached();
        self.emit_overlay();
    }

    /// Общий путь всех фатальных ошибок: teardown, потом уведомление
    async fn fail_session(&mut self, context: &str, error: ClientError) {
        warn!(session = %self.engine.session().id(), "{}: {}", context, error);
        self.stop(true).await;
        self.ui.alert(format!("{}:\n{}", context, error));
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        match self.engine.handle_peer_event(event).await {
            PeerOutcome::Ignored => {}
            PeerOutcome::DescriptionReady(sdp) => {
                if !self.channel.send(&ClientMessage::SdpOfferAnswer { sdp }) {
                    warn!("Local description ready but channel is not open");
                }
            }
            PeerOutcome::Connected => self.ui.emit_connected(),
            PeerOutcome::ConnectionLost(status) => {
                info!("ICE connectivity {:?}, tearing down", status);
                self.stop(true).await;
                self.ui.emit_disconnected();
            }
            PeerOutcome::TimedOut => {
                self.fail_session(
                    "Error while negotiating",
                    ClientError::negotiation("no connection within the negotiation timeout"),
                )
                .await
            }
        }
    }

    pub async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match self.channel.dispatch(event) {
            Dispatch::Nothing => {}
            Dispatch::Offer(sdp) => match self.engine.accept_offer(sdp).await {
                Ok(()) => {}
                Err(e) if e.is_session_fatal() => {
                    self.fail_session("Error while acceptOffer", e).await
                }
                Err(e) => warn!("Offer ignored: {}", e),
            },
            Dispatch::BadOffer(e) => {
                self.fail_session("Error while acceptOffer", ClientError::negotiation(e.to_string()))
                    .await
            }
            Dispatch::Prediction(payload) => self.render_prediction(&payload),
            Dispatch::JoinRejected(reason) => {
                self.fail_session("Error while joining", ClientError::JoinRejected(reason))
                    .await
            }
            Dispatch::Failed { diagnostic } => {
                self.fail_session("Signaling channel failed", ClientError::channel(diagnostic))
                    .await
            }
        }
    }

    fn render_prediction(&mut self, payload: &Map<String, Value>) {
        match self.renderer.render_payload(payload) {
            Ok(drawn) => debug!("Rendered {} detections", drawn),
            Err(e) => debug!("Prediction frame skipped: {}", e),
        }
        self.emit_overlay();
    }

    fn emit_overlay(&self) {
        let surface = self.renderer.surface();
        let (width, height) = surface.size();
        self.ui
            .emit_overlay(width, height, surface.commands().to_vec());
    }
}
