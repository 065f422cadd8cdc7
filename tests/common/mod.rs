#![allow(dead_code)]

use async_trait::async_trait;
use dip_client::overlay::{HeadlessView, VideoView};
use dip_client::peer::{
    ConnectivityStatus, GatheringStatus, LocalTrack, MediaConstraints, MediaDevices, PeerEvent,
    PeerFactory, PeerTransport, TrackKind,
};
use dip_client::{Client, ClientConfig, ClientError, ClientResult, UiEvent, UiNotifier};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// ---------- peer ----------

pub struct FakePeer {
    pub generation: u64,
    events: mpsc::UnboundedSender<PeerEvent>,
    pub tracks: Mutex<Vec<String>>,
    pub remote: Mutex<Option<String>>,
    pub local: Mutex<Option<String>>,
    pub closed: AtomicBool,
}

impl FakePeer {
    pub fn gathering(&self, status: GatheringStatus) {
        self.events
            .send(PeerEvent::Gathering {
                generation: self.generation,
                status,
            })
            .unwrap();
    }

    pub fn connectivity(&self, status: ConnectivityStatus) {
        self.events
            .send(PeerEvent::Connectivity {
                generation: self.generation,
                status,
            })
            .unwrap();
    }

    pub fn candidate(&self, candidate: Option<&str>) {
        self.events
            .send(PeerEvent::Candidate {
                generation: self.generation,
                candidate: candidate.map(str::to_string),
            })
            .unwrap();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn answer(&self) -> Option<String> {
        self.local.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerTransport for FakePeer {
    async fn add_track(&self, track: &LocalTrack) -> ClientResult<()> {
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn set_remote_offer(&self, sdp: String) -> ClientResult<()> {
        if !sdp.starts_with("v=0") {
            return Err(ClientError::negotiation("malformed session description"));
        }
        *self.remote.lock().unwrap() = Some(sdp);
        Ok(())
    }

    async fn create_answer(&self) -> ClientResult<String> {
        if self.remote.lock().unwrap().is_none() {
            return Err(ClientError::negotiation("no remote description"));
        }
        let answer = format!(
            "v=0\r\no=- {} 1 IN IP4 127.0.0.1\r\na=candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host\r\n",
            self.generation
        );
        *self.local.lock().unwrap() = Some(answer.clone());
        Ok(answer)
    }

    async fn local_description(&self) -> Option<String> {
        self.local.lock().unwrap().clone()
    }

    async fn close(&self) -> ClientResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePeerFactory {
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakePeerFactory {
    pub fn latest(&self) -> Arc<FakePeer> {
        self.peers.lock().unwrap().last().cloned().expect("no peer created")
    }

    pub fn get(&self, generation: u64) -> Arc<FakePeer> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.generation == generation)
            .cloned()
            .expect("no peer for generation")
    }

    pub fn count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    async fn new_peer(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> ClientResult<Arc<dyn PeerTransport>> {
        let peer = Arc::new(FakePeer {
            generation,
            events,
            tracks: Mutex::new(Vec::new()),
            remote: Mutex::new(None),
            local: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ---------- media ----------

pub enum FakeDevices {
    Grant,
    Deny(&'static str),
    Hang,
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> ClientResult<Vec<LocalTrack>> {
        match self {
            FakeDevices::Grant => {
                let mut tracks = vec![LocalTrack::new(TrackKind::Video, "video-fake")];
                if constraints.audio {
                    tracks.push(LocalTrack::new(TrackKind::Audio, "audio-fake"));
                }
                Ok(tracks)
            }
            FakeDevices::Deny(reason) => Err(ClientError::device(*reason)),
            FakeDevices::Hang => std::future::pending().await,
        }
    }
}

// ---------- signaling server ----------

pub enum ServerCommand {
    Text(String),
    Close,
}

/// Сервер на одно соединение: входящие тексты в `inbound`, исходящие через `send`
pub struct TestServer {
    pub url: String,
    pub inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<ServerCommand>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(text.as_str().to_owned());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    cmd = out_rx.recv() => match cmd {
                        Some(ServerCommand::Text(text)) => {
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCommand::Close) | None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            url: format!("ws://{}/signaling", addr),
            inbound,
            outbound,
        }
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.outbound.send(ServerCommand::Text(text.into()));
    }

    pub fn close(&self) {
        let _ = self.outbound.send(ServerCommand::Close);
    }

    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("server waited too long")
            .expect("server connection gone")
    }

    /// Ничего не пришло за короткое окно
    pub async fn quiet(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(300), self.inbound.recv())
            .await
            .is_err()
    }
}

/// SdpOffer в том виде, в каком его шлёт сервер: data это JSON-строка
pub fn offer_message(sdp: &str) -> String {
    let body = json!({ "sdp": sdp }).to_string();
    json!({ "type": "SdpOffer", "data": body }).to_string()
}

pub fn prediction_message(data: Value) -> String {
    json!({ "type": "Prediction", "data": data }).to_string()
}

// ---------- client ----------

pub struct Harness {
    pub client: Client,
    pub peers: Arc<FakePeerFactory>,
    pub view: Arc<HeadlessView>,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
}

pub fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::for_origin("http://localhost:8080").unwrap();
    config.signaling_url = url.to_string();
    config.engine.negotiation_timeout = Duration::ZERO;
    config.view_size = (960, 720);
    config
}

pub async fn harness(config: ClientConfig, devices: FakeDevices) -> Harness {
    let peers = Arc::new(FakePeerFactory::default());
    let view = Arc::new(HeadlessView::new(config.view_size.0, config.view_size.1));
    let (ui, ui_rx) = UiNotifier::new();
    let client = Client::new(
        &config,
        Arc::new(devices),
        Arc::clone(&peers) as Arc<dyn PeerFactory>,
        Arc::clone(&view) as Arc<dyn VideoView>,
        ui,
    )
    .await;
    Harness {
        client,
        peers,
        view,
        ui: ui_rx,
    }
}

impl Harness {
    /// Обработать одно событие соединения или канала
    pub async fn step(&mut self) {
        let progressed = tokio::time::timeout(Duration::from_secs(5), self.client.process_next())
            .await
            .expect("no event arrived");
        assert!(progressed);
    }

    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn alerts(&mut self) -> Vec<String> {
        self.drain_ui()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Alert { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}
