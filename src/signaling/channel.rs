use crate::error::ProtocolError;
use crate::signaling::protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Состояние канала (аналог WebSocket.readyState)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, name) = match self {
            ChannelState::Connecting => (0, "CONNECTING"),
            ChannelState::Open => (1, "OPEN"),
            ChannelState::Closing => (2, "CLOSING"),
            ChannelState::Closed => (3, "CLOSED"),
        };
        write!(f, "{} ({})", code, name)
    }
}

/// События сокета; `conn` отличает текущее соединение от уже брошенных
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened { conn: u64 },
    Text { conn: u64, text: String },
    Closed { conn: u64, reason: String },
    Error { conn: u64, error: String },
}

impl ChannelEvent {
    pub fn conn(&self) -> u64 {
        match self {
            ChannelEvent::Opened { conn }
            | ChannelEvent::Text { conn, .. }
            | ChannelEvent::Closed { conn, .. }
            | ChannelEvent::Error { conn, .. } => *conn,
        }
    }
}

/// Что клиент должен сделать после разбора события канала
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Nothing,
    Offer(String),
    /// SdpOffer без читаемого описания; для сессии это провал согласования
    BadOffer(ProtocolError),
    Prediction(Map<String, Value>),
    JoinRejected(String),
    Failed { diagnostic: String },
}

enum Outbound {
    Text(String),
    Close,
}

struct Connection {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

/// Единственный канал сигнализации клиента
pub struct SignalingChannel {
    url: String,
    tenant_id: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
    next_conn: u64,
    current: Option<Connection>,
    state: ChannelState,
}

impl SignalingChannel {
    pub fn new(
        url: impl Into<String>,
        tenant_id: impl Into<String>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            tenant_id: tenant_id.into(),
            events,
            next_conn: 1,
            current: None,
            state: ChannelState::Closed,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open && self.current.is_some()
    }

    /// Открывает сокет. Ничего не отправляем, пока сервер не пришлёт Welcome.
    pub fn connect(&mut self) {
        if self.current.is_some() {
            self.close();
        }
        info!("Start connect() {}", self.url);

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.install(tx);
        let task = tokio::spawn(run_connection(self.url.clone(), id, self.events.clone(), rx));
        if let Some(conn) = self.current.as_mut() {
            conn.task = Some(task);
        }
    }

    fn install(&mut self, outbound: mpsc::UnboundedSender<Outbound>) -> u64 {
        let id = self.next_conn;
        self.next_conn += 1;
        self.current = Some(Connection {
            id,
            outbound,
            task: None,
        });
        self.state = ChannelState::Connecting;
        id
    }

    /// Отправка; молча ничего не делает, если канал не открыт
    pub fn send(&self, message: &ClientMessage) -> bool {
        let conn = match self.current.as_ref() {
            Some(conn) if self.state == ChannelState::Open => conn,
            _ => {
                debug!("Channel not open ({}), dropping {:?}", self.state, message);
                return false;
            }
        };
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                return false;
            }
        };
        debug!("Sending to WS: {}", text);
        conn.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Закрывает текущее соединение; его поздние события будут отброшены
    pub fn close(&mut self) {
        if let Some(conn) = self.current.take() {
            self.state = ChannelState::Closing;
            let _ = conn.outbound.send(Outbound::Close);
            debug!("Closing signaling connection {}", conn.id);
        }
        self.state = ChannelState::Closed;
    }

    /// Единая точка разбора событий канала
    pub fn dispatch(&mut self, event: ChannelEvent) -> Dispatch {
        let current = self.current.as_ref().map(|c| c.id);
        if current != Some(event.conn()) {
            debug!("Ignoring event from stale connection {}", event.conn());
            return Dispatch::Nothing;
        }

        match event {
            ChannelEvent::Opened { .. } => {
                info!("client side socket connection established");
                self.state = ChannelState::Open;
                Dispatch::Nothing
            }
            ChannelEvent::Text { text, .. } => self.dispatch_text(&text),
            ChannelEvent::Closed { reason, .. } => {
                let last_state = self.state;
                self.current = None;
                self.state = ChannelState::Closed;
                info!("client side socket connection disconnected: {}", reason);
                Dispatch::Failed {
                    diagnostic: format!(
                        "Websocket {} closed ({}). Ready state: {}",
                        self.url, reason, last_state
                    ),
                }
            }
            ChannelEvent::Error { error, .. } => {
                let last_state = self.state;
                self.close();
                warn!("Websocket error: {}", error);
                Dispatch::Failed {
                    diagnostic: format!(
                        "Could not connect to websocket {}. Ready state: {}. {}",
                        self.url, last_state, error
                    ),
                }
            }
        }
    }

    fn dispatch_text(&mut self, text: &str) -> Dispatch {
        debug!("Received from WS: {}", text);
        let message = match ServerMessage::decode(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Ignoring message without a known type");
                return Dispatch::Nothing;
            }
            Err(ProtocolError::Offer(reason)) => {
                warn!("Offer without a usable description: {}", reason);
                return Dispatch::BadOffer(ProtocolError::Offer(reason));
            }
            Err(e) => {
                warn!("Undecodable message from server: {}", e);
                return Dispatch::Nothing;
            }
        };

        debug!("Dispatching {}", message.kind());
        match message {
            ServerMessage::Welcome => {
                let join = ClientMessage::Join {
                    tenant_id: self.tenant_id.clone(),
                };
                if !self.send(&join) {
                    warn!("Could not send Join after Welcome");
                }
                Dispatch::Nothing
            }
            ServerMessage::JoinError(reason) => {
                // после JoinError это соединение больше не слушаем
                self.close();
                Dispatch::JoinRejected(reason)
            }
            ServerMessage::SdpOffer { sdp } => Dispatch::Offer(sdp),
            ServerMessage::Prediction(payload) => Dispatch::Prediction(payload),
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(conn) = self.current.take() {
            let _ = conn.outbound.send(Outbound::Close);
            if let Some(task) = conn.task {
                task.abort();
            }
        }
    }
}

async fn run_connection(
    url: String,
    conn: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            let _ = events.send(ChannelEvent::Error {
                conn,
                error: e.to_string(),
            });
            return;
        }
    };
    let _ = events.send(ChannelEvent::Opened { conn });
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ChannelEvent::Text { conn, text: text.as_str().to_owned() });
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = events.send(ChannelEvent::Closed { conn, reason: format!("close frame {:?}", frame) });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(ChannelEvent::Error { conn, error: e.to_string() });
                    break;
                }
                None => {
                    let _ = events.send(ChannelEvent::Closed { conn, reason: "stream ended".into() });
                    break;
                }
            },
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = events.send(ChannelEvent::Error { conn, error: e.to_string() });
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    let _ = events.send(ChannelEvent::Closed { conn, reason: "closed locally".into() });
                    break;
                }
            },
        }
    }
    debug!("Signaling connection {} finished", conn);
}
