//! Канал сигнализации поверх WebSocket и формат его сообщений.

pub mod channel;
pub mod protocol;

pub use channel::{ChannelEvent, ChannelState, Dispatch, SignalingChannel};
pub use protocol::{ClientMessage, ServerMessage};
