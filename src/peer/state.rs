use crate::error::{ClientError, ClientResult};
use std::fmt;

/// ========== SESSION FSM ==========
///
/// Idle → Negotiating → Connected → Closed, Closed достижим из любого состояния.
/// Closed терминален: закрытая сессия одноразовая, для нового старта нужна новая.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

impl SessionState {
    /// Может ли сессия в этом состоянии владеть локальными треками
    pub fn may_own_tracks(self) -> bool {
        matches!(self, SessionState::Negotiating | SessionState::Connected)
    }

    /// Единственная точка проверки переходов
    pub fn transition(self, next: SessionState) -> ClientResult<SessionState> {
        use SessionState::*;
        match (self, next) {
            (Idle, Negotiating) | (Negotiating, Connected) | (_, Closed) => Ok(next),
            _ => Err(ClientError::invalid_state(format!(
                "illegal session transition {} -> {}",
                self, next
            ))),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Negotiating => "Negotiating",
            SessionState::Connected => "Connected",
            SessionState::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}
