use thiserror::Error;

/// Результат операций клиента
pub type ClientResult<T> = Result<T, ClientError>;

/// Ошибки клиента. Всё, кроме `Protocol` и `InvalidState`, валит сессию целиком.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Нет доступа к камере/микрофону или устройство отсутствует
    #[error("Device acquisition failed: {message}")]
    DeviceAcquisition { message: String },

    #[error("Device acquisition timed out after {seconds} seconds")]
    DeviceTimeout { seconds: u64 },

    /// Ошибка offer/answer (битое описание, отказ стека)
    #[error("Negotiation failed: {message}")]
    Negotiation { message: String },

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// Ошибка канала сигнализации (open error, обрыв)
    #[error("Signaling channel failure: {message}")]
    Channel { message: String },

    /// Сервер отклонил Join
    #[error("Join rejected by server: {0}")]
    JoinRejected(String),

    /// Битое входящее сообщение
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    pub fn device(message: impl Into<String>) -> Self {
        Self::DeviceAcquisition {
            message: message.into(),
        }
    }

    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation {
            message: message.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Должна ли ошибка приводить к полному teardown сессии
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            ClientError::Protocol(_) | ClientError::InvalidState { .. } | ClientError::Config { .. }
        )
    }
}

/// Ошибки разбора входящих сообщений и предсказаний
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("invalid value for `{field}`: {value}")]
    InvalidField { field: String, value: String },

    #[error("malformed detection `{entry}`: {reason}")]
    Detection { entry: String, reason: String },

    /// SdpOffer пришёл, но описание из него не достать
    #[error("malformed SdpOffer: {0}")]
    Offer(String),
}

impl ProtocolError {
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn detection(entry: &str, reason: impl Into<String>) -> Self {
        Self::Detection {
            entry: entry.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_policy_spares_malformed_frames() {
        assert!(ClientError::device("denied").is_session_fatal());
        assert!(ClientError::negotiation("bad sdp").is_session_fatal());
        assert!(ClientError::channel("closed").is_session_fatal());
        assert!(ClientError::JoinRejected("Tenant not found".into()).is_session_fatal());
        assert!(!ClientError::from(ProtocolError::MissingField("pcount".into())).is_session_fatal());
        assert!(!ClientError::invalid_state("not idle").is_session_fatal());
    }
}
