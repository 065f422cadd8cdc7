use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Сообщения клиент → сервер: `{ "type": ..., "data": ... }`
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Join {
        #[serde(rename = "tenantId")]
        tenant_id: String,
    },
    SdpOfferAnswer {
        sdp: String,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Envelope(e.to_string()))
    }
}

/// Сообщения сервер → клиент
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome,
    JoinError(String),
    SdpOffer { sdp: String },
    Prediction(Map<String, Value>),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct SdpBody {
    sdp: String,
}

impl ServerMessage {
    /// Разбирает входящий текст. Пустое сообщение и неизвестный тип дают `Ok(None)`.
    pub fn decode(text: &str) -> Result<Option<ServerMessage>, ProtocolError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Envelope(e.to_string()))?;

        let message = match raw.kind.as_str() {
            "Welcome" => ServerMessage::Welcome,
            "JoinError" => ServerMessage::JoinError(match raw.data {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            "SdpOffer" => {
                // data приходит JSON-строкой внутри JSON
                let body: SdpBody = match raw.data {
                    Value::String(inner) => serde_json::from_str(&inner),
                    other => serde_json::from_value(other),
                }
                .map_err(|e| ProtocolError::Offer(e.to_string()))?;
                ServerMessage::SdpOffer { sdp: body.sdp }
            }
            "Prediction" => match raw.data {
                Value::Object(map) => ServerMessage::Prediction(map),
                other => return Err(ProtocolError::invalid("Prediction.data", other.to_string())),
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome => "Welcome",
            ServerMessage::JoinError(_) => "JoinError",
            ServerMessage::SdpOffer { .. } => "SdpOffer",
            ServerMessage::Prediction(_) => "Prediction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_wire_format() {
        let json = ClientMessage::Join {
            tenant_id: "defaultTenant".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(json, r#"{"type":"Join","data":{"tenantId":"defaultTenant"}}"#);
    }

    #[test]
    fn sdp_answer_wire_format() {
        let json = ClientMessage::SdpOfferAnswer {
            sdp: "v=0\r\n".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(json, r#"{"type":"SdpOfferAnswer","data":{"sdp":"v=0\r\n"}}"#);
    }

    #[test]
    fn decodes_double_encoded_offer() {
        let text = r#"{"type":"SdpOffer","data":"{\"sdp\":\"v=0\\r\\no=- 1 1 IN IP4 0.0.0.0\\r\\n\"}"}"#;
        assert_eq!(
            ServerMessage::decode(text).unwrap(),
            Some(ServerMessage::SdpOffer {
                sdp: "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n".into()
            })
        );

        let plain = r#"{"type":"SdpOffer","data":{"sdp":"v=0"}}"#;
        assert_eq!(
            ServerMessage::decode(plain).unwrap(),
            Some(ServerMessage::SdpOffer { sdp: "v=0".into() })
        );
    }

    #[test]
    fn decodes_server_variants() {
        assert_eq!(
            ServerMessage::decode(r#"{"type":"Welcome","data":{"id":3,"message":"Welcome!"}}"#).unwrap(),
            Some(ServerMessage::Welcome)
        );
        assert_eq!(
            ServerMessage::decode(r#"{"type":"JoinError","data":"Tenant not found: x"}"#).unwrap(),
            Some(ServerMessage::JoinError("Tenant not found: x".into()))
        );
        let prediction = ServerMessage::decode(r#"{"type":"Prediction","data":{"pcount":"0"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(prediction.kind(), "Prediction");
    }

    #[test]
    fn unknown_and_empty_are_ignored() {
        assert_eq!(ServerMessage::decode("").unwrap(), None);
        assert_eq!(ServerMessage::decode(r#"{"type":"Broadcast","data":1}"#).unwrap(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            ServerMessage::decode("{not json"),
            Err(ProtocolError::Envelope(_))
        ));
        assert!(ServerMessage::decode(r#"{"type":"Prediction","data":"x"}"#).is_err());
    }

    #[test]
    fn undecodable_offer_is_its_own_error() {
        for text in [
            r#"{"type":"SdpOffer","data":"{}"}"#,
            r#"{"type":"SdpOffer","data":"not json at all"}"#,
            r#"{"type":"SdpOffer"}"#,
        ] {
            assert!(
                matches!(ServerMessage::decode(text), Err(ProtocolError::Offer(_))),
                "{}",
                text
            );
        }
    }
}
