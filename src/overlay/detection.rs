use crate::error::ProtocolError;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Рамка в координатах опорного разрешения
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn scaled(&self, factor: f64) -> BoundingBox {
        BoundingBox {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Одна детекция: `label|confidence|x0;y0;x1;y1`
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl FromStr for Detection {
    type Err = ProtocolError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = entry.split('|').collect();
        if parts.len() != 3 {
            return Err(ProtocolError::detection(
                entry,
                format!("expected 3 '|'-separated fields, got {}", parts.len()),
            ));
        }

        let label = parts[0].to_string();
        let confidence = parse_number(parts[1])
            .ok_or_else(|| ProtocolError::detection(entry, "confidence is not a number"))?;

        let coords = parts[2]
            .split(';')
            .map(parse_number)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| ProtocolError::detection(entry, "box coordinate is not a number"))?;
        let &[x0, y0, x1, y1] = coords.as_slice() else {
            return Err(ProtocolError::detection(
                entry,
                format!("expected 4 box coordinates, got {}", coords.len()),
            ));
        };

        Ok(Detection {
            label,
            confidence,
            bbox: BoundingBox { x0, y0, x1, y1 },
        })
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{};{};{};{}",
            self.label, self.confidence, self.bbox.x0, self.bbox.y0, self.bbox.x1, self.bbox.y1
        )
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Одно обновление результатов детекции
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFrame {
    pub count: usize,
    /// Высота кадра, по которой считались координаты; при count = 0 может отсутствовать
    pub resolution: Option<u32>,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn empty() -> Self {
        Self {
            count: 0,
            resolution: None,
            detections: Vec::new(),
        }
    }

    /// Разбирает `{pcount, res, p0..p{n-1}}`. Любая битая запись валит весь кадр.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let count: usize = parse_field(payload, "pcount")?;
        if count == 0 {
            return Ok(Self::empty());
        }

        let resolution: u32 = parse_field(payload, "res")?;
        if resolution == 0 {
            return Err(ProtocolError::invalid("res", "0"));
        }

        let detections = (0..count)
            .map(|i| {
                let key = format!("p{}", i);
                field_text(payload, &key)?.parse::<Detection>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            count,
            resolution: Some(resolution),
            detections,
        })
    }
}

/// Значения приходят строками (redis stream), но числа тоже принимаем
fn field_text<'a>(payload: &'a Map<String, Value>, key: &str) -> Result<Cow<'a, str>, ProtocolError> {
    match payload.get(key) {
        Some(Value::String(s)) => Ok(Cow::Borrowed(s.as_str())),
        Some(Value::Number(n)) => Ok(Cow::Owned(n.to_string())),
        Some(other) => Err(ProtocolError::invalid(key, other.to_string())),
        None => Err(ProtocolError::MissingField(key.to_string())),
    }
}

fn parse_field<T: FromStr>(payload: &Map<String, Value>, key: &str) -> Result<T, ProtocolError> {
    let text = field_text(payload, key)?;
    text.trim()
        .parse::<T>()
        .map_err(|_| ProtocolError::invalid(key, text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn compact_encoding_round_trip() {
        let original = Detection {
            label: "person".into(),
            confidence: 0.8734,
            bbox: BoundingBox {
                x0: 12.0,
                y0: 40.0,
                x1: 310.0,
                y1: 470.0,
            },
        };
        let encoded = original.to_string();
        assert_eq!(encoded, "person|0.8734|12;40;310;470");

        let decoded: Detection = encoded.parse().unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.bbox.scaled(1.0), original.bbox);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("person|0.9".parse::<Detection>().is_err());
        assert!("person|high|0;0;1;1".parse::<Detection>().is_err());
        assert!("person|0.9|0;0;1".parse::<Detection>().is_err());
        assert!("person|0.9|0;0;1;x".parse::<Detection>().is_err());
        assert!("person|0.9|0;0;1;1;5".parse::<Detection>().is_err());
        assert!("person|NaN|0;0;1;1".parse::<Detection>().is_err());
    }

    #[test]
    fn parses_backend_payload() {
        let frame = DetectionFrame::from_payload(&payload(json!({
            "participantId": "abc",
            "timestamp": "1660000000",
            "pcount": "2",
            "res": "480",
            "p0": "person|0.91|10;20;110;220",
            "p1": "dog|0.5|0;0;50;60"
        })))
        .unwrap();

        assert_eq!(frame.count, 2);
        assert_eq!(frame.resolution, Some(480));
        assert_eq!(frame.detections[1].label, "dog");
        assert_eq!(frame.detections[0].bbox.height(), 200.0);
    }

    #[test]
    fn empty_frame_needs_no_resolution() {
        let frame = DetectionFrame::from_payload(&payload(json!({ "pcount": 0 }))).unwrap();
        assert_eq!(frame, DetectionFrame::empty());
    }

    #[test]
    fn missing_or_bad_fields_fail_the_frame() {
        assert_eq!(
            DetectionFrame::from_payload(&payload(json!({ "res": "480" }))).unwrap_err(),
            ProtocolError::MissingField("pcount".into())
        );
        assert_eq!(
            DetectionFrame::from_payload(&payload(json!({ "pcount": "2", "res": "480", "p0": "a|1|0;0;1;1" })))
                .unwrap_err(),
            ProtocolError::MissingField("p1".into())
        );
        assert!(DetectionFrame::from_payload(&payload(json!({ "pcount": "1", "res": "0", "p0": "a|1|0;0;1;1" }))).is_err());
        assert!(DetectionFrame::from_payload(&payload(json!({ "pcount": "many" }))).is_err());
    }

    fn to_payload(frame: &DetectionFrame) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("pcount".into(), Value::String(frame.count.to_string()));
        if let Some(res) = frame.resolution {
            payload.insert("res".into(), Value::String(res.to_string()));
        }
        for (i, detection) in frame.detections.iter().enumerate() {
            payload.insert(format!("p{}", i), Value::String(detection.to_string()));
        }
        payload
    }

    #[test]
    fn payload_round_trip() {
        let frame = DetectionFrame {
            count: 1,
            resolution: Some(640),
            detections: vec!["car|0.75|1;2;3;4".parse().unwrap()],
        };
        assert_eq!(DetectionFrame::from_payload(&to_payload(&frame)).unwrap(), frame);
    }
}
