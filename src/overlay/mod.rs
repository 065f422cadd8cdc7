//! Отрисовка результатов детекции поверх видео.
//!
//! Координаты приходят в опорном разрешении модели и масштабируются по высоте
//! поверхности на каждом кадре, поэтому ресайз окна не требует отдельного протокола.

pub mod detection;
pub mod surface;

pub use detection::{BoundingBox, Detection, DetectionFrame};
pub use surface::{DisplayList, DrawCommand, HeadlessView, Surface, VideoView};

use crate::error::ProtocolError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct OverlayRenderer<S: Surface> {
    surface: S,
    view: Arc<dyn VideoView>,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, view: Arc<dyn VideoView>) -> Self {
        let mut renderer = Self { surface, view };
        renderer.reset_canvas();
        renderer
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn view(&self) -> &Arc<dyn VideoView> {
        &self.view
    }

    /// Подгоняет поверхность под видео и очищает её
    pub fn reset_canvas(&mut self) {
        let (width, height) = self.view.rendered_size();
        self.surface.resize(width, height);
        self.surface.clear();
        debug!("Canvas reset to {}x{}", width, height);
    }

    /// Разбирает payload `Prediction` и рисует кадр. Битый кадр оставляет поверхность пустой.
    pub fn render_payload(&mut self, payload: &Map<String, Value>) -> Result<usize, ProtocolError> {
        match DetectionFrame::from_payload(payload) {
            Ok(frame) => Ok(self.render(&frame)),
            Err(e) => {
                self.surface.clear();
                warn!("Dropping malformed prediction frame: {}", e);
                Err(e)
            }
        }
    }

    /// Рисует кадр, возвращает число нарисованных рамок
    pub fn render(&mut self, frame: &DetectionFrame) -> usize {
        if self.surface.size() != self.view.rendered_size() {
            self.reset_canvas();
        } else {
            self.surface.clear();
        }

        let resolution = match frame.resolution {
            Some(res) if frame.count > 0 && res > 0 => res,
            _ => return 0,
        };

        let (_, height) = self.surface.size();
        let scale = f64::from(height) / f64::from(resolution);
        let line_height = self.surface.line_height();

        for detection in &frame.detections {
            let bbox = detection.bbox.scaled(scale);
            self.surface
                .stroke_rect(bbox.x0, bbox.y0, bbox.width(), bbox.height());

            let lines = [detection.label.clone(), detection.confidence.to_string()];
            for (i, line) in lines.iter().enumerate() {
                self.surface
                    .fill_text(line, bbox.x0, bbox.y0 + (i as f64 + 1.0) * line_height);
            }
        }
        frame.detections.len()
    }
}
