use serde::Serialize;
use std::sync::Mutex;

/// Команда рисования для UI слоя (аналог вызовов CanvasRenderingContext2D)
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawCommand {
    StrokeRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    FillText {
        text: String,
        x: f64,
        y: f64,
    },
}

/// 2D поверхность поверх видео
pub trait Surface {
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    fn clear(&mut self);
    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);
    /// ascent + descent активного шрифта
    fn line_height(&self) -> f64;
}

/// Поверхность, которая копит команды; UI рисует их сам
#[derive(Debug, Clone)]
pub struct DisplayList {
    width: u32,
    height: u32,
    line_height: f64,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new(line_height: f64) -> Self {
        Self {
            width: 0,
            height: 0,
            line_height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_blank(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.commands.clear();
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.commands.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
        });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
        });
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }
}

/// Элемент, показывающий локальное видео
pub trait VideoView: Send + Sync {
    /// Текущий отрисованный размер (ширина, высота)
    fn rendered_size(&self) -> (u32, u32);
    /// Новый размер после изменения раскладки окна
    fn set_rendered_size(&self, width: u32, height: u32);
    fn attach(&self, track_id: &str);
    fn detach(&self);
    fn attached_track(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct ViewState {
    width: u32,
    height: u32,
    track: Option<String>,
}

/// Вью без окна: размер задаёт UI командой resize
#[derive(Debug, Default)]
pub struct HeadlessView {
    state: Mutex<ViewState>,
}

impl HeadlessView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(ViewState {
                width,
                height,
                track: None,
            }),
        }
    }
}

impl VideoView for HeadlessView {
    fn rendered_size(&self) -> (u32, u32) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.width, state.height)
    }

    fn set_rendered_size(&self, width: u32, height: u32) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.width = width;
        state.height = height;
    }

    fn attach(&self, track_id: &str) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).track = Some(track_id.to_string());
    }

    fn detach(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).track = None;
    }

    fn attached_track(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .track
            .clone()
    }
}
