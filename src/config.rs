// Конфигурация клиента
// Логирование можно отключить только в режиме разработки

use crate::error::{ClientError, ClientResult};
use crate::peer::engine::EngineConfig;
use crate::peer::ice::{default_ice_servers, parse_ice_server, validate_ice_servers};
use crate::peer::types::{MediaConstraints, ServerConfig};
use crate::utils::signaling_url;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

pub const SIGNALING_PATH: &str = "signaling";
pub const DEFAULT_TENANT: &str = "defaultTenant";

/// Аргументы командной строки; большинство можно задать и через окружение
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Native client for the detection media backend")]
pub struct Args {
    /// Origin сервера; канал сигнализации лежит по пути `signaling`
    #[arg(long, env = "DIP_ORIGIN", default_value = "http://localhost:8080")]
    pub origin: String,

    #[arg(long, env = "DIP_TENANT", default_value = DEFAULT_TENANT)]
    pub tenant: String,

    /// `url[,username,credential]`, можно указать несколько раз
    #[arg(long = "ice-server", env = "DIP_ICE_SERVERS", value_delimiter = ';')]
    pub ice_servers: Vec<String>,

    #[arg(long, env = "DIP_VIDEO_HEIGHT", default_value_t = 720)]
    pub video_height: u32,

    #[arg(long, env = "DIP_MAX_FPS", default_value_t = 30)]
    pub max_fps: u32,

    /// IVF (VP8) файл вместо камеры
    #[arg(long, env = "DIP_VIDEO_FILE")]
    pub video_file: Option<PathBuf>,

    /// Ogg/Opus файл вместо микрофона
    #[arg(long, env = "DIP_AUDIO_FILE")]
    pub audio_file: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_audio: bool,

    /// Секунды; 0 отключает
    #[arg(long, env = "DIP_DEVICE_TIMEOUT", default_value_t = 30)]
    pub device_timeout: u64,

    /// Секунды; 0 отключает
    #[arg(long, env = "DIP_NEGOTIATION_TIMEOUT", default_value_t = 30)]
    pub negotiation_timeout: u64,

    #[arg(long, env = "DIP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Сразу выполнить start
    #[arg(long, default_value_t = false)]
    pub autostart: bool,

    #[arg(long, default_value_t = 1280)]
    pub view_width: u32,

    #[arg(long, default_value_t = 720)]
    pub view_height: u32,

    /// ascent + descent шрифта подписей
    #[arg(long, default_value_t = 23.0)]
    pub line_height: f64,
}

/// Проверенная конфигурация, из которой собирается клиент
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub signaling_url: String,
    pub tenant_id: String,
    pub ice_servers: Vec<ServerConfig>,
    pub engine: EngineConfig,
    pub video_file: Option<PathBuf>,
    pub audio_file: Option<PathBuf>,
    pub view_size: (u32, u32),
    pub line_height: f64,
    pub autostart: bool,
}

impl ClientConfig {
    /// Конфигурация по умолчанию для заданного origin
    pub fn for_origin(origin: &str) -> ClientResult<Self> {
        Ok(Self {
            signaling_url: signaling_url(origin, SIGNALING_PATH)?,
            tenant_id: DEFAULT_TENANT.to_string(),
            ice_servers: default_ice_servers(),
            engine: EngineConfig::default(),
            video_file: None,
            audio_file: None,
            view_size: (1280, 720),
            line_height: 23.0,
            autostart: false,
        })
    }
}

impl TryFrom<Args> for ClientConfig {
    type Error = ClientError;

    fn try_from(args: Args) -> ClientResult<Self> {
        if args.tenant.trim().is_empty() {
            return Err(ClientError::config("tenant must not be empty"));
        }
        if args.video_height == 0 {
            return Err(ClientError::config("video height must be positive"));
        }
        if !(args.line_height.is_finite() && args.line_height > 0.0) {
            return Err(ClientError::config("line height must be positive"));
        }

        let ice_servers = if args.ice_servers.is_empty() {
            default_ice_servers()
        } else {
            args.ice_servers
                .iter()
                .enumerate()
                .map(|(i, spec)| parse_ice_server(spec, i))
                .collect::<ClientResult<Vec<_>>>()?
        };
        validate_ice_servers(&ice_servers)?;

        Ok(Self {
            signaling_url: signaling_url(&args.origin, SIGNALING_PATH)?,
            tenant_id: args.tenant,
            ice_servers,
            engine: EngineConfig {
                constraints: MediaConstraints {
                    video_height: args.video_height,
                    max_frame_rate: args.max_fps,
                    audio: !args.no_audio,
                },
                device_timeout: Duration::from_secs(args.device_timeout),
                negotiation_timeout: Duration::from_secs(args.negotiation_timeout),
            },
            video_file: args.video_file,
            audio_file: args.audio_file,
            view_size: (args.view_width, args.view_height),
            line_height: args.line_height,
            autostart: args.autostart,
        })
    }
}
