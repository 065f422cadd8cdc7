use crate::error::{ClientError, ClientResult};
use crate::peer::types::{MediaConstraints, TrackKind};
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::io::ivf_reader::IVFReader;
use webrtc::media::io::ogg_reader::OggReader;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Длительность одной Ogg страницы при 48 kHz
const OGG_PAGE_DURATION: Duration = Duration::from_millis(20);
const OPUS_CLOCK_RATE: u64 = 48_000;

/// Локальный трек захвата. Перед освобождением его нужно выключить и остановить.
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    rtc: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    stopped: bool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, id: impl Into<String>) -> Self {
        let id = id.into();
        let mime_type = match kind {
            TrackKind::Video => MIME_TYPE_VP8,
            TrackKind::Audio => MIME_TYPE_OPUS,
        };
        let rtc = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.clone(),
            "dip-client".to_owned(),
        ));
        Self {
            id,
            kind,
            rtc,
            enabled: Arc::new(AtomicBool::new(true)),
            pump: None,
            stopped: false,
        }
    }

    /// Привязывает задачу, которая пишет сэмплы в трек
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Останавливает захват; повторный вызов ничего не делает
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.set_enabled(false);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.stopped = true;
        debug!(track = %self.id, kind = %self.kind, "Local track stopped");
    }

    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.rtc) as Arc<dyn TrackLocal + Send + Sync>
    }

    fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }
}

impl Drop for LocalTrack {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.stopped)
            .finish()
    }
}

/// Источник медиа (аналог navigator.mediaDevices)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints) -> ClientResult<Vec<LocalTrack>>;
}

/// "Камера" и "микрофон" из файлов: IVF (VP8) видео и Ogg/Opus аудио, по кругу
#[derive(Debug, Clone, Default)]
pub struct FileMediaDevices {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

impl FileMediaDevices {
    pub fn new(video: Option<PathBuf>, audio: Option<PathBuf>) -> Self {
        Self { video, audio }
    }
}

#[async_trait]
impl MediaDevices for FileMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> ClientResult<Vec<LocalTrack>> {
        let video_path = self
            .video
            .clone()
            .ok_or_else(|| ClientError::device("no video source configured"))?;
        let frame_interval = inspect_ivf(&video_path, &constraints)?;

        let audio_path = if constraints.audio {
            let path = self
                .audio
                .clone()
                .ok_or_else(|| ClientError::device("no audio source configured"))?;
            inspect_ogg(&path)?;
            Some(path)
        } else {
            None
        };

        let mut tracks = Vec::new();

        let video = LocalTrack::new(TrackKind::Video, format!("video-{}", random_id()));
        let pump = tokio::spawn(pump_ivf(
            video_path,
            Arc::clone(&video.rtc),
            video.enabled_flag(),
            frame_interval,
        ));
        tracks.push(video.with_pump(pump));

        if let Some(path) = audio_path {
            let audio = LocalTrack::new(TrackKind::Audio, format!("audio-{}", random_id()));
            let pump = tokio::spawn(pump_ogg(path, Arc::clone(&audio.rtc), audio.enabled_flag()));
            tracks.push(audio.with_pump(pump));
        }

        info!("Acquired {} local tracks", tracks.len());
        Ok(tracks)
    }
}

/// Проверяет IVF файл и возвращает интервал кадров с учётом лимита fps
fn inspect_ivf(path: &Path, constraints: &MediaConstraints) -> ClientResult<Duration> {
    let file = File::open(path)
        .map_err(|e| ClientError::device(format!("cannot open video source {:?}: {}", path, e)))?;
    let (_, header) = IVFReader::new(BufReader::new(file))
        .map_err(|e| ClientError::device(format!("invalid IVF video source {:?}: {}", path, e)))?;

    if u32::from(header.height) != constraints.video_height {
        warn!(
            "Video source height {} differs from requested {}",
            header.height, constraints.video_height
        );
    }

    let native = if header.timebase_denominator == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(
            (1000 * u64::from(header.timebase_numerator)) / u64::from(header.timebase_denominator),
        )
    };
    Ok(frame_interval(native, constraints.max_frame_rate))
}

fn inspect_ogg(path: &Path) -> ClientResult<()> {
    let file = File::open(path)
        .map_err(|e| ClientError::device(format!("cannot open audio source {:?}: {}", path, e)))?;
    OggReader::new(BufReader::new(file), true)
        .map_err(|e| ClientError::device(format!("invalid Ogg audio source {:?}: {}", path, e)))?;
    Ok(())
}

/// Интервал между кадрами не короче, чем 1 / max_frame_rate
pub fn frame_interval(native: Duration, max_frame_rate: u32) -> Duration {
    // tokio::time::interval не принимает нулевой период
    let floor = match max_frame_rate {
        0 => Duration::ZERO,
        fps => Duration::from_millis(1000 / u64::from(fps)),
    };
    native.max(floor).max(Duration::from_millis(1))
}

async fn pump_ivf(
    path: PathBuf,
    track: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Video source {:?} went away: {}", path, e);
                return;
            }
        };
        let mut ivf = match IVFReader::new(BufReader::new(file)) {
            Ok((ivf, _)) => ivf,
            Err(e) => {
                warn!("Video source {:?} unreadable: {}", path, e);
                return;
            }
        };

        // Читаем до конца файла, потом начинаем заново
        let mut frames = 0usize;
        while let Ok((frame, _)) = ivf.parse_next_frame() {
            frames += 1;
            ticker.tick().await;
            if !enabled.load(Ordering::SeqCst) {
                continue;
            }
            let sample = Sample {
                data: frame.freeze(),
                duration: interval,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                warn!("Failed to write video sample: {}", e);
                return;
            }
        }
        if frames == 0 {
            warn!("Video source {:?} has no frames", path);
            return;
        }
        debug!("Video source {:?} exhausted, looping", path);
    }
}

async fn pump_ogg(path: PathBuf, track: Arc<TrackLocalStaticSample>, enabled: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(OGG_PAGE_DURATION);
    loop {
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Audio source {:?} went away: {}", path, e);
                return;
            }
        };
        let mut ogg = match OggReader::new(BufReader::new(file), true) {
            Ok((ogg, _)) => ogg,
            Err(e) => {
                warn!("Audio source {:?} unreadable: {}", path, e);
                return;
            }
        };

        let mut last_granule: u64 = 0;
        let mut pages = 0usize;
        while let Ok((page, header)) = ogg.parse_next_page() {
            pages += 1;
            let sample_count = header.granule_position.saturating_sub(last_granule);
            last_granule = header.granule_position;
            ticker.tick().await;
            if !enabled.load(Ordering::SeqCst) {
                continue;
            }
            let data: Bytes = page.freeze();
            let sample = Sample {
                data,
                duration: Duration::from_millis(sample_count * 1000 / OPUS_CLOCK_RATE),
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                warn!("Failed to write audio sample: {}", e);
                return;
            }
        }
        if pages == 0 {
            warn!("Audio source {:?} has no pages", path);
            return;
        }
        debug!("Audio source {:?} exhausted, looping", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_cap_stretches_interval() {
        // 60 fps источник при лимите 30 fps
        assert_eq!(
            frame_interval(Duration::from_millis(16), 30),
            Duration::from_millis(33)
        );
        assert_eq!(
            frame_interval(Duration::from_millis(40), 30),
            Duration::from_millis(40)
        );
        assert_eq!(
            frame_interval(Duration::from_millis(16), 0),
            Duration::from_millis(16)
        );
    }

    #[test]
    fn interval_never_drops_to_zero() {
        // больше 1000 fps целочисленно даёт 0 мс
        assert_eq!(frame_interval(Duration::ZERO, 2000), Duration::from_millis(1));
        assert_eq!(frame_interval(Duration::ZERO, 0), Duration::from_millis(1));
        assert_eq!(
            frame_interval(Duration::from_micros(200), u32::MAX),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn stop_disables_and_is_idempotent() {
        let mut track = LocalTrack::new(TrackKind::Video, "video-test");
        assert!(track.is_enabled());
        track.stop();
        track.stop();
        assert!(!track.is_enabled());
        assert!(track.is_stopped());
        assert_eq!(track.rtc_track().id(), "video-test");
    }

    #[tokio::test]
    async fn missing_sources_are_acquisition_errors() {
        let devices = FileMediaDevices::default();
        let err = devices
            .get_user_media(MediaConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DeviceAcquisition { .. }));

        let devices = FileMediaDevices::new(Some(PathBuf::from("/nonexistent/camera.ivf")), None);
        let err = devices
            .get_user_media(MediaConstraints::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot open video source"));
    }
}
