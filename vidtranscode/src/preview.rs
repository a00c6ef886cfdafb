/*!
    Preview frames: evenly spaced key frames of the input as RGBA images.
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use image::RgbaImage;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, warn};

use ffmpeg_decode::{Decoder, DecoderConfig};
use ffmpeg_source::Source;
use ffmpeg_transform::{RgbaScaler, ScalingAlgorithm};
use ffmpeg_types::{Error, Frame, MediaKind, Result};

use crate::events::{EventQueue, PropertyChangeEvent};

/// Preview images are scaled down to at most this width.
pub const PREVIEW_WIDTH: u32 = 480;

const PREVIEW_THREADS: usize = 2;

#[derive(Clone, Debug)]
pub struct PreviewFrame {
    pub position: Duration,
    pub image: Arc<RgbaImage>,
}

/**
    `count` evenly spaced positions in `[0, duration)`, starting at zero.
*/
pub fn preview_points(duration: Duration, count: usize) -> Vec<Duration> {
    if count == 0 || duration.is_zero() {
        return Vec::new();
    }
    let step = duration / count as u32;
    (0..count as u32).map(|i| step * i).collect()
}

/**
    Decode one preview frame per target with a private handle on `path`.

    For each target the input is seeked there and decoded forward to the
    first key frame at or after it that is later than the previous result,
    so no frame is returned twice. Targets past the last key frame yield
    nothing.
*/
pub fn extract_previews(path: &Path, targets: &[Duration]) -> Result<Vec<PreviewFrame>> {
    let mut source = Source::open(path)?;
    let stream = source
        .streams()
        .iter()
        .find(|s| s.kind == MediaKind::Video && !s.is_attached_pic())
        .cloned()
        .ok_or_else(|| Error::invalid_data(format!("{} has no video stream", path.display())))?;

    let mut decoder = Decoder::open(&stream, &DecoderConfig::new())?;
    let mut scaler = RgbaScaler::new(PREVIEW_WIDTH).with_algorithm(ScalingAlgorithm::Bicubic);
    let time_base = decoder.time_base();

    let mut previews = Vec::with_capacity(targets.len());
    let mut last: Option<i64> = None;

    'targets: for &target in targets {
        source.seek(target)?;
        decoder.reset();

        let floor = time_base
            .from_duration(target)
            .max(last.map_or(i64::MIN, |pts| pts + 1));

        loop {
            let Some(packet) = source.read_packet()? else {
                break 'targets;
            };
            if packet.stream_index() != stream.index {
                continue;
            }

            let frames = match decoder.decode(&packet) {
                Ok(frames) => frames,
                Err(e) if e.is_recoverable() => {
                    debug!(error = %e, "skipping undecodable preview packet");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for e in decoder.take_dropped() {
                debug!(error = %e, "preview decoder dropped output");
            }

            let found = frames
                .into_iter()
                .find(|f| f.is_key() && f.pts().is_some_and(|pts| pts >= floor));
            if let Some(Frame::Video(frame)) = found {
                let pts = frame.pts().unwrap_or(floor);
                let picture = scaler.convert(&frame)?;
                let image = RgbaImage::from_raw(picture.width, picture.height, picture.data)
                    .ok_or_else(|| Error::invalid_data("preview buffer does not match its size"))?;

                previews.push(PreviewFrame {
                    position: time_base.to_duration(pts),
                    image: Arc::new(image),
                });
                last = Some(pts);
                continue 'targets;
            }
        }
    }

    Ok(previews)
}

/**
    Extracts preview frames in the background.

    Runs on its own two-thread pool, each worker with its own demuxer, so it
    never touches a running transcode. A newer request supersedes an older
    one still in flight.
*/
pub struct PreviewTask {
    pool: rayon::ThreadPool,
    frames: Arc<Mutex<Vec<PreviewFrame>>>,
    generation: Arc<AtomicU64>,
}

impl PreviewTask {
    pub fn new() -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(PREVIEW_THREADS)
            .thread_name(|idx| format!("preview-{idx}"))
            .build()
            .map_err(|e| Error::codec(format!("failed to start preview pool: {e}")))?;

        Ok(Self {
            pool,
            frames: Arc::new(Mutex::new(Vec::new())),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /**
        Start extracting `count` frames from `path`. Returns immediately.

        Results replace [`PreviewTask::frames`] and are announced with
        `PreviewFramesChanged`; failures with `ErrorOccurred`.
    */
    pub fn start(&self, path: PathBuf, count: usize, events: Arc<EventQueue>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.generation);
        let frames = Arc::clone(&self.frames);

        self.pool.spawn(move || {
            let result = collect_previews(&path, count);
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(previews) => {
                    let found = previews.len();
                    *frames.lock() = previews;
                    debug!(path = %path.display(), requested = count, found, "preview frames ready");
                    events.push(PropertyChangeEvent::PreviewFramesChanged(found));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "preview extraction failed");
                    events.push(PropertyChangeEvent::ErrorOccurred(e.to_string()));
                }
            }
        });
    }

    pub fn frames(&self) -> Vec<PreviewFrame> {
        self.frames.lock().clone()
    }

    /**
        Forget stored frames and ignore requests still running.
    */
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.frames.lock().clear();
    }
}

fn collect_previews(path: &Path, count: usize) -> Result<Vec<PreviewFrame>> {
    let duration = Source::open(path)?.duration().unwrap_or_default();
    let targets = preview_points(duration, count);
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let chunk = targets.len().div_ceil(PREVIEW_THREADS);
    let parts = targets
        .par_chunks(chunk)
        .map(|targets| extract_previews(path, targets))
        .collect::<Result<Vec<_>>>()?;

    let mut previews: Vec<PreviewFrame> = parts.into_iter().flatten().collect();
    previews.sort_by_key(|p| p.position);
    previews.dedup_by_key(|p| p.position);
    Ok(previews)
}

impl std::fmt::Debug for PreviewTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewTask")
            .field("threads", &self.pool.current_num_threads())
            .field("frames", &self.frames.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_are_evenly_spaced_from_zero() {
        let points = preview_points(Duration::from_secs(60), 5);
        let secs: Vec<u64> = points.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, [0, 12, 24, 36, 48]);
    }

    #[test]
    fn no_points_without_count_or_duration() {
        assert!(preview_points(Duration::from_secs(10), 0).is_empty());
        assert!(preview_points(Duration::ZERO, 4).is_empty());
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = extract_previews(Path::new("/nonexistent/clip.mkv"), &[Duration::ZERO]).unwrap_err();
        assert!(matches!(err, Error::OpenInputFailed { .. }));
    }
}
