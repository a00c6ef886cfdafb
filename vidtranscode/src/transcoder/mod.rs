/*!
    The transcode engine.

    [`Transcoder`] holds the job configuration, runs at most one job at a
    time on a worker thread and reports progress through its event queue.
*/

mod context;
mod job;
mod range;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ffmpeg_encode::EncodeContext;
use ffmpeg_types::{Error, Result, TrackInfo};
use tracing::{debug, warn};

use crate::events::{DEFAULT_EVENT_QUEUE_SIZE, EventQueue, PropertyChangeEvent};
use crate::fps::AtomicF32;
use crate::preview::{PreviewFrame, PreviewTask};

pub use context::{MappingSettings, StreamRoute, TranscodeContext};
pub use job::{Job, JobOutcome, JobSignals, JobSpec};
pub use range::RangeGate;

pub struct Transcoder {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    video: EncodeContext,
    audio: EncodeContext,
    subtitle: Option<PathBuf>,
    start: Option<Duration>,
    end: Option<Duration>,

    duration: Duration,
    tracks: Vec<TrackInfo>,

    events: Arc<EventQueue>,
    fps: Arc<AtomicF32>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    preview: PreviewTask,
}

impl Transcoder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            input: None,
            output: None,
            video: EncodeContext::video(""),
            audio: EncodeContext::audio(""),
            subtitle: None,
            start: None,
            end: None,
            duration: Duration::ZERO,
            tracks: Vec::new(),
            events: Arc::new(EventQueue::new(DEFAULT_EVENT_QUEUE_SIZE)),
            fps: Arc::new(AtomicF32::new(0.0)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            preview: PreviewTask::new()?,
        })
    }

    pub fn set_input_path(&mut self, path: impl Into<PathBuf>) {
        self.input = Some(path.into());
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    /**
        Read the input's duration and track list.

        Emits `DurationChanged` and `TrackListChanged` on success and
        `ErrorOccurred` on failure.
    */
    pub fn parse_input_file(&mut self) -> bool {
        let Some(input) = self.input.clone() else {
            self.events
                .push(PropertyChangeEvent::ErrorOccurred("no input file set".to_string()));
            return false;
        };

        match ffmpeg_source::probe(&input) {
            Ok(info) => {
                self.duration = info.duration.unwrap_or_default();
                self.tracks = info.tracks;
                debug!(input = %input.display(), duration = ?self.duration, tracks = self.tracks.len(), "parsed input");
                self.events
                    .push(PropertyChangeEvent::DurationChanged(self.duration));
                self.events
                    .push(PropertyChangeEvent::TrackListChanged(self.tracks.clone()));
                true
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "failed to parse input");
                self.events.push(PropertyChangeEvent::ErrorOccurred(e.to_string()));
                false
            }
        }
    }

    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) {
        self.output = Some(path.into());
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn set_video_encode_context(&mut self, context: EncodeContext) {
        self.video = context;
    }

    pub fn video_encode_context(&self) -> &EncodeContext {
        &self.video
    }

    pub fn set_audio_encode_context(&mut self, context: EncodeContext) {
        self.audio = context;
    }

    pub fn audio_encode_context(&self) -> &EncodeContext {
        &self.audio
    }

    /**
        Limit the job to `[start, end]`. The end must lie after the start.
    */
    pub fn set_range(&mut self, start: Option<Duration>, end: Option<Duration>) -> Result<()> {
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(Error::invalid_data(format!(
                    "range end {end:?} is not after start {start:?}"
                )));
            }
        }
        self.start = start;
        self.end = end;
        Ok(())
    }

    pub fn range(&self) -> (Option<Duration>, Option<Duration>) {
        (self.start, self.end)
    }

    /**
        Burn a subtitle file into the video. The file must exist.
    */
    pub fn set_subtitle_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("subtitle file {} not found", path.display()),
            )));
        }
        self.subtitle = Some(path);
        Ok(())
    }

    pub fn clear_subtitle_file(&mut self) {
        self.subtitle = None;
    }

    /**
        Start a job on a worker thread.

        Fails only when no input or output is set or a job is running;
        everything else is reported through events.
    */
    pub fn start_transcode(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::invalid_data("a transcode is already running"));
        }
        self.join_worker();

        let spec = JobSpec {
            input: self
                .input
                .clone()
                .ok_or_else(|| Error::invalid_data("no input file set"))?,
            output: self
                .output
                .clone()
                .ok_or_else(|| Error::invalid_data("no output file set"))?,
            video: self.video.clone(),
            audio: self.audio.clone(),
            subtitle: self.subtitle.clone(),
            start: self.start,
            end: self.end,
        };

        self.cancel.store(false, Ordering::SeqCst);
        self.fps.store(0.0, Ordering::Relaxed);

        let events = Arc::clone(&self.events);
        let fps = Arc::clone(&self.fps);
        let cancel = Arc::clone(&self.cancel);

        let handle = thread::Builder::new()
            .name("transcode".to_string())
            .spawn(move || guard_worker(&events, || run_job(&spec, &events, &fps, &cancel)))
            .map_err(Error::Io)?;
        self.worker = Some(handle);
        Ok(())
    }

    /**
        Cancel the running job and wait for its worker to finish. The job
        still drains and writes its trailer.
    */
    pub fn stop_transcode(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.join_worker();
    }

    /**
        Block until the current job ends on its own.
    */
    pub fn wait(&mut self) {
        self.join_worker();
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /**
        Stop any job and forget what was learned about the input.
        Configuration is kept.
    */
    pub fn reset(&mut self) {
        self.stop_transcode();
        self.cancel.store(false, Ordering::SeqCst);
        self.duration = Duration::ZERO;
        self.tracks.clear();
        self.fps.store(0.0, Ordering::Relaxed);
        self.preview.clear();
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("transcode worker panicked");
            }
        }
    }

    /**
        Extract `count` preview frames in the background.
    */
    pub fn start_preview_frames(&self, count: usize) {
        match &self.input {
            Some(input) => self
                .preview
                .start(input.clone(), count, Arc::clone(&self.events)),
            None => self
                .events
                .push(PropertyChangeEvent::ErrorOccurred("no input file set".to_string())),
        }
    }

    pub fn preview_frames(&self) -> Vec<PreviewFrame> {
        self.preview.frames()
    }

    /**
        Video frames encoded per second, averaged over the whole job once it
        has finished.
    */
    pub fn fps(&self) -> f32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    pub fn take_property_change_event(&self) -> Option<PropertyChangeEvent> {
        self.events.take()
    }

    pub fn wait_property_change_event(&self, timeout: Duration) -> Option<PropertyChangeEvent> {
        self.events.wait_timeout(timeout)
    }

    pub fn set_property_event_queue_max_size(&self, size: usize) {
        self.events.set_max_size(size);
    }

    pub fn property_event_queue_max_size(&self) -> usize {
        self.events.max_size()
    }

    pub fn property_change_event_count(&self) -> usize {
        self.events.len()
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        self.stop_transcode();
    }
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("running", &self.is_running())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

/**
    Run `work`, turning a panic into an `ErrorOccurred` event so the
    observer always hears how the job ended.
*/
fn guard_worker(events: &EventQueue, work: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(reason = %reason, "transcode worker panicked");
        events.push(PropertyChangeEvent::ErrorOccurred(format!(
            "transcode worker panicked: {reason}"
        )));
    }
}

fn run_job(spec: &JobSpec, events: &EventQueue, fps: &AtomicF32, cancel: &AtomicBool) {
    let mut job = match Job::setup(spec) {
        Ok(job) => job,
        Err(e) => {
            warn!(input = %spec.input.display(), error = %e, "transcode setup failed");
            events.push(PropertyChangeEvent::ErrorOccurred(e.to_string()));
            return;
        }
    };

    let signals = JobSignals { events, fps, cancel };
    match job.run(&signals) {
        Ok(outcome) => events.push(PropertyChangeEvent::TranscodeFinished {
            elapsed: outcome.elapsed,
            cancelled: outcome.cancelled,
        }),
        Err(e) => {
            warn!(output = %spec.output.display(), error = %e, "transcode failed");
            events.push(PropertyChangeEvent::ErrorOccurred(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(transcoder: &Transcoder) -> Vec<PropertyChangeEvent> {
        std::iter::from_fn(|| transcoder.take_property_change_event()).collect()
    }

    #[test]
    fn parsing_a_missing_file_reports_an_error() {
        let mut transcoder = Transcoder::new().unwrap();
        transcoder.set_input_path("/nonexistent/input.mkv");
        assert!(!transcoder.parse_input_file());
        let events = drain(&transcoder);
        assert!(matches!(events.as_slice(), [PropertyChangeEvent::ErrorOccurred(_)]));
        assert_eq!(transcoder.duration(), Duration::ZERO);
    }

    #[test]
    fn start_needs_input_and_output() {
        let mut transcoder = Transcoder::new().unwrap();
        assert!(transcoder.start_transcode().is_err());
        transcoder.set_input_path("in.mkv");
        assert!(transcoder.start_transcode().is_err());
        assert!(!transcoder.is_running());
    }

    #[test]
    fn setup_failure_is_one_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcoder = Transcoder::new().unwrap();
        transcoder.set_input_path(dir.path().join("missing.mkv"));
        transcoder.set_output_path(dir.path().join("out.mkv"));
        transcoder.start_transcode().unwrap();
        transcoder.wait();

        let events = drain(&transcoder);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PropertyChangeEvent::ErrorOccurred(_)));
    }

    #[test]
    fn range_end_must_follow_start() {
        let mut transcoder = Transcoder::new().unwrap();
        let secs = |s| Some(Duration::from_secs(s));
        assert!(transcoder.set_range(secs(5), secs(5)).is_err());
        assert!(transcoder.set_range(secs(5), secs(2)).is_err());
        transcoder.set_range(secs(1), secs(2)).unwrap();
        assert_eq!(transcoder.range(), (secs(1), secs(2)));
        transcoder.set_range(None, secs(3)).unwrap();
    }

    #[test]
    fn subtitle_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcoder = Transcoder::new().unwrap();
        let err = transcoder
            .set_subtitle_file(dir.path().join("missing.srt"))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let path = dir.path().join("subs.srt");
        std::fs::write(&path, "1\n00:00:00,000 --> 00:00:01,000\nhi\n").unwrap();
        transcoder.set_subtitle_file(&path).unwrap();
    }

    #[test]
    fn event_queue_size_is_configurable() {
        let transcoder = Transcoder::new().unwrap();
        assert_eq!(transcoder.property_event_queue_max_size(), DEFAULT_EVENT_QUEUE_SIZE);
        transcoder.set_property_event_queue_max_size(2);
        transcoder.start_preview_frames(3);
        transcoder.start_preview_frames(3);
        transcoder.start_preview_frames(3);
        assert_eq!(transcoder.property_change_event_count(), 2);
    }

    #[test]
    fn worker_panic_becomes_an_error_event() {
        let events = EventQueue::new(8);
        guard_worker(&events, || panic!("frame pool exhausted"));

        match events.take() {
            Some(PropertyChangeEvent::ErrorOccurred(message)) => {
                assert!(message.contains("frame pool exhausted"), "{message}");
            }
            other => panic!("expected an error event, got {other:?}"),
        }
        assert!(events.is_empty());

        guard_worker(&events, || {});
        assert!(events.is_empty());
    }

    #[test]
    fn reset_without_a_job_is_harmless() {
        let mut transcoder = Transcoder::new().unwrap();
        transcoder.reset();
        transcoder.reset();
        assert!(!transcoder.is_running());
        assert_eq!(transcoder.fps(), 0.0);
    }
}
