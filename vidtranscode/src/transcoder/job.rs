/*!
    One transcode run: stream mapping, the packet loop and draining.
*/

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ffmpeg_encode::EncodeContext;
use ffmpeg_sink::Sink;
use ffmpeg_source::Source;
use ffmpeg_types::{Error, MediaKind, Result};
use tracing::{debug, info, warn};

use crate::events::{EventQueue, PropertyChangeEvent};
use crate::fps::{AtomicF32, FpsCounter};

use super::context::{MappingSettings, TranscodeContext};
use super::range::RangeGate;

/**
    Everything a run needs, cloned out of the engine when it starts.
*/
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video: EncodeContext,
    pub audio: EncodeContext,
    pub subtitle: Option<PathBuf>,
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

/**
    How a run that reached the packet loop ended.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobOutcome {
    pub elapsed: Duration,
    pub cancelled: bool,
    pub video_frames: u64,
    pub position: Duration,
}

/**
    Observers shared with the engine.
*/
pub struct JobSignals<'a> {
    pub events: &'a EventQueue,
    pub fps: &'a AtomicF32,
    pub cancel: &'a AtomicBool,
}

/**
    A mapped job, ready to run.

    Contexts are indexed by input stream index and live until the job is
    dropped.
*/
pub struct Job {
    source: Source,
    sink: Sink,
    contexts: Vec<TranscodeContext>,
    gate: RangeGate,
    start: Option<Duration>,
}

impl Job {
    /**
        Open input and output, map every stream and write the header.

        Any failure here is fatal and nothing is transcoded.
    */
    pub fn setup(spec: &JobSpec) -> Result<Self> {
        let source = Source::open(&spec.input)?;
        let mut sink = Sink::open(&spec.output)?;
        sink.set_metadata(&source.metadata());

        let settings = MappingSettings {
            video: &spec.video,
            audio: &spec.audio,
            subtitle: spec.subtitle.as_deref(),
        };
        let burn_target = source
            .streams()
            .iter()
            .find(|s| s.kind == MediaKind::Video && !s.is_attached_pic())
            .map(|s| s.index);

        let mut contexts = Vec::with_capacity(source.streams().len());
        for stream in source.streams() {
            let burn = burn_target == Some(stream.index);
            contexts.push(TranscodeContext::open(stream, &settings, burn, &mut sink)?);
        }

        if sink.stream_count() != contexts.len() {
            return Err(Error::mux(format!(
                "mapped {} input streams to {} output streams",
                contexts.len(),
                sink.stream_count()
            )));
        }

        sink.add_chapters(&source.chapters())?;
        sink.write_header()?;

        for context in &contexts {
            debug!(
                stream = context.index(),
                kind = %context.kind(),
                time_base = ?sink.stream_time_base(context.index()),
                "output stream ready"
            );
        }

        let tracked = contexts.iter().map(TranscodeContext::is_reencoded).collect();
        let gate = RangeGate::new(spec.end, tracked);

        Ok(Self {
            source,
            sink,
            contexts,
            gate,
            start: spec.start,
        })
    }

    pub fn contexts(&self) -> &[TranscodeContext] {
        &self.contexts
    }

    /**
        Run the packet loop, drain every stream and write the trailer.

        Cancellation stops reading but still drains, so a stopped job leaves
        a playable file. Errors scoped to one packet are reported and the
        packet is dropped. Any other error ends the run without a trailer.
    */
    pub fn run(&mut self, signals: &JobSignals<'_>) -> Result<JobOutcome> {
        let started = Instant::now();
        let mut fps = FpsCounter::new();
        let mut position = Duration::ZERO;
        let mut cancelled = false;

        if let Some(start) = self.start {
            self.source.seek(start)?;
        }

        info!(
            input = %self.source.path().display(),
            output = %self.sink.path().display(),
            streams = self.contexts.len(),
            "transcode started"
        );

        loop {
            if signals.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "input ended early");
                    signals.events.push(PropertyChangeEvent::ErrorOccurred(e.to_string()));
                    break;
                }
            };

            let index = packet.stream_index();
            let timestamp = packet
                .timestamp()
                .map(|ts| packet.time_base().to_duration(ts));

            if !self.gate.admit(index, timestamp) {
                if self.gate.is_exhausted() {
                    debug!(end = ?self.gate.end(), "reached end of range");
                    break;
                }
                continue;
            }

            let Some(context) = self.contexts.get_mut(index) else {
                continue;
            };
            let reencoded = context.is_reencoded();

            match context.transcode_packet(packet, &mut self.sink) {
                Ok(frames) => {
                    if let Some(rate) = fps.tick(frames) {
                        signals.fps.store(rate, Ordering::Relaxed);
                    }
                }
                Err(e) if e.is_recoverable() => report(signals.events, index, &e),
                Err(e) => return Err(e),
            }
            for e in context.take_dropped() {
                report(signals.events, index, &e);
            }

            if let Some(ts) = timestamp.filter(|&ts| reencoded && ts > position) {
                position = ts;
                signals.events.push(PropertyChangeEvent::PositionChanged(position));
            }
        }

        for context in &mut self.contexts {
            match context.drain(&mut self.sink) {
                Ok(frames) => {
                    fps.tick(frames);
                }
                Err(e) if e.is_recoverable() => report(signals.events, context.index(), &e),
                Err(e) => return Err(e),
            }
            for e in context.take_dropped() {
                report(signals.events, context.index(), &e);
            }
        }

        self.sink.write_trailer()?;
        signals.fps.store(fps.finish(), Ordering::Relaxed);

        let outcome = JobOutcome {
            elapsed: started.elapsed(),
            cancelled,
            video_frames: fps.total_frames(),
            position,
        };
        info!(
            elapsed = ?outcome.elapsed,
            frames = outcome.video_frames,
            fps = fps.fps(),
            cancelled,
            "transcode finished"
        );
        Ok(outcome)
    }
}

fn report(events: &EventQueue, stream: usize, error: &Error) {
    warn!(stream, error = %error, "dropping packet");
    events.push(PropertyChangeEvent::ErrorOccurred(error.to_string()));
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("source", &self.source)
            .field("sink", &self.sink)
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}
