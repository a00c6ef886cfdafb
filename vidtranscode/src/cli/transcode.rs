use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use ffmpeg_encode::{EncodeContext, EncoderPreset, EncoderTune};
use ffmpeg_types::FrameSize;
use vidtranscode::{JobFile, PropertyChangeEvent, Transcoder};

const EVENT_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
pub struct TranscodeCommand {
    /// Input media file
    pub input: Option<PathBuf>,

    /// Output file; the container follows the extension
    pub output: Option<PathBuf>,

    /// TOML job file; flags given here override it
    #[arg(long)]
    pub job: Option<PathBuf>,

    /// Video encoder, e.g. libx264 (default: the source codec)
    #[arg(long)]
    pub video_encoder: Option<String>,

    /// Constant rate factor, 0-51
    #[arg(long)]
    pub crf: Option<u8>,

    #[arg(long)]
    pub preset: Option<EncoderPreset>,

    #[arg(long)]
    pub tune: Option<EncoderTune>,

    /// Encoder profile, e.g. high
    #[arg(long)]
    pub profile: Option<String>,

    /// Output frame size, WIDTHxHEIGHT
    #[arg(long)]
    pub size: Option<FrameSize>,

    /// Target video bitrate in bits per second
    #[arg(long)]
    pub video_bitrate: Option<u64>,

    /// Audio encoder, e.g. aac (default: the source codec)
    #[arg(long)]
    pub audio_encoder: Option<String>,

    /// Target audio bitrate in bits per second
    #[arg(long)]
    pub audio_bitrate: Option<u64>,

    /// Maximum audio bitrate in bits per second
    #[arg(long)]
    pub audio_max_bitrate: Option<u64>,

    /// Output channel layout, e.g. stereo
    #[arg(long)]
    pub channel_layout: Option<String>,

    /// Codec threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Decode in software only
    #[arg(long)]
    pub no_gpu_decode: bool,

    /// Subtitle file to burn into the video
    #[arg(long)]
    pub subtitle: Option<PathBuf>,

    /// Start of the range, in seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// End of the range, in seconds
    #[arg(long)]
    pub end: Option<f64>,
}

impl TranscodeCommand {
    pub fn run(self) -> Result<()> {
        let job = match &self.job {
            Some(path) => JobFile::load(path)?,
            None => JobFile::default(),
        };

        let input = self
            .input
            .clone()
            .or(job.input.clone())
            .context("No input file given")?;
        let output = self
            .output
            .clone()
            .or(job.output.clone())
            .context("No output file given")?;

        let (job_start, job_end) = job.range()?;
        let start = seconds(self.start)?.or(job_start);
        let end = seconds(self.end)?.or(job_end);

        let video = self.video_context(job.video.clone().unwrap_or_else(|| EncodeContext::video("")));
        let audio = self.audio_context(job.audio.clone().unwrap_or_else(|| EncodeContext::audio("")));

        let mut transcoder = Transcoder::new()?;
        transcoder.set_input_path(&input);
        transcoder.set_output_path(&output);
        transcoder.set_video_encode_context(video);
        transcoder.set_audio_encode_context(audio);
        transcoder.set_range(start, end)?;
        if let Some(subtitle) = self.subtitle.clone().or(job.subtitle.clone()) {
            transcoder.set_subtitle_file(subtitle)?;
        }

        if !transcoder.parse_input_file() {
            let reason = last_error(&transcoder).unwrap_or_default();
            bail!("Failed to read {}: {reason}", input.display());
        }
        let duration = transcoder.duration();
        for track in transcoder.tracks() {
            info!(index = track.index, kind = %track.kind, codec = %track.codec, "input track");
        }

        transcoder.start_transcode()?;

        let mut errors = Vec::new();
        let mut finished = None;
        loop {
            match transcoder.wait_property_change_event(EVENT_POLL) {
                Some(event) => {
                    if let Some(done) = handle_event(event, duration, transcoder.fps(), &mut errors) {
                        finished = Some(done);
                        break;
                    }
                }
                None if !transcoder.is_running() => break,
                None => {}
            }
        }
        transcoder.wait();
        while let Some(event) = transcoder.take_property_change_event() {
            if let Some(done) = handle_event(event, duration, transcoder.fps(), &mut errors) {
                finished = Some(done);
            }
        }
        eprintln!();

        match finished {
            Some((elapsed, cancelled)) => {
                println!(
                    "{} {} in {:.1}s ({:.1} fps)",
                    if cancelled { "Stopped" } else { "Wrote" },
                    output.display(),
                    elapsed.as_secs_f64(),
                    transcoder.fps()
                );
                if !errors.is_empty() {
                    eprintln!("{} packet(s) could not be transcoded", errors.len());
                }
                Ok(())
            }
            None => bail!(
                "Transcode failed: {}",
                errors.last().map(String::as_str).unwrap_or("unknown error")
            ),
        }
    }

    fn video_context(&self, mut video: EncodeContext) -> EncodeContext {
        if let Some(encoder) = &self.video_encoder {
            video.encoder = encoder.clone();
        }
        if let Some(crf) = self.crf {
            video = video.with_crf(crf);
        }
        if let Some(preset) = self.preset {
            video = video.with_preset(preset);
        }
        if let Some(tune) = self.tune {
            video = video.with_tune(tune);
        }
        if let Some(profile) = &self.profile {
            video = video.with_profile(profile.clone());
        }
        if let Some(size) = self.size {
            video = video.with_size(size);
        }
        if let Some(bitrate) = self.video_bitrate {
            video = video.with_bitrate(bitrate);
        }
        self.common(video)
    }

    fn audio_context(&self, mut audio: EncodeContext) -> EncodeContext {
        if let Some(encoder) = &self.audio_encoder {
            audio.encoder = encoder.clone();
        }
        if let Some(bitrate) = self.audio_bitrate {
            audio = audio.with_bitrate(bitrate);
        }
        if self.audio_max_bitrate.is_some() {
            audio = audio.with_bitrate_bounds(audio.bitrate.min, self.audio_max_bitrate);
        }
        if let Some(layout) = &self.channel_layout {
            audio = audio.with_channel_layout(layout.clone());
        }
        self.common(audio)
    }

    fn common(&self, mut context: EncodeContext) -> EncodeContext {
        if let Some(threads) = self.threads {
            context = context.with_thread_count(threads);
        }
        if self.no_gpu_decode {
            context = context.with_gpu_decode(false);
        }
        context
    }
}

/**
    Print one event. Returns the job result once it finished.
*/
fn handle_event(
    event: PropertyChangeEvent,
    duration: Duration,
    fps: f32,
    errors: &mut Vec<String>,
) -> Option<(Duration, bool)> {
    match event {
        PropertyChangeEvent::PositionChanged(position) => {
            let percent = if duration.is_zero() {
                0.0
            } else {
                (position.as_secs_f64() / duration.as_secs_f64() * 100.0).min(100.0)
            };
            eprint!(
                "\r{:>8.1}s / {:.1}s  {percent:5.1}%  {fps:6.1} fps",
                position.as_secs_f64(),
                duration.as_secs_f64()
            );
            let _ = std::io::stderr().flush();
            None
        }
        PropertyChangeEvent::ErrorOccurred(message) => {
            eprintln!("\nerror: {message}");
            errors.push(message);
            None
        }
        PropertyChangeEvent::TranscodeFinished { elapsed, cancelled } => Some((elapsed, cancelled)),
        _ => None,
    }
}

fn last_error(transcoder: &Transcoder) -> Option<String> {
    std::iter::from_fn(|| transcoder.take_property_change_event())
        .filter_map(|event| match event {
            PropertyChangeEvent::ErrorOccurred(message) => Some(message),
            _ => None,
        })
        .last()
}

fn seconds(value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|s| Duration::try_from_secs_f64(s).with_context(|| format!("Invalid time {s}")))
        .transpose()
}
