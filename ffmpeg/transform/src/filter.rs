/*!
    FFmpeg filter graphs for the transcode path.
*/

use std::path::Path;

use ffmpeg_next::{
    ffi, filter,
    format::{Pixel, Sample},
    util::frame::{audio::Audio as AudioFrameFFmpeg, video::Video as VideoFrameFFmpeg},
};
use tracing::debug;

use ffmpeg_types::{Error, Frame, FrameSize, MediaKind, Rational, Result, channel_layout};

/**
    Subtitle file to burn into the video.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtitleBurn {
    /// Path already escaped with [`escape_filter_path`].
    pub escaped_path: String,
    /// Video size the subtitle layout is computed for.
    pub original_size: FrameSize,
}

impl SubtitleBurn {
    pub fn new(path: &Path, original_size: FrameSize) -> Self {
        Self {
            escaped_path: escape_filter_path(&path.to_string_lossy()),
            original_size,
        }
    }
}

/**
    Format the graph's sink must produce, i.e. what the encoder accepts.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConstraint {
    Video {
        pixel_format: Pixel,
    },
    Audio {
        sample_format: Sample,
        sample_rate: u32,
        channel_layout: String,
    },
}

impl SinkConstraint {
    fn kind(&self) -> MediaKind {
        match self {
            Self::Video { .. } => MediaKind::Video,
            Self::Audio { .. } => MediaKind::Audio,
        }
    }

    /**
        Filter appended to the chain that forces the output format.
    */
    pub fn to_filter(&self) -> String {
        match self {
            Self::Video { pixel_format } => {
                format!("format=pix_fmts={}", pixel_format_name(*pixel_format))
            }
            Self::Audio {
                sample_format,
                sample_rate,
                channel_layout,
            } => format!(
                "aformat=sample_fmts={}:sample_rates={sample_rate}:channel_layouts={channel_layout}",
                sample_format.name()
            ),
        }
    }
}

/**
    Video filter chain: optional scale, optional subtitle burn-in, else `null`.
*/
pub fn video_filter_chain(target: Option<FrameSize>, subtitle: Option<&SubtitleBurn>) -> String {
    let mut filters = Vec::new();
    if let Some(size) = target.filter(|size| !size.is_empty()) {
        filters.push(format!("scale={}:{}", size.width, size.height));
    }
    if let Some(burn) = subtitle {
        filters.push(format!(
            "subtitles=filename='{}':original_size={}",
            burn.escaped_path, burn.original_size
        ));
    }
    if filters.is_empty() {
        "null".to_string()
    } else {
        filters.join(",")
    }
}

/**
    Audio filter chain. Audio is passed through; format conversion comes
    from the sink constraint.
*/
pub fn audio_filter_chain() -> String {
    "anull".to_string()
}

/**
    Escape a file path for use inside a single-quoted filter option.

    Filter descriptions are unescaped twice, once by the graph parser and
    once by the option parser. Backslashes, colons and quotes are escaped
    for the option parser, then quotes are escaped again so they survive
    the graph parser's single-quoted string.
*/
pub fn escape_filter_path(path: &str) -> String {
    let mut option_level = String::with_capacity(path.len() + 8);
    for c in path.chars() {
        if matches!(c, '\\' | ':' | '\'') {
            option_level.push('\\');
        }
        option_level.push(c);
    }
    option_level.replace('\'', r"'\''")
}

/**
    Arguments for a `buffer` source matching a video frame.
*/
pub fn video_source_args(frame: &VideoFrameFFmpeg, time_base: Rational) -> String {
    let aspect = Rational::from(frame.aspect_ratio());
    let aspect = if aspect.is_valid() && aspect.num > 0 {
        aspect
    } else {
        Rational::new(1, 1)
    };
    format!(
        "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}",
        frame.width(),
        frame.height(),
        ffi::AVPixelFormat::from(frame.format()) as i32,
        time_base,
        aspect
    )
}

/**
    Arguments for an `abuffer` source matching an audio frame.

    Audio enters the graph in a `1/sample_rate` time base.
*/
pub fn audio_source_args(frame: &AudioFrameFFmpeg) -> String {
    // SAFETY: the frame is allocated and its layout initialized by the decoder.
    let (order, channels) = unsafe {
        let layout = &(*frame.as_ptr()).ch_layout;
        (layout.order, layout.nb_channels)
    };
    let layout = if order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC {
        None
    } else {
        // SAFETY: as above.
        unsafe { channel_layout::describe(&(*frame.as_ptr()).ch_layout) }
    }
    .unwrap_or_else(|| channel_layout::default_for_channels(channels.max(1) as u16));

    format!(
        "time_base=1/{rate}:sample_rate={rate}:sample_fmt={}:channel_layout={layout}",
        frame.format().name(),
        rate = frame.rate(),
    )
}

fn pixel_format_name(pixel: Pixel) -> &'static str {
    pixel.descriptor().map(|d| d.name()).unwrap_or("none")
}

/**
    A configured `source -> chain -> constraint -> sink` filter graph.

    Built from the first decoded frame of a stream, since the source node
    needs that frame's concrete format and time base.
*/
pub struct FilterGraph {
    graph: filter::Graph,
    kind: MediaKind,
    stream_index: usize,
    spec: String,
}

impl FilterGraph {
    /**
        Build a graph for `stream_index` whose source matches `first`.

        `decoder_time_base` is the time base of video frame timestamps.
        Any failure while building is reported as `FilterConfigFailed`.
    */
    pub fn new(
        stream_index: usize,
        first: &Frame,
        decoder_time_base: Rational,
        chain: &str,
        constraint: &SinkConstraint,
    ) -> Result<Self> {
        let spec = format!("{chain},{}", constraint.to_filter());
        let fail = |reason: String| Error::FilterConfigFailed {
            stream: stream_index,
            spec: spec.clone(),
            reason,
        };

        if first.kind() != constraint.kind() {
            return Err(fail(format!(
                "{} frame cannot feed a {} graph",
                first.kind(),
                constraint.kind()
            )));
        }

        let (source_name, sink_name, args) = match first {
            Frame::Video(video) => ("buffer", "buffersink", video_source_args(video, decoder_time_base)),
            Frame::Audio(audio) => ("abuffer", "abuffersink", audio_source_args(audio)),
        };

        let mut graph = filter::Graph::new();
        let source = filter::find(source_name).ok_or_else(|| fail(format!("no {source_name} filter")))?;
        let sink = filter::find(sink_name).ok_or_else(|| fail(format!("no {sink_name} filter")))?;

        graph
            .add(&source, "in", &args)
            .map_err(|e| fail(format!("source '{args}': {e}")))?;
        graph
            .add(&sink, "out", "")
            .map_err(|e| fail(format!("sink: {e}")))?;

        graph
            .output("in", 0)
            .and_then(|parser| parser.input("out", 0))
            .and_then(|parser| parser.parse(&spec))
            .map_err(|e| fail(format!("parse: {e}")))?;
        graph.validate().map_err(|e| fail(format!("configure: {e}")))?;

        debug!(stream = stream_index, source = %args, spec = %spec, "configured filter graph");

        Ok(Self {
            graph,
            kind: first.kind(),
            stream_index,
            spec,
        })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /**
        Time base of frames coming out of the sink.
    */
    pub fn time_base(&mut self) -> Result<Rational> {
        let sink = self
            .graph
            .get("out")
            .ok_or_else(|| Error::codec("filter graph has no sink"))?;
        // SAFETY: the sink context belongs to the configured graph.
        let tb = unsafe { ffi::av_buffersink_get_time_base(sink.as_ptr()) };
        Ok(ffmpeg_next::Rational::from(tb).into())
    }

    /**
        Push a frame, or `None` to signal end of stream, and collect every
        frame the sink has ready.
    */
    pub fn push(&mut self, frame: Option<&Frame>) -> Result<Vec<Frame>> {
        {
            let mut source = self
                .graph
                .get("in")
                .ok_or_else(|| Error::codec("filter graph has no source"))?;
            let mut source = source.source();
            match frame {
                Some(frame) => source.add(frame.as_ffmpeg()),
                None => source.flush(),
            }
            .map_err(|e| Error::codec(format!("filtering stream {}: {e}", self.stream_index)))?;
        }

        let mut sink = self
            .graph
            .get("out")
            .ok_or_else(|| Error::codec("filter graph has no sink"))?;
        let mut sink = sink.sink();

        let mut frames = Vec::new();
        loop {
            let received = match self.kind {
                MediaKind::Video => {
                    let mut out = VideoFrameFFmpeg::empty();
                    sink.frame(&mut out).map(|()| {
                        out.set_kind(ffmpeg_next::picture::Type::None);
                        Frame::Video(out)
                    })
                }
                _ => {
                    let mut out = AudioFrameFFmpeg::empty();
                    sink.frame(&mut out).map(|()| Frame::Audio(out))
                }
            };

            match received {
                Ok(frame) => frames.push(frame),
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => break,
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => {
                    return Err(Error::codec(format!(
                        "reading filtered frames for stream {}: {e}",
                        self.stream_index
                    )));
                }
            }
        }

        Ok(frames)
    }
}

impl std::fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterGraph")
            .field("stream_index", &self.stream_index)
            .field("kind", &self.kind)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_video_chain_is_null() {
        assert_eq!(video_filter_chain(None, None), "null");
        assert_eq!(video_filter_chain(Some(FrameSize::new(0, 0)), None), "null");
    }

    #[test]
    fn scale_then_subtitles() {
        assert_eq!(
            video_filter_chain(Some(FrameSize::new(640, 360)), None),
            "scale=640:360"
        );

        let burn = SubtitleBurn {
            escaped_path: "subs.srt".into(),
            original_size: FrameSize::new(640, 360),
        };
        assert_eq!(
            video_filter_chain(Some(FrameSize::new(640, 360)), Some(&burn)),
            "scale=640:360,subtitles=filename='subs.srt':original_size=640x360"
        );
        assert_eq!(
            video_filter_chain(None, Some(&burn)),
            "subtitles=filename='subs.srt':original_size=640x360"
        );
    }

    #[test]
    fn audio_chain_passes_through() {
        assert_eq!(audio_filter_chain(), "anull");
    }

    #[test]
    fn windows_paths_are_escaped() {
        assert_eq!(escape_filter_path(r"C:\subs\a.srt"), r"C\:\\subs\\a.srt");
        assert_eq!(escape_filter_path("/tmp/plain.srt"), "/tmp/plain.srt");
    }

    #[test]
    fn quotes_survive_both_parsers() {
        assert_eq!(escape_filter_path("it's.srt"), r"it\'\''s.srt");
    }

    #[test]
    fn constraints_name_the_encoder_format() {
        let video = SinkConstraint::Video {
            pixel_format: Pixel::YUV420P,
        };
        assert_eq!(video.to_filter(), "format=pix_fmts=yuv420p");

        let audio = SinkConstraint::Audio {
            sample_format: Sample::F32(ffmpeg_next::format::sample::Type::Planar),
            sample_rate: 48000,
            channel_layout: "stereo".into(),
        };
        assert_eq!(
            audio.to_filter(),
            "aformat=sample_fmts=fltp:sample_rates=48000:channel_layouts=stereo"
        );
    }

    #[test]
    fn source_args_describe_the_frame() {
        ffmpeg_next::init().unwrap();
        let video = VideoFrameFFmpeg::new(Pixel::YUV420P, 320, 240);
        assert_eq!(
            video_source_args(&video, Rational::new(1, 25)),
            "video_size=320x240:pix_fmt=0:time_base=1/25:pixel_aspect=1/1"
        );

        let audio = AudioFrameFFmpeg::new(
            Sample::F32(ffmpeg_next::format::sample::Type::Planar),
            1024,
            ffmpeg_next::ChannelLayout::STEREO,
        );
        let args = audio_source_args(&audio);
        assert!(args.contains("sample_fmt=fltp"), "{args}");
        assert!(args.contains("channel_layout=stereo"), "{args}");
    }

    #[test]
    fn mismatched_frame_kind_is_a_config_error() {
        ffmpeg_next::init().unwrap();
        let frame = Frame::Video(VideoFrameFFmpeg::new(Pixel::YUV420P, 16, 16));
        let constraint = SinkConstraint::Audio {
            sample_format: Sample::I16(ffmpeg_next::format::sample::Type::Packed),
            sample_rate: 44100,
            channel_layout: "stereo".into(),
        };
        let err = FilterGraph::new(0, &frame, Rational::new(1, 25), "anull", &constraint).unwrap_err();
        assert!(matches!(err, Error::FilterConfigFailed { stream: 0, .. }));
    }

    #[test]
    fn scales_video_frames() {
        ffmpeg_next::init().unwrap();
        let mut input = VideoFrameFFmpeg::new(Pixel::YUV420P, 64, 48);
        input.set_pts(Some(0));
        let first = Frame::Video(input);
        let constraint = SinkConstraint::Video {
            pixel_format: Pixel::YUV420P,
        };
        let chain = video_filter_chain(Some(FrameSize::new(32, 24)), None);

        let mut graph = FilterGraph::new(0, &first, Rational::new(1, 25), &chain, &constraint).unwrap();
        assert_eq!(graph.time_base().unwrap(), Rational::new(1, 25));

        let mut out = graph.push(Some(&first)).unwrap();
        out.extend(graph.push(None).unwrap());
        assert_eq!(out.len(), 1);
        let video = out[0].as_video().unwrap();
        assert_eq!((video.width(), video.height()), (32, 24));
    }
}
