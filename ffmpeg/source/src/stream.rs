/*!
    Per-stream description of an opened input.
*/

use ffmpeg_next::{codec::Discard, format::stream::Disposition};

use ffmpeg_types::{FrameSize, MediaKind, Rational};

use crate::codec_config::CodecConfig;
use crate::convert::{codec_name, known_rational, lookup, metadata_pairs};

/**
    Immutable description of one input stream.

    Everything the output side needs to recreate the stream is copied out of
    the demuxer: codec parameters, disposition, discard mode, aspect ratio,
    frame rates and per-stream metadata.
*/
#[derive(Clone, Debug)]
pub struct MediaStream {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: Rational,
    pub codec: CodecConfig,
    pub codec_name: String,
    pub disposition: Disposition,
    pub discard: Discard,
    pub sample_aspect_ratio: Rational,
    pub avg_frame_rate: Option<Rational>,
    pub real_frame_rate: Option<Rational>,
    pub metadata: Vec<(String, String)>,
    /// Coded size for video streams.
    pub size: Option<FrameSize>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl MediaStream {
    pub(crate) fn from_stream(stream: &ffmpeg_next::format::stream::Stream<'_>) -> Self {
        let parameters = stream.parameters().clone();
        let kind = MediaKind::from(parameters.medium());

        // SAFETY: `stream` borrows a live AVStream owned by the input context,
        // and its codecpar is always allocated.
        let (sample_aspect_ratio, width, height, sample_rate, channels) = unsafe {
            let st = stream.as_ptr();
            let par = (*st).codecpar;
            (
                Rational::from(ffmpeg_next::Rational::from((*st).sample_aspect_ratio)),
                (*par).width,
                (*par).height,
                (*par).sample_rate,
                (*par).ch_layout.nb_channels,
            )
        };

        let size = (kind == MediaKind::Video)
            .then(|| FrameSize::new(width.max(0) as u32, height.max(0) as u32));
        let (sample_rate, channels) = if kind == MediaKind::Audio {
            (
                (sample_rate > 0).then_some(sample_rate as u32),
                (channels > 0).then_some(channels as u16),
            )
        } else {
            (None, None)
        };

        Self {
            index: stream.index(),
            kind,
            time_base: stream.time_base().into(),
            codec_name: codec_name(parameters.id()),
            codec: CodecConfig::new(parameters),
            disposition: stream.disposition(),
            discard: stream.discard(),
            sample_aspect_ratio,
            avg_frame_rate: known_rational(stream.avg_frame_rate()),
            real_frame_rate: known_rational(stream.rate()),
            metadata: metadata_pairs(&stream.metadata()),
            size,
            sample_rate,
            channels,
        }
    }

    /**
        Returns true for embedded cover art (a single still picture).
    */
    pub fn is_attached_pic(&self) -> bool {
        self.disposition.contains(Disposition::ATTACHED_PIC)
    }

    /**
        Frame rate to advertise for this stream: the average rate when the
        demuxer knows it, else the real base rate.
    */
    pub fn frame_rate(&self) -> Option<Rational> {
        self.avg_frame_rate.or(self.real_frame_rate)
    }

    pub fn language(&self) -> Option<&str> {
        lookup(&self.metadata, "language")
    }

    pub fn title(&self) -> Option<&str> {
        lookup(&self.metadata, "title")
    }
}
