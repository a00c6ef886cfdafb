/*!
    Per-stream transcode state.
*/

use std::path::Path;

use ffmpeg_decode::{Decoder, DecoderConfig, SubtitleDecoder};
use ffmpeg_encode::{AudioInput, EncodeContext, Encoder, VideoInput};
use ffmpeg_next::format::{Pixel, Sample, sample};
use ffmpeg_sink::Sink;
use ffmpeg_source::MediaStream;
use ffmpeg_transform::{
    AudioFifo, FilterGraph, SinkConstraint, SubtitleBurn, audio_filter_chain, video_filter_chain,
};
use ffmpeg_types::{Error, Frame, FrameSize, MediaKind, Packet, Rational, Result, channel_layout};
use tracing::debug;

/**
    What happens to one input stream's packets.
*/
pub enum StreamRoute {
    Video {
        decoder: Decoder,
        encoder: Encoder,
    },
    Audio {
        decoder: Decoder,
        encoder: Encoder,
        fifo: AudioFifo,
    },
    /// Decoder resolved so unreadable subtitles fail at setup; packets are copied.
    Subtitle { decoder: SubtitleDecoder },
    Passthrough,
}

impl StreamRoute {
    fn name(&self) -> &'static str {
        match self {
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Subtitle { .. } => "subtitle",
            Self::Passthrough => "passthrough",
        }
    }
}

/**
    Decoder, filter graph, FIFO and encoder for one input stream.

    The filter graph is built from the first decoded frame. Audio frames
    leaving the FIFO are stamped from its sample counter, offset by the
    timestamp of the first filtered frame.
*/
pub struct TranscodeContext {
    index: usize,
    kind: MediaKind,
    route: StreamRoute,
    filter: Option<FilterGraph>,
    filter_chain: String,
    audio_offset: Option<i64>,
    drained: bool,
}

/**
    Job-wide settings needed while mapping streams.
*/
pub struct MappingSettings<'a> {
    pub video: &'a EncodeContext,
    pub audio: &'a EncodeContext,
    /// Subtitle file burned into the first video stream.
    pub subtitle: Option<&'a Path>,
}

impl TranscodeContext {
    /**
        Pick a route for `stream`, open its codecs and add its output stream.

        `burn_subtitle` is honored for video routes only.
    */
    pub fn open(
        stream: &MediaStream,
        settings: &MappingSettings<'_>,
        burn_subtitle: bool,
        sink: &mut Sink,
    ) -> Result<Self> {
        let route = match stream.kind {
            MediaKind::Attachment => {
                sink.add_passthrough_stream(stream, None)?;
                StreamRoute::Passthrough
            }
            MediaKind::Video if stream.is_attached_pic() => {
                sink.add_passthrough_stream(stream, settings.video.size)?;
                StreamRoute::Passthrough
            }
            MediaKind::Subtitle => {
                let decoder = SubtitleDecoder::open(stream)?;
                sink.add_passthrough_stream(stream, None)?;
                StreamRoute::Subtitle { decoder }
            }
            MediaKind::Video => open_video(stream, settings.video, sink)?,
            MediaKind::Audio => open_audio(stream, settings.audio, sink)?,
            MediaKind::Data | MediaKind::Unknown => {
                return Err(Error::UnsupportedStreamKind {
                    stream: stream.index,
                    kind: stream.kind,
                });
            }
        };

        let filter_chain = match &route {
            StreamRoute::Video { decoder, .. } => {
                let decoded = FrameSize::new(decoder.width(), decoder.height());
                let burn = settings
                    .subtitle
                    .filter(|_| burn_subtitle)
                    .map(|path| SubtitleBurn::new(path, burn_size(settings.video.size, decoded)));
                video_filter_chain(settings.video.size, burn.as_ref())
            }
            StreamRoute::Audio { .. } => audio_filter_chain(),
            _ => String::new(),
        };

        debug!(stream = stream.index, route = route.name(), chain = %filter_chain, "mapped input stream");

        Ok(Self {
            index: stream.index,
            kind: stream.kind,
            route,
            filter: None,
            filter_chain,
            audio_offset: None,
            drained: false,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn route(&self) -> &StreamRoute {
        &self.route
    }

    pub fn is_reencoded(&self) -> bool {
        matches!(self.route, StreamRoute::Video { .. } | StreamRoute::Audio { .. })
    }

    /**
        Errors the codecs recovered from since the last call, each of which
        cost some output.
    */
    pub fn take_dropped(&mut self) -> Vec<Error> {
        match &mut self.route {
            StreamRoute::Video { decoder, encoder } | StreamRoute::Audio { decoder, encoder, .. } => {
                let mut dropped = decoder.take_dropped();
                dropped.extend(encoder.take_dropped());
                dropped
            }
            _ => Vec::new(),
        }
    }

    /**
        Route one input packet to the sink.

        Returns the number of video frames handed to the encoder.
    */
    pub fn transcode_packet(&mut self, mut packet: Packet, sink: &mut Sink) -> Result<u64> {
        let decoder = match &mut self.route {
            StreamRoute::Passthrough | StreamRoute::Subtitle { .. } => {
                sink.write_packet(packet)?;
                return Ok(0);
            }
            StreamRoute::Video { decoder, .. } | StreamRoute::Audio { decoder, .. } => decoder,
        };

        packet.rescale_to(decoder.time_base());
        let frames = decoder.decode(&packet)?;

        let mut encoded = 0;
        for frame in frames {
            encoded += self.filter_frame(frame, sink)?;
        }
        Ok(encoded)
    }

    /**
        Flush the decoder, the filter graph, the FIFO and the encoder, in
        that order. Only the first call does anything.
    */
    pub fn drain(&mut self, sink: &mut Sink) -> Result<u64> {
        if self.drained || !self.is_reencoded() {
            return Ok(0);
        }
        self.drained = true;

        let frames = match &mut self.route {
            StreamRoute::Video { decoder, .. } | StreamRoute::Audio { decoder, .. } => decoder.flush()?,
            _ => Vec::new(),
        };
        let mut encoded = 0;
        for frame in frames {
            encoded += self.filter_frame(frame, sink)?;
        }

        let flushed = match self.filter.as_mut() {
            Some(filter) => Some((filter.time_base()?, filter.push(None)?)),
            None => None,
        };
        if let Some((filter_tb, frames)) = flushed {
            for frame in frames {
                encoded += self.encode_filtered(frame, filter_tb, sink)?;
            }
        }

        if let StreamRoute::Audio { decoder, encoder, fifo } = &mut self.route {
            let offset = self.audio_offset.unwrap_or(0);
            while let Some(out) = fifo.read(true)? {
                encode_fifo_frame(out, offset, decoder.time_base(), encoder, sink)?;
            }
            debug!(stream = self.index, samples = fifo.samples_out(), "audio FIFO drained");
        }

        let packets = match &mut self.route {
            StreamRoute::Video { encoder, .. } | StreamRoute::Audio { encoder, .. } => encoder.flush()?,
            _ => Vec::new(),
        };
        for packet in packets {
            sink.write_packet(packet)?;
        }

        debug!(stream = self.index, "drained stream");
        Ok(encoded)
    }

    fn filter_frame(&mut self, mut frame: Frame, sink: &mut Sink) -> Result<u64> {
        let (decoder_tb, constraint) = match &self.route {
            StreamRoute::Video { decoder, encoder } => (
                decoder.time_base(),
                SinkConstraint::Video {
                    pixel_format: encoder.pixel_format().unwrap_or(Pixel::YUV420P),
                },
            ),
            StreamRoute::Audio { decoder, encoder, .. } => (
                decoder.time_base(),
                SinkConstraint::Audio {
                    sample_format: encoder
                        .sample_format()
                        .unwrap_or(Sample::F32(sample::Type::Planar)),
                    sample_rate: encoder.sample_rate(),
                    channel_layout: encoder
                        .channel_layout()
                        .unwrap_or_else(|| channel_layout::default_for_channels(2)),
                },
            ),
            _ => return Ok(0),
        };

        // The audio buffer source counts in samples.
        if let Some(rate) = frame.as_audio().map(|audio| audio.rate()).filter(|&r| r > 0) {
            frame.rescale(decoder_tb, Rational::new(1, rate as i32));
        }

        if self.filter.is_none() {
            self.filter = Some(FilterGraph::new(
                self.index,
                &frame,
                decoder_tb,
                &self.filter_chain,
                &constraint,
            )?);
        }
        let Some(filter) = self.filter.as_mut() else {
            return Ok(0);
        };

        let filter_tb = filter.time_base()?;
        let filtered = filter.push(Some(&frame))?;

        let mut encoded = 0;
        for frame in filtered {
            encoded += self.encode_filtered(frame, filter_tb, sink)?;
        }
        Ok(encoded)
    }

    fn encode_filtered(&mut self, mut frame: Frame, filter_tb: Rational, sink: &mut Sink) -> Result<u64> {
        match &mut self.route {
            StreamRoute::Video { encoder, .. } => {
                frame.rescale(filter_tb, encoder.time_base());
                for packet in encoder.encode(&frame)? {
                    sink.write_packet(packet)?;
                }
                Ok(1)
            }
            StreamRoute::Audio { decoder, encoder, fifo } => {
                let decoder_tb = decoder.time_base();
                let offset = *self
                    .audio_offset
                    .get_or_insert_with(|| frame.pts().map_or(0, |pts| filter_tb.rescale(pts, decoder_tb)));

                let Frame::Audio(audio) = &frame else {
                    return Err(Error::invalid_data("video frame in an audio graph"));
                };
                fifo.write(audio)?;
                while let Some(out) = fifo.read(false)? {
                    encode_fifo_frame(out, offset, decoder_tb, encoder, sink)?;
                }
                Ok(0)
            }
            _ => Ok(0),
        }
    }
}

/**
    Canvas the subtitle renderer lays out on. Subtitles are burned after
    scaling, so this is the target size when one is set.
*/
fn burn_size(target: Option<FrameSize>, decoded: FrameSize) -> FrameSize {
    target.filter(|size| !size.is_empty()).unwrap_or(decoded)
}

fn encode_fifo_frame(
    out: ffmpeg_next::frame::Audio,
    offset: i64,
    decoder_tb: Rational,
    encoder: &mut Encoder,
    sink: &mut Sink,
) -> Result<()> {
    let mut frame = Frame::Audio(out);
    frame.set_pts(frame.pts().map(|pts| pts + offset));
    frame.rescale(decoder_tb, encoder.time_base());
    for packet in encoder.encode(&frame)? {
        sink.write_packet(packet)?;
    }
    Ok(())
}

fn decoder_config(config: &EncodeContext) -> DecoderConfig {
    let mut decoder = DecoderConfig::new();
    if config.gpu_decode {
        decoder = decoder.with_hw_accel();
    }
    if let Some(threads) = config.thread_count {
        decoder = decoder.with_thread_count(threads);
    }
    decoder
}

fn open_video(stream: &MediaStream, config: &EncodeContext, sink: &mut Sink) -> Result<StreamRoute> {
    let decoder = Decoder::open(stream, &decoder_config(config))?;

    // Encode in 1/frame_rate when the rate is known, like the CLI does.
    let frame_rate = stream.frame_rate().filter(|r| r.is_valid());
    let time_base = frame_rate.map_or(decoder.time_base(), Rational::invert);

    let input = VideoInput {
        codec_id: stream.codec.id(),
        width: decoder.width(),
        height: decoder.height(),
        pixel_format: decoder.pixel_format().unwrap_or(Pixel::YUV420P),
        time_base,
        frame_rate,
        sample_aspect_ratio: decoder.sample_aspect_ratio(),
    };
    let encoder = Encoder::open_video(stream.index, input, config, sink.needs_global_header())?;
    sink.add_encoded_stream(stream, encoder.parameters()?, encoder.time_base())?;

    Ok(StreamRoute::Video { decoder, encoder })
}

fn open_audio(stream: &MediaStream, config: &EncodeContext, sink: &mut Sink) -> Result<StreamRoute> {
    let decoder = Decoder::open(stream, &decoder_config(config))?;
    if decoder.sample_rate() == 0 {
        return Err(Error::invalid_data(format!(
            "audio stream {} has no sample rate",
            stream.index
        )));
    }

    let layout = decoder.channel_layout().unwrap_or_else(|| {
        channel_layout::default_for_channels(stream.channels.unwrap_or(2))
    });
    let sample_format = decoder
        .sample_format()
        .unwrap_or(Sample::F32(sample::Type::Planar));
    let input = AudioInput {
        codec_id: stream.codec.id(),
        sample_rate: decoder.sample_rate(),
        sample_format,
        channel_layout: layout.clone(),
    };
    let encoder = Encoder::open_audio(stream.index, input, config, sink.needs_global_header())?;

    let fifo = AudioFifo::new(
        encoder.sample_format().unwrap_or(sample_format),
        encoder.sample_rate(),
        &encoder.channel_layout().unwrap_or(layout),
        encoder.frame_size(),
        decoder.time_base(),
    )?;
    sink.add_encoded_stream(stream, encoder.parameters()?, encoder.time_base())?;

    Ok(StreamRoute::Audio { decoder, encoder, fifo })
}

impl std::fmt::Debug for TranscodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeContext")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("route", &self.route.name())
            .field("filter", &self.filter.as_ref().map(FilterGraph::spec))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitles_are_laid_out_on_the_output_canvas() {
        let decoded = FrameSize::new(1920, 1080);
        assert_eq!(burn_size(Some(FrameSize::new(640, 360)), decoded), FrameSize::new(640, 360));
        assert_eq!(burn_size(None, decoded), decoded);
        assert_eq!(burn_size(Some(FrameSize::new(0, 0)), decoded), decoded);
    }
}
