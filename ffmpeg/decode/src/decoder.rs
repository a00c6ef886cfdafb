/*!
    Audio and video decoder implementation.
*/

use ffmpeg_next::{
    codec::{self, decoder},
    ffi,
    format::{Pixel, Sample},
    util::frame::{audio::Audio as AudioFrameFFmpeg, video::Video as VideoFrameFFmpeg},
};
use tracing::{debug, warn};

use ffmpeg_source::MediaStream;
use ffmpeg_types::{
    CodecDirection, CodecState, Error, Frame, MediaKind, Packet, Rational, Received, Result,
    channel_layout, drain_output,
};

use crate::config::DecoderConfig;
use crate::hw::{HwDeviceContext, HwDeviceType, is_hw_frame, transfer_hw_frame};

enum Inner {
    Video(decoder::Video),
    Audio(decoder::Audio),
}

/**
    Decoder for one audio or video stream.

    Frames come out with their presentation timestamp set to FFmpeg's best
    effort timestamp, expressed in the stream's time base. Hardware frames
    are downloaded to system memory before they are returned.
*/
pub struct Decoder {
    inner: Inner,
    stream_index: usize,
    time_base: Rational,
    codec_name: String,
    state: CodecState,
    /**
        Kept alive to prevent the hardware device context from being dropped
        while the decoder is using it.
    */
    _hw_context: Option<HwDeviceContext>,
    hw_device: Option<HwDeviceType>,
    dropped: Vec<Error>,
}

impl Decoder {
    /**
        Resolve and open a decoder for an input stream.

        Fails with `DecoderNotFound` when FFmpeg has no decoder for the
        stream's codec, and with `UnsupportedStreamKind` for anything other
        than audio or video.
    */
    pub fn open(stream: &MediaStream, config: &DecoderConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        if !matches!(stream.kind, MediaKind::Video | MediaKind::Audio) {
            return Err(Error::UnsupportedStreamKind {
                stream: stream.index,
                kind: stream.kind,
            });
        }

        let codec = ffmpeg_next::decoder::find(stream.codec.id()).ok_or_else(|| {
            Error::DecoderNotFound {
                stream: stream.index,
                codec: stream.codec_name.clone(),
            }
        })?;

        let mut context = codec::context::Context::from_parameters(stream.codec.parameters().clone())
            .map_err(|e| Error::codec(e.to_string()))?;

        let hw_context = if config.prefer_hw && stream.kind == MediaKind::Video {
            HwDeviceContext::try_create(config.hw_device)
        } else {
            None
        };

        // SAFETY: the context is allocated and not yet opened, so these
        // fields may still be written.
        unsafe {
            let ctx = context.as_mut_ptr();
            (*ctx).pkt_timebase = ffmpeg_next::Rational::from(stream.time_base).into();
            if let Some(threads) = config.thread_count {
                (*ctx).thread_count = threads as i32;
            }
            if let Some(hw) = &hw_context {
                (*ctx).hw_device_ctx = hw.create_ref();
            }
        }

        let opened = context
            .decoder()
            .open_as(codec)
            .map_err(|e| Error::codec(format!("failed to open decoder for stream {}: {e}", stream.index)))?;

        let inner = match stream.kind {
            MediaKind::Video => Inner::Video(opened.video().map_err(|e| Error::codec(e.to_string()))?),
            _ => Inner::Audio(opened.audio().map_err(|e| Error::codec(e.to_string()))?),
        };

        let hw_device = hw_context.as_ref().map(HwDeviceContext::device);
        debug!(
            stream = stream.index,
            codec = %stream.codec_name,
            hw = hw_device.map(HwDeviceType::as_str),
            "opened decoder"
        );

        let mut state = CodecState::Closed;
        state.open(CodecDirection::Decoding)?;

        Ok(Self {
            inner,
            stream_index: stream.index,
            time_base: stream.time_base,
            codec_name: stream.codec_name.clone(),
            state,
            _hw_context: hw_context,
            hw_device,
            dropped: Vec::new(),
        })
    }

    pub fn kind(&self) -> MediaKind {
        match self.inner {
            Inner::Video(_) => MediaKind::Video,
            Inner::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /**
        Time base of incoming packets and outgoing frame timestamps.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn is_hw_accelerated(&self) -> bool {
        self.hw_device.is_some()
    }

    pub fn hw_device(&self) -> Option<HwDeviceType> {
        self.hw_device
    }

    pub fn width(&self) -> u32 {
        match &self.inner {
            Inner::Video(d) => d.width(),
            Inner::Audio(_) => 0,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.inner {
            Inner::Video(d) => d.height(),
            Inner::Audio(_) => 0,
        }
    }

    /**
        Software pixel format frames will arrive in, if known yet.

        With hardware decoding this is the format of downloaded frames,
        which is only certain once the first frame arrives.
    */
    pub fn pixel_format(&self) -> Option<Pixel> {
        match &self.inner {
            Inner::Video(d) if d.format() != Pixel::None => Some(d.format()),
            _ => None,
        }
    }

    pub fn sample_aspect_ratio(&self) -> Rational {
        match &self.inner {
            Inner::Video(d) => d.aspect_ratio().into(),
            Inner::Audio(_) => Rational::default(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match &self.inner {
            Inner::Audio(d) => d.rate(),
            Inner::Video(_) => 0,
        }
    }

    pub fn sample_format(&self) -> Option<Sample> {
        match &self.inner {
            Inner::Audio(d) if d.format() != Sample::None => Some(d.format()),
            _ => None,
        }
    }

    /**
        Channel layout description, e.g. `stereo`.
    */
    pub fn channel_layout(&self) -> Option<String> {
        match &self.inner {
            // SAFETY: the opened context owns an initialized ch_layout.
            Inner::Audio(d) => unsafe { channel_layout::describe(&(*d.as_ptr()).ch_layout) },
            Inner::Video(_) => None,
        }
    }

    /**
        Decode a packet, returning decoded frames.

        The packet must already be expressed in [`Decoder::time_base`].
        May return zero, one, or multiple frames depending on codec buffering.
    */
    pub fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        self.state.ensure_open()?;

        // EAGAIN means the decoder's output is full: drain frames, then retry.
        match self.opened_mut().send_packet(packet.as_ffmpeg()) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                let mut frames = self.receive_frames()?;
                self.opened_mut()
                    .send_packet(packet.as_ffmpeg())
                    .map_err(|e| self.codec_error(e))?;
                frames.extend(self.receive_frames()?);
                return Ok(frames);
            }
            Err(e) => return Err(self.codec_error(e)),
        }

        self.receive_frames()
    }

    /**
        Flush the decoder to get any remaining buffered frames.

        Sends end-of-stream and drains everything the codec held back. The
        decoder is closed afterwards until [`Decoder::reset`] is called.
    */
    pub fn flush(&mut self) -> Result<Vec<Frame>> {
        self.state.begin_flush()?;

        let mut frames = Vec::new();
        match self.opened_mut().send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                frames.extend(self.receive_frames()?);
                if let Err(e) = self.opened_mut().send_eof() {
                    warn!(stream = self.stream_index, error = %e, "decoder refused end of stream");
                    let e = self.codec_error(e);
                    self.dropped.push(e);
                }
            }
            Err(e) => return Err(self.codec_error(e)),
        }

        frames.extend(self.receive_frames()?);
        self.state.finish_flush();
        Ok(frames)
    }

    /**
        Discard buffered frames and accept input again, e.g. after a seek.
    */
    pub fn reset(&mut self) {
        self.opened_mut().flush();
        self.state.reset(CodecDirection::Decoding);
    }

    fn opened_mut(&mut self) -> &mut decoder::Opened {
        match &mut self.inner {
            Inner::Video(d) => &mut **d,
            Inner::Audio(d) => &mut **d,
        }
    }

    fn codec_error(&self, e: ffmpeg_next::Error) -> Error {
        codec_error(self.stream_index, &self.codec_name, e)
    }

    /**
        Errors that cost output without failing a call: frames that could
        not be downloaded from the GPU, and decode failures after partial
        output. Cleared by this call.
    */
    pub fn take_dropped(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.dropped)
    }

    /**
        Receive all available frames from the decoder.
    */
    fn receive_frames(&mut self) -> Result<Vec<Frame>> {
        let Self {
            inner,
            stream_index,
            codec_name,
            dropped,
            ..
        } = self;
        let before = dropped.len();

        let frames = drain_output(
            || {
                let received = match &mut *inner {
                    Inner::Video(d) => {
                        let mut frame = VideoFrameFFmpeg::empty();
                        d.receive_frame(&mut frame).map(|()| Frame::Video(frame))
                    }
                    Inner::Audio(d) => {
                        let mut frame = AudioFrameFFmpeg::empty();
                        d.receive_frame(&mut frame).map(|()| Frame::Audio(frame))
                    }
                };
                match received {
                    Ok(frame) => match finish_frame(frame) {
                        Ok(frame) => Received::Item(frame),
                        Err(e) => Received::Dropped(e),
                    },
                    Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => Received::Exhausted,
                    Err(ffmpeg_next::Error::Eof) => Received::Exhausted,
                    Err(e) => Received::Failed(codec_error(*stream_index, codec_name, e)),
                }
            },
            dropped,
        )?;

        for e in &self.dropped[before..] {
            warn!(stream = self.stream_index, error = %e, "decoder dropped output");
        }
        Ok(frames)
    }
}

fn codec_error(stream_index: usize, codec_name: &str, e: ffmpeg_next::Error) -> Error {
    Error::codec(format!("decoding stream {stream_index} ({codec_name}): {e}"))
}

/**
    Download hardware frames and settle the presentation timestamp.
*/
fn finish_frame(frame: Frame) -> Result<Frame> {
    let mut frame = match frame {
        Frame::Video(video) if is_hw_frame(&video) => Frame::Video(transfer_hw_frame(&video)?),
        other => other,
    };

    let timestamp = frame.as_ffmpeg().timestamp();
    frame.set_pts(timestamp);
    Ok(frame)
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("stream_index", &self.stream_index)
            .field("codec", &self.codec_name)
            .field("time_base", &self.time_base)
            .field("state", &self.state)
            .field("hw_device", &self.hw_device)
            .finish_non_exhaustive()
    }
}
