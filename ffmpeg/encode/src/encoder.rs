/*!
    Audio and video encoder implementation.
*/

use std::ffi::CStr;

use ffmpeg_next::{
    Codec, Dictionary,
    codec::{self, capabilities::Capabilities, encoder},
    ffi,
    format::{Pixel, Sample},
};
use tracing::{debug, warn};

use ffmpeg_types::{
    CodecDirection, CodecState, Error, Frame, MediaKind, Packet, Rational, Received, Result,
    channel_layout, drain_output,
};

use crate::config::EncodeContext;
use crate::negotiate::{choose_layout, nearest_rate, negotiate, resolve_profile};

/**
    Decoded video properties an encoder inherits.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoInput {
    pub codec_id: codec::Id,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Pixel,
    /// Time base of incoming frame timestamps; also used for the encoder.
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub sample_aspect_ratio: Rational,
}

/**
    Decoded audio properties an encoder inherits.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioInput {
    pub codec_id: codec::Id,
    pub sample_rate: u32,
    pub sample_format: Sample,
    /// Layout description, e.g. `stereo`.
    pub channel_layout: String,
}

enum Inner {
    Video(encoder::Video),
    Audio(encoder::Audio),
}

/**
    Encoder for one output stream.

    Opened from an [`EncodeContext`] and the properties of the decoded input.
    Parameters the codec cannot take are negotiated first (see
    [`crate::negotiate`]); the negotiated format is what frames must arrive in.
*/
pub struct Encoder {
    inner: Inner,
    stream_index: usize,
    time_base: Rational,
    name: String,
    has_delay: bool,
    state: CodecState,
    dropped: Vec<Error>,
}

impl Encoder {
    /**
        Open a video encoder.
    */
    pub fn open_video(
        stream_index: usize,
        input: VideoInput,
        config: &EncodeContext,
        global_header: bool,
    ) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let codec = find_encoder(stream_index, config, input.codec_id, MediaKind::Video)?;
        let name = codec.name().to_string();
        let size = config
            .size
            .filter(|s| !s.is_empty())
            .unwrap_or(ffmpeg_types::FrameSize::new(input.width, input.height));

        // SAFETY: reads the codec's static capability tables.
        let supported_formats = unsafe { supported_pixel_formats(&codec) };
        let pixel_format = negotiate(
            &name,
            "pixel format",
            None,
            input.pixel_format,
            supported_formats.as_deref(),
        )?;

        let context = codec::context::Context::new_with_codec(codec);
        let mut video = context
            .encoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        video.set_width(size.width);
        video.set_height(size.height);
        video.set_format(pixel_format);
        video.set_time_base(ffmpeg_next::Rational::from(input.time_base));
        video.set_frame_rate(input.frame_rate.map(ffmpeg_next::Rational::from));
        if input.sample_aspect_ratio.num > 0 {
            video.set_aspect_ratio(ffmpeg_next::Rational::from(input.sample_aspect_ratio));
        }
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        apply_common(&mut video, &codec, &name, config)?;

        let mut opts = Dictionary::new();
        opts.set("preset", config.preset.as_str());
        opts.set("tune", config.tune.as_str());
        if config.bitrate.target.is_none() {
            opts.set("crf", &config.crf.get().to_string());
        }

        let opened = video
            .open_with(opts)
            .map_err(|e| Error::codec(format!("failed to open encoder '{name}': {e}")))?;

        debug!(
            stream = stream_index,
            encoder = %name,
            size = %size,
            pixel_format = ?pixel_format,
            preset = %config.preset,
            "opened video encoder"
        );

        Self::finish_open(Inner::Video(opened), stream_index, name, &codec)
    }

    /**
        Open an audio encoder.

        The encoder runs in a `1/sample_rate` time base.
    */
    pub fn open_audio(
        stream_index: usize,
        input: AudioInput,
        config: &EncodeContext,
        global_header: bool,
    ) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let codec = find_encoder(stream_index, config, input.codec_id, MediaKind::Audio)?;
        let name = codec.name().to_string();

        // SAFETY: reads the codec's static capability tables.
        let (formats, rates, layouts) = unsafe {
            (
                supported_sample_formats(&codec),
                supported_sample_rates(&codec),
                supported_channel_layouts(&codec),
            )
        };

        let sample_format = negotiate(
            &name,
            "sample format",
            None,
            input.sample_format,
            formats.as_deref(),
        )?;
        let sample_rate = nearest_rate(input.sample_rate, rates.as_deref());
        let layout = choose_layout(
            &name,
            config.channel_layout.as_deref(),
            &input.channel_layout,
            layouts.as_deref(),
        )?;

        let context = codec::context::Context::new_with_codec(codec);
        let mut audio = context
            .encoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        audio.set_format(sample_format);
        audio.set_rate(sample_rate as i32);
        audio.set_time_base(ffmpeg_next::Rational::new(1, sample_rate as i32));
        // SAFETY: the context is allocated and not yet opened.
        unsafe {
            channel_layout::assign(&mut (*audio.as_mut_ptr()).ch_layout, &layout)?;
        }
        if global_header {
            audio.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        apply_common(&mut audio, &codec, &name, config)?;

        let opened = audio
            .open_with(Dictionary::new())
            .map_err(|e| Error::codec(format!("failed to open encoder '{name}': {e}")))?;

        debug!(
            stream = stream_index,
            encoder = %name,
            sample_rate,
            sample_format = ?sample_format,
            channel_layout = %layout,
            "opened audio encoder"
        );

        Self::finish_open(Inner::Audio(opened), stream_index, name, &codec)
    }

    fn finish_open(inner: Inner, stream_index: usize, name: String, codec: &Codec) -> Result<Self> {
        let mut encoder = Self {
            inner,
            stream_index,
            time_base: Rational::default(),
            name,
            has_delay: codec.capabilities().contains(Capabilities::DELAY),
            state: CodecState::Closed,
            dropped: Vec::new(),
        };
        // The codec may adjust the time base while opening.
        // SAFETY: reading a field of the opened context.
        encoder.time_base = unsafe {
            ffmpeg_next::Rational::from((*encoder.context().as_ptr()).time_base).into()
        };
        encoder.state.open(CodecDirection::Encoding)?;
        Ok(encoder)
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
        Encoder name, e.g. `libx264`.
    */
    pub fn name(&self) -> &str {
        &self.name
    }

    /**
        Time base frames must be in and packets come out in.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /**
        Whether the codec buffers frames and needs flushing at end of stream.
    */
    pub fn has_delay(&self) -> bool {
        self.has_delay
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    /**
        Samples per audio frame the encoder requires; 0 means any size.
    */
    pub fn frame_size(&self) -> usize {
        // SAFETY: reading a field of the opened context.
        unsafe { (*self.context().as_ptr()).frame_size.max(0) as usize }
    }

    pub fn pixel_format(&self) -> Option<Pixel> {
        match &self.inner {
            Inner::Video(v) => Some(v.format()),
            Inner::Audio(_) => None,
        }
    }

    pub fn width(&self) -> u32 {
        match &self.inner {
            Inner::Video(v) => v.width(),
            Inner::Audio(_) => 0,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.inner {
            Inner::Video(v) => v.height(),
            Inner::Audio(_) => 0,
        }
    }

    pub fn sample_format(&self) -> Option<Sample> {
        match &self.inner {
            Inner::Audio(a) => Some(a.format()),
            Inner::Video(_) => None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match &self.inner {
            Inner::Audio(a) => a.rate(),
            Inner::Video(_) => 0,
        }
    }

    pub fn channel_layout(&self) -> Option<String> {
        match &self.inner {
            // SAFETY: the opened context owns an initialized ch_layout.
            Inner::Audio(a) => unsafe { channel_layout::describe(&(*a.as_ptr()).ch_layout) },
            Inner::Video(_) => None,
        }
    }

    /**
        Codec parameters for the output stream.
    */
    pub fn parameters(&self) -> Result<codec::Parameters> {
        let mut parameters = codec::Parameters::new();
        // SAFETY: both structs are allocated; FFmpeg copies into `parameters`.
        let ret = unsafe {
            ffi::avcodec_parameters_from_context(parameters.as_mut_ptr(), self.context().as_ptr())
        };
        if ret < 0 {
            return Err(Error::codec(format!(
                "exporting parameters of '{}': {}",
                self.name,
                ffmpeg_next::Error::from(ret)
            )));
        }
        Ok(parameters)
    }

    /**
        Encode a frame, returning encoded packets.

        The frame's timestamp must be in [`Encoder::time_base`]. May return
        zero, one, or multiple packets depending on encoder buffering.
    */
    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        self.state.ensure_open()?;
        if frame.kind() != self.kind() {
            return Err(Error::invalid_data(format!(
                "{} frame sent to {} encoder",
                frame.kind(),
                self.kind()
            )));
        }

        match self.opened_mut().send_frame(frame.as_ffmpeg()) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                let mut packets = self.receive_packets()?;
                self.opened_mut()
                    .send_frame(frame.as_ffmpeg())
                    .map_err(|e| self.codec_error(e))?;
                packets.extend(self.receive_packets()?);
                return Ok(packets);
            }
            Err(e) => return Err(self.codec_error(e)),
        }

        self.receive_packets()
    }

    /**
        Flush the encoder to get any remaining buffered packets.

        Codecs without delay have nothing buffered, so no end-of-stream is
        sent to them. Either way the encoder is closed afterwards.
    */
    pub fn flush(&mut self) -> Result<Vec<Packet>> {
        self.state.begin_flush()?;

        let packets = if self.has_delay {
            match self.opened_mut().send_eof() {
                Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
                Err(e) => return Err(self.codec_error(e)),
            }
            self.receive_packets()?
        } else {
            Vec::new()
        };

        self.state.finish_flush();
        Ok(packets)
    }

    fn context(&self) -> &codec::context::Context {
        match &self.inner {
            Inner::Video(v) => v,
            Inner::Audio(a) => a,
        }
    }

    fn opened_mut(&mut self) -> &mut encoder::Encoder {
        match &mut self.inner {
            Inner::Video(v) => v,
            Inner::Audio(a) => a,
        }
    }

    fn codec_error(&self, e: ffmpeg_next::Error) -> Error {
        Error::codec(format!("encoding stream {} ({}): {e}", self.stream_index, self.name))
    }

    /**
        Encode failures that came after partial output, which was kept.
        Cleared by this call.
    */
    pub fn take_dropped(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.dropped)
    }

    /**
        Receive all available packets from the encoder.
    */
    fn receive_packets(&mut self) -> Result<Vec<Packet>> {
        let stream_index = self.stream_index;
        let time_base = self.time_base;
        let name = self.name.clone();
        let before = self.dropped.len();
        let mut dropped = std::mem::take(&mut self.dropped);

        let opened = self.opened_mut();
        let packets = drain_output(
            || {
                let mut encoded = ffmpeg_next::Packet::empty();
                match opened.receive_packet(&mut encoded) {
                    Ok(()) => {
                        encoded.set_stream(stream_index);
                        Received::Item(Packet::new(encoded, stream_index, time_base))
                    }
                    Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => Received::Exhausted,
                    Err(ffmpeg_next::Error::Eof) => Received::Exhausted,
                    Err(e) => Received::Failed(Error::codec(format!(
                        "encoding stream {stream_index} ({name}): {e}"
                    ))),
                }
            },
            &mut dropped,
        );

        for e in &dropped[before..] {
            warn!(stream = stream_index, error = %e, "encoder error after partial output");
        }
        self.dropped = dropped;
        packets
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("stream_index", &self.stream_index)
            .field("name", &self.name)
            .field("time_base", &self.time_base)
            .field("has_delay", &self.has_delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/**
    Resolve the encoder by name, or the source codec's default encoder when
    no name is given.
*/
fn find_encoder(stream: usize, config: &EncodeContext, source: codec::Id, kind: MediaKind) -> Result<Codec> {
    let (codec, shown) = if config.keeps_source_codec() {
        (ffmpeg_next::encoder::find(source), format!("{source:?}"))
    } else {
        let name = config.encoder.trim();
        (ffmpeg_next::encoder::find_by_name(name), name.to_string())
    };

    let codec = codec.ok_or_else(|| Error::EncoderNotFound {
        stream,
        name: shown.clone(),
    })?;
    if MediaKind::from(codec.medium()) != kind {
        return Err(Error::EncoderNotFound { stream, name: shown });
    }
    Ok(codec)
}

/**
    Settings shared by audio and video: bitrate bounds, threads, profile.
*/
fn apply_common(
    context: &mut codec::context::Context,
    codec: &Codec,
    name: &str,
    config: &EncodeContext,
) -> Result<()> {
    let profile = match config.profile.as_deref().filter(|p| !p.trim().is_empty()) {
        // SAFETY: reads the codec's static profile table.
        Some(profile) => Some(resolve_profile(name, profile, &unsafe { profiles(codec) })?),
        None => None,
    };

    // SAFETY: the context is allocated and not yet opened.
    unsafe {
        let ctx = context.as_mut_ptr();
        if let Some(target) = config.bitrate.target {
            (*ctx).bit_rate = target as i64;
        }
        if let Some(min) = config.bitrate.min {
            (*ctx).rc_min_rate = min as i64;
        }
        if let Some(max) = config.bitrate.max {
            (*ctx).rc_max_rate = max as i64;
            (*ctx).rc_buffer_size = max.min(i32::MAX as u64) as i32;
        }
        if let Some(threads) = config.thread_count {
            (*ctx).thread_count = threads as i32;
        }
        if let Some(profile) = profile {
            (*ctx).profile = profile;
        }
    }
    Ok(())
}

/**
    Read one of the codec's supported-value lists.

    # Safety

    `T` must match the element type FFmpeg uses for `config`.
*/
unsafe fn supported_config<T: Copy>(codec: &Codec, config: ffi::AVCodecConfig) -> Option<Vec<T>> {
    let mut values: *const std::ffi::c_void = std::ptr::null();
    let mut count: i32 = 0;
    // SAFETY: a null context asks about the codec alone; FFmpeg returns a
    // static array or null for "anything goes".
    let ret = unsafe {
        ffi::avcodec_get_supported_config(
            std::ptr::null(),
            codec.as_ptr(),
            config,
            0,
            &mut values,
            &mut count,
        )
    };
    if ret < 0 || values.is_null() || count <= 0 {
        return None;
    }
    // SAFETY: FFmpeg reports `count` valid elements of the config's type.
    Some(unsafe { std::slice::from_raw_parts(values as *const T, count as usize) }.to_vec())
}

unsafe fn supported_pixel_formats(codec: &Codec) -> Option<Vec<Pixel>> {
    // SAFETY: pixel format lists hold AVPixelFormat values.
    let formats: Vec<ffi::AVPixelFormat> =
        unsafe { supported_config(codec, ffi::AVCodecConfig::AV_CODEC_CONFIG_PIX_FORMAT)? };
    Some(formats.into_iter().map(Pixel::from).collect())
}

unsafe fn supported_sample_formats(codec: &Codec) -> Option<Vec<Sample>> {
    // SAFETY: sample format lists hold AVSampleFormat values.
    let formats: Vec<ffi::AVSampleFormat> =
        unsafe { supported_config(codec, ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_FORMAT)? };
    Some(formats.into_iter().map(Sample::from).collect())
}

unsafe fn supported_sample_rates(codec: &Codec) -> Option<Vec<u32>> {
    // SAFETY: sample rate lists hold ints.
    let rates: Vec<i32> =
        unsafe { supported_config(codec, ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_RATE)? };
    Some(rates.into_iter().filter(|r| *r > 0).map(|r| r as u32).collect())
}

unsafe fn supported_channel_layouts(codec: &Codec) -> Option<Vec<String>> {
    let mut values: *const std::ffi::c_void = std::ptr::null();
    let mut count: i32 = 0;
    // SAFETY: as in `supported_config`; layouts are read in place since
    // AVChannelLayout may own a custom map.
    unsafe {
        let ret = ffi::avcodec_get_supported_config(
            std::ptr::null(),
            codec.as_ptr(),
            ffi::AVCodecConfig::AV_CODEC_CONFIG_CHANNEL_LAYOUT,
            0,
            &mut values,
            &mut count,
        );
        if ret < 0 || values.is_null() || count <= 0 {
            return None;
        }
        let layouts = std::slice::from_raw_parts(values as *const ffi::AVChannelLayout, count as usize);
        Some(
            layouts
                .iter()
                .filter_map(|layout| channel_layout::describe(layout))
                .collect(),
        )
    }
}

/**
    The codec's profiles as `(id, name)` pairs.

    # Safety

    Reads the codec's static profile table.
*/
unsafe fn profiles(codec: &Codec) -> Vec<(i32, String)> {
    let mut out = Vec::new();
    // SAFETY: the table is terminated by AV_PROFILE_UNKNOWN.
    unsafe {
        let mut profile = (*codec.as_ptr()).profiles;
        if profile.is_null() {
            return out;
        }
        while (*profile).profile != ffi::AV_PROFILE_UNKNOWN {
            if !(*profile).name.is_null() {
                let name = CStr::from_ptr((*profile).name).to_string_lossy().into_owned();
                out.push(((*profile).profile, name));
            }
            profile = profile.add(1);
        }
    }
    out
}
