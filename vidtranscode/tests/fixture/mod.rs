//! Synthetic test media, encoded with FFmpeg's built-in MPEG-4 and AAC encoders.

use std::f32::consts::TAU;
use std::path::Path;

use ffmpeg_next::{
    ChannelLayout, Dictionary, Packet, Rational, codec, encoder, ffi,
    format::{self, Pixel, Sample, sample},
    frame,
};

pub const SAMPLE_RATE: i32 = 44_100;
const AUDIO_FRAME: usize = 1024;
/// `AV_INPUT_BUFFER_PADDING_SIZE`
const INPUT_PADDING: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct Clip {
    pub seconds: u32,
    pub width: u32,
    pub height: u32,
    pub fps: i32,
    /// Frames between key frames.
    pub gop: u32,
    /// Add a SubRip subtitle track with one cue per second.
    pub subtitles: bool,
    /// Add a font attachment (Matroska only).
    pub attachment: bool,
    /// Add a KLV metadata track (MPEG-TS only).
    pub klv: bool,
}

impl Default for Clip {
    fn default() -> Self {
        Self {
            seconds: 3,
            width: 320,
            height: 240,
            fps: 25,
            gop: 12,
            subtitles: false,
            attachment: false,
            klv: false,
        }
    }
}

/// Bytes of the font attachment.
pub const FONT: &[u8] = b"\x00\x01\x00\x00fixture font";
pub const FONT_NAME: &str = "fixture.ttf";

/// Whether this FFmpeg build can produce fixtures.
pub fn available() -> bool {
    ffmpeg_next::init().is_ok()
        && encoder::find(codec::Id::MPEG4).is_some()
        && encoder::find(codec::Id::AAC).is_some()
}

/// Best video encoder present: libx264 when built in, else MPEG-4.
pub fn video_encoder() -> &'static str {
    if encoder::find_by_name("libx264").is_some() {
        "libx264"
    } else {
        "mpeg4"
    }
}

/// Write an MPEG-4 video + stereo AAC file with a moving gradient and a tone.
pub fn write(path: &Path, clip: Clip) {
    ffmpeg_next::init().unwrap();
    let mut octx = format::output(&path).unwrap();
    let global = octx
        .format()
        .flags()
        .contains(format::Flags::GLOBAL_HEADER);

    let video_tb = Rational::new(1, clip.fps);
    let vcodec = encoder::find(codec::Id::MPEG4).unwrap();
    let mut venc = codec::context::Context::new_with_codec(vcodec)
        .encoder()
        .video()
        .unwrap();
    venc.set_width(clip.width);
    venc.set_height(clip.height);
    venc.set_format(Pixel::YUV420P);
    venc.set_time_base(video_tb);
    venc.set_frame_rate(Some(Rational::new(clip.fps, 1)));
    venc.set_gop(clip.gop);
    venc.set_max_b_frames(0);
    if global {
        venc.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut venc = venc.open().unwrap();

    let audio_tb = Rational::new(1, SAMPLE_RATE);
    let acodec = encoder::find(codec::Id::AAC).unwrap();
    let mut aenc = codec::context::Context::new_with_codec(acodec)
        .encoder()
        .audio()
        .unwrap();
    aenc.set_rate(SAMPLE_RATE);
    aenc.set_format(Sample::F32(sample::Type::Planar));
    aenc.set_time_base(audio_tb);
    unsafe {
        ffmpeg_types::channel_layout::assign(&mut (*aenc.as_mut_ptr()).ch_layout, "stereo")
            .unwrap();
    }
    if global {
        aenc.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut aenc = aenc.open().unwrap();

    let video_index = {
        let mut stream = octx.add_stream(vcodec).unwrap();
        stream.set_parameters(&venc);
        stream.set_time_base(video_tb);
        stream.index()
    };
    let audio_index = {
        let mut stream = octx.add_stream(acodec).unwrap();
        stream.set_parameters(&aenc);
        stream.set_time_base(audio_tb);
        stream.index()
    };
    let subtitle_index = clip.subtitles.then(|| {
        raw_stream(
            &mut octx,
            ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE,
            ffi::AVCodecID::AV_CODEC_ID_SUBRIP,
        )
    });
    let klv_index = clip.klv.then(|| {
        raw_stream(
            &mut octx,
            ffi::AVMediaType::AVMEDIA_TYPE_DATA,
            ffi::AVCodecID::AV_CODEC_ID_SMPTE_KLV,
        )
    });
    if clip.attachment {
        let index = raw_stream(
            &mut octx,
            ffi::AVMediaType::AVMEDIA_TYPE_ATTACHMENT,
            ffi::AVCodecID::AV_CODEC_ID_TTF,
        );
        let mut stream = octx.stream_mut(index).unwrap();
        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            let data = ffi::av_mallocz(FONT.len() + INPUT_PADDING) as *mut u8;
            std::ptr::copy_nonoverlapping(FONT.as_ptr(), data, FONT.len());
            (*par).extradata = data;
            (*par).extradata_size = FONT.len() as i32;
        }
        let mut tags = Dictionary::new();
        tags.set("filename", FONT_NAME);
        tags.set("mimetype", "application/x-truetype-font");
        stream.set_metadata(tags);
    }

    octx.write_header().unwrap();

    // Side tracks carry one packet per second, in milliseconds.
    let millis = Rational::new(1, 1000);
    for second in 0..clip.seconds as i64 {
        if let Some(index) = subtitle_index {
            let text = format!("cue {second}");
            write_raw(&mut octx, index, text.as_bytes(), second * 1000, 800, millis);
        }
        if let Some(index) = klv_index {
            let mut klv = vec![0x06, 0x0e, 0x2b, 0x34, 0x02, 0x0b, 0x01, 0x01];
            klv.extend([0x0e, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01, second as u8]);
            write_raw(&mut octx, index, &klv, second * 1000, 1000, millis);
        }
    }

    let frames = clip.seconds as i64 * clip.fps as i64;
    let total_samples = clip.seconds as i64 * SAMPLE_RATE as i64;
    let mut samples_written = 0i64;

    for i in 0..frames {
        let mut picture = frame::Video::new(Pixel::YUV420P, clip.width, clip.height);
        let stride = picture.stride(0);
        let luma = picture.data_mut(0);
        for y in 0..clip.height as usize {
            for x in 0..clip.width as usize {
                luma[y * stride + x] = ((x + y + i as usize * 4) % 256) as u8;
            }
        }
        picture.data_mut(1).fill(128);
        picture.data_mut(2).fill(128);
        picture.set_pts(Some(i));
        venc.send_frame(&picture).unwrap();
        write_packets(&mut venc, &mut octx, video_index, video_tb);

        // Keep audio up to the end of this video frame.
        let until = ((i + 1) * SAMPLE_RATE as i64 / clip.fps as i64).min(total_samples);
        while samples_written < until {
            let chunk = AUDIO_FRAME.min((total_samples - samples_written) as usize);
            let tone = tone_frame(samples_written, chunk);
            aenc.send_frame(&tone).unwrap();
            write_packets(&mut aenc, &mut octx, audio_index, audio_tb);
            samples_written += chunk as i64;
        }
    }

    venc.send_eof().unwrap();
    write_packets(&mut venc, &mut octx, video_index, video_tb);
    aenc.send_eof().unwrap();
    write_packets(&mut aenc, &mut octx, audio_index, audio_tb);

    octx.write_trailer().unwrap();
}

fn tone_frame(start: i64, samples: usize) -> frame::Audio {
    let mut tone = frame::Audio::new(Sample::F32(sample::Type::Planar), samples, ChannelLayout::STEREO);
    tone.set_rate(SAMPLE_RATE as u32);
    tone.set_pts(Some(start));
    for channel in 0..2 {
        for (n, value) in tone.plane_mut::<f32>(channel).iter_mut().enumerate() {
            let t = (start + n as i64) as f32 / SAMPLE_RATE as f32;
            *value = 0.25 * (TAU * 440.0 * t).sin();
        }
    }
    tone
}

fn write_packets(
    encoder: &mut encoder::Encoder,
    octx: &mut format::context::Output,
    index: usize,
    encoder_tb: Rational,
) {
    let stream_tb = octx.stream(index).unwrap().time_base();
    let mut packet = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(index);
        packet.rescale_ts(encoder_tb, stream_tb);
        packet.write_interleaved(octx).unwrap();
    }
}

fn raw_stream(
    octx: &mut format::context::Output,
    medium: ffi::AVMediaType,
    codec_id: ffi::AVCodecID,
) -> usize {
    let mut stream = octx.add_stream(encoder::find(codec::Id::None)).unwrap();
    unsafe {
        let par = (*stream.as_mut_ptr()).codecpar;
        (*par).codec_type = medium;
        (*par).codec_id = codec_id;
    }
    stream.set_time_base(Rational::new(1, 1000));
    stream.index()
}

fn write_raw(
    octx: &mut format::context::Output,
    index: usize,
    data: &[u8],
    pts: i64,
    duration: i64,
    time_base: Rational,
) {
    let stream_tb = octx.stream(index).unwrap().time_base();
    let mut packet = Packet::copy(data);
    packet.set_stream(index);
    packet.set_pts(Some(pts));
    packet.set_dts(Some(pts));
    packet.set_duration(duration);
    packet.rescale_ts(time_base, stream_tb);
    packet.write_interleaved(octx).unwrap();
}
