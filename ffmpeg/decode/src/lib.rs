/*!
    Media decoding for the ffmpeg transcoding crates.

    A [`Decoder`] turns the compressed packets of one audio or video stream
    into frames, following FFmpeg's send/receive protocol: one packet may
    yield zero, one or several frames, and everything buffered inside the
    codec comes out when the decoder is flushed at end of stream.

    ```ignore
    let mut decoder = Decoder::open(&stream, &DecoderConfig::default())?;
    while let Some(packet) = source.read_packet()? {
        for frame in decoder.decode(&packet)? {
            // filter, encode...
        }
    }
    let tail = decoder.flush()?;
    ```

    Subtitle streams are never decoded by the transcoder, but their decoder
    is still resolved so missing codecs surface before muxing starts; see
    [`SubtitleDecoder`].
*/

mod config;
mod decoder;
mod hw;
mod subtitle;

pub use config::DecoderConfig;
pub use decoder::Decoder;
pub use hw::HwDeviceType;
pub use subtitle::SubtitleDecoder;
