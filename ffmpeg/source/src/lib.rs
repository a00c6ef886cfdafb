/*!
    Media input and demuxing for the ffmpeg transcoding crates.

    This crate handles the input side of a transcode. It opens a container,
    describes every stream it carries as a [`MediaStream`], and produces
    compressed packets tagged with their stream index and time base.

    ```ignore
    let mut source = ffmpeg_source::Source::open("movie.mkv")?;
    for stream in source.streams() {
        println!("#{} {} {}", stream.index, stream.kind, stream.codec_name);
    }
    while let Some(packet) = source.read_packet()? {
        // route by packet.stream_index()
    }
    ```
*/

mod codec_config;
mod convert;
mod probe;
mod source;
mod stream;

pub use codec_config::CodecConfig;
pub use probe::{probe, track_info};
pub use source::Source;
pub use stream::MediaStream;
