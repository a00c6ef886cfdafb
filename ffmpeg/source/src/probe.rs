/*!
    Probing functionality for extracting media metadata.
*/

use std::path::Path;

use ffmpeg_types::{MediaInfo, MediaKind, Result, TrackInfo};

use crate::source::Source;
use crate::stream::MediaStream;

/**
    Probe a media file for its duration and track list.

    Opens the container, reads stream headers and closes it again without
    demuxing any packets.

    # Example

    ```ignore
    let info = probe("movie.mkv")?;
    for track in &info.tracks {
        println!("{} {}", track.kind, track.codec);
    }
    ```
*/
pub fn probe<P: AsRef<Path>>(path: P) -> Result<MediaInfo> {
    let source = Source::open(path)?;
    Ok(source.media_info())
}

/**
    Summarize a stream for track list events.
*/
pub fn track_info(stream: &MediaStream) -> TrackInfo {
    let is_video = stream.kind == MediaKind::Video;
    TrackInfo {
        index: stream.index,
        kind: stream.kind,
        codec: stream.codec_name.clone(),
        language: stream.language().map(str::to_owned),
        title: stream.title().map(str::to_owned),
        attached_pic: stream.is_attached_pic(),
        size: stream.size.filter(|size| !size.is_empty()),
        frame_rate: if is_video && !stream.is_attached_pic() {
            stream.frame_rate().map(|r| r.to_f64())
        } else {
            None
        },
        sample_rate: stream.sample_rate,
        channels: stream.channels,
    }
}
