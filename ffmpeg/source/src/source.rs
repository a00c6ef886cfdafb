/*!
    Media source implementation.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::format::context::Input as InputContext;
use tracing::debug;

use ffmpeg_types::{Chapter, Error, MediaInfo, Packet, Rational, Result, TrackInfo};

use crate::convert::metadata_pairs;
use crate::probe::track_info;
use crate::stream::MediaStream;

/**
    An opened input container that produces compressed packets.

    Created by [`Source::open`]. Describes every stream up front and then
    yields packets in file order, interleaved between streams.
*/
pub struct Source {
    input: InputContext,
    path: PathBuf,
    streams: Vec<MediaStream>,
}

impl Source {
    /**
        Open a media file and describe its streams.

        Fails with `OpenInputFailed` when the container cannot be opened or
        parsed, and with `NoStreamsFound` when it carries no streams.
    */
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let input = ffmpeg_next::format::input(&path).map_err(|e| Error::OpenInputFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let streams: Vec<MediaStream> = input
            .streams()
            .map(|s| MediaStream::from_stream(&s))
            .collect();
        if streams.is_empty() {
            return Err(Error::NoStreamsFound { path });
        }

        debug!(
            path = %path.display(),
            streams = streams.len(),
            format = input.format().name(),
            "opened input"
        );

        Ok(Self {
            input,
            path,
            streams,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn streams(&self) -> &[MediaStream] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&MediaStream> {
        self.streams.get(index)
    }

    /**
        Container duration, if the demuxer knows it.
    */
    pub fn duration(&self) -> Option<Duration> {
        let micros = self.input.duration();
        if micros > 0 {
            Some(Duration::from_micros(micros as u64))
        } else {
            self.streams
                .iter()
                .filter_map(|s| {
                    let stream = self.input.stream(s.index)?;
                    (stream.duration() > 0).then(|| s.time_base.to_duration(stream.duration()))
                })
                .max()
        }
    }

    /**
        Container-level metadata, in file order.
    */
    pub fn metadata(&self) -> Vec<(String, String)> {
        metadata_pairs(&self.input.metadata())
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.input
            .chapters()
            .map(|chapter| Chapter {
                id: chapter.id(),
                time_base: chapter.time_base().into(),
                start: chapter.start(),
                end: chapter.end(),
                metadata: metadata_pairs(&chapter.metadata()),
            })
            .collect()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.streams.iter().map(track_info).collect()
    }

    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            duration: self.duration(),
            tracks: self.tracks(),
        }
    }

    /**
        Read the next packet from the source.

        Returns `Ok(Some(packet))` for each packet and `Ok(None)` at end of
        input. Each packet carries its stream index and that stream's time
        base.
    */
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(Error::codec(format!("failed to read packet: {e}"))),
            }

            let index = packet.stream();
            // Streams can appear mid-file in some formats; they were not mapped.
            let Some(stream) = self.streams.get(index) else {
                continue;
            };
            return Ok(Some(Packet::new(packet, index, stream.time_base)));
        }
    }

    /**
        Seek to a position in the media.

        Seeks to the nearest keyframe at or before the target position.
        Decoders fed from this source should be reset afterwards.
    */
    pub fn seek(&mut self, position: Duration) -> Result<()> {
        // Container-level seeks are expressed in AV_TIME_BASE (microseconds).
        let timestamp = Rational::MICROS.from_duration(position);

        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| Error::codec(format!("seek failed: {e}")))?;

        debug!(position = ?position, "seeked input");
        Ok(())
    }
}

impl Iterator for Source {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_packet().transpose()
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}
