/*!
    Subtitle decoder resolution.
*/

use ffmpeg_next::codec::{self, decoder};
use tracing::debug;

use ffmpeg_source::MediaStream;
use ffmpeg_types::{Error, MediaKind, Result};

/**
    Opened decoder for a subtitle stream.

    Subtitle packets are copied to the output unchanged; the decoder exists
    so a stream whose codec FFmpeg cannot handle fails at setup rather than
    producing an unreadable output.
*/
pub struct SubtitleDecoder {
    _inner: decoder::Subtitle,
    stream_index: usize,
    codec_name: String,
}

impl SubtitleDecoder {
    pub fn open(stream: &MediaStream) -> Result<Self> {
        if stream.kind != MediaKind::Subtitle {
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

        let context = codec::context::Context::from_parameters(stream.codec.parameters().clone())
            .map_err(|e| Error::codec(e.to_string()))?;
        let inner = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.subtitle())
            .map_err(|e| Error::codec(format!("failed to open subtitle decoder for stream {}: {e}", stream.index)))?;

        debug!(stream = stream.index, codec = %stream.codec_name, "opened subtitle decoder");

        Ok(Self {
            _inner: inner,
            stream_index: stream.index,
            codec_name: stream.codec_name.clone(),
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }
}

impl std::fmt::Debug for SubtitleDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleDecoder")
            .field("stream_index", &self.stream_index)
            .field("codec", &self.codec_name)
            .finish_non_exhaustive()
    }
}
