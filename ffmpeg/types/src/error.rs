/*!
    Error types shared by the transcoding crates.
*/

use std::path::PathBuf;

use crate::MediaKind;

/**
    Result alias used throughout the ffmpeg crates.
*/
pub type Result<T> = std::result::Result<T, Error>;

/**
    Errors produced while opening, decoding, filtering, encoding or muxing media.

    Setup errors (`OpenInputFailed` through `UnsupportedParameter`) abort a job
    before its packet loop starts. `FilterConfigFailed` and `MuxWriteFailed`
    abort a running loop. `Codec` and `InvalidData` describe failures scoped to
    a single packet or frame.
*/
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to open input {}: {reason}", path.display())]
    OpenInputFailed { path: PathBuf, reason: String },

    #[error("failed to open output {}: {reason}", path.display())]
    OpenOutputFailed { path: PathBuf, reason: String },

    #[error("no streams found in {}", path.display())]
    NoStreamsFound { path: PathBuf },

    #[error("no decoder found for stream {stream} ({codec})")]
    DecoderNotFound { stream: usize, codec: String },

    #[error("encoder '{name}' not found for stream {stream}")]
    EncoderNotFound { stream: usize, name: String },

    #[error("stream {stream} has unsupported media kind {kind}")]
    UnsupportedStreamKind { stream: usize, kind: MediaKind },

    #[error("encoder '{codec}' does not support {parameter} '{value}'")]
    UnsupportedParameter {
        codec: String,
        parameter: &'static str,
        value: String,
    },

    #[error("filter graph '{spec}' for stream {stream} failed: {reason}")]
    FilterConfigFailed {
        stream: usize,
        spec: String,
        reason: String,
    },

    #[error("mux write failed: {0}")]
    MuxWriteFailed(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat(message.into())
    }

    pub fn mux(message: impl Into<String>) -> Self {
        Self::MuxWriteFailed(message.into())
    }

    /**
        Returns true for errors scoped to a single packet or frame.

        A transcode loop drops the offending packet and keeps going when this
        holds; every other error terminates the job.
    */
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(_) | Self::InvalidData(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_scoped_errors_are_recoverable() {
        assert!(Error::codec("corrupt slice").is_recoverable());
        assert!(Error::invalid_data("zero sized frame").is_recoverable());
    }

    #[test]
    fn setup_and_mux_errors_are_fatal() {
        let fatal = [
            Error::NoStreamsFound {
                path: PathBuf::from("empty.mkv"),
            },
            Error::UnsupportedStreamKind {
                stream: 3,
                kind: MediaKind::Data,
            },
            Error::FilterConfigFailed {
                stream: 0,
                spec: "scale=0:0".into(),
                reason: "invalid size".into(),
            },
            Error::mux("broken pipe"),
        ];
        for error in fatal {
            assert!(!error.is_recoverable(), "{error} should be fatal");
        }
    }

    #[test]
    fn messages_name_the_stream() {
        let error = Error::DecoderNotFound {
            stream: 2,
            codec: "prores".into(),
        };
        assert_eq!(error.to_string(), "no decoder found for stream 2 (prores)");

        let error = Error::UnsupportedParameter {
            codec: "aac".into(),
            parameter: "channel layout",
            value: "7.1".into(),
        };
        assert_eq!(
            error.to_string(),
            "encoder 'aac' does not support channel layout '7.1'"
        );
    }
}
