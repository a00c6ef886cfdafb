/*!
    Shared types for the ffmpeg transcoding crates.

    This crate defines the vocabulary that crosses crate boundaries: rational
    time bases, media kinds and track summaries, the error taxonomy, the codec
    state machine, and thin owned wrappers around FFmpeg packets and frames
    that carry the time base their timestamps are expressed in.
*/

pub mod channel_layout;

mod drain;
mod error;
mod frame;
mod media;
mod packet;
mod rational;
mod state;

pub use drain::{Received, drain_output};
pub use error::{Error, Result};
pub use frame::Frame;
pub use media::{Chapter, FrameSize, MediaInfo, MediaKind, TrackInfo};
pub use packet::Packet;
pub use rational::Rational;
pub use state::{CodecDirection, CodecState};
