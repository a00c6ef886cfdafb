/*!
    Frame transformation for the ffmpeg transcoding crates.

    - [`FilterGraph`] runs decoded frames through an FFmpeg filter chain
      (scaling, subtitle burn-in) whose sink is pinned to the encoder's
      format, so pixel and sample conversion happen inside the graph.
    - [`AudioFifo`] regroups filtered audio into the frame size the encoder
      requires and stamps continuous timestamps.
    - [`RgbaScaler`] converts frames to packed RGBA for previews.
*/

mod fifo;
mod filter;
mod video;

pub use fifo::{AudioFifo, SampleFifo, drain_size};
pub use filter::{
    FilterGraph, SinkConstraint, SubtitleBurn, audio_filter_chain, audio_source_args,
    escape_filter_path, video_filter_chain, video_source_args,
};
pub use video::{RgbaPicture, RgbaScaler, ScalingAlgorithm, fit_width};
