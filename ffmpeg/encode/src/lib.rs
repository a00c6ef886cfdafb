/*!
    Media encoding for the ffmpeg transcoding crates.

    This crate turns filtered frames into compressed packets. Encoders are
    opened from an [`EncodeContext`], the user-facing description of how a
    stream should be re-encoded, together with the properties of the decoded
    input the encoder inherits.

    # Video Encoding

    ```ignore
    use ffmpeg_encode::{EncodeContext, Encoder, EncoderPreset, VideoInput};

    let config = EncodeContext::video("libx264")
        .with_crf(23)
        .with_preset(EncoderPreset::Medium);

    let mut encoder = Encoder::open_video(0, input, &config, sink.needs_global_header())?;
    for frame in frames {
        for packet in encoder.encode(&frame)? {
            // Write to muxer
        }
    }
    let final_packets = encoder.flush()?;
    ```

    # Audio Encoding

    Audio encoders often require a fixed number of samples per frame, see
    [`Encoder::frame_size`]. Feed them through `ffmpeg_transform::AudioFifo`.

    ```ignore
    let config = EncodeContext::audio("aac")
        .with_bitrate(128_000)
        .with_channel_layout("stereo");
    let encoder = Encoder::open_audio(1, input, &config, false)?;
    ```

    # Rate Control

    - **CRF** (default 18): constant quality, used when no target bitrate is set.
    - **Target bitrate**: average bitrate in bits per second.
    - **Min/max bitrate**: bounds for the rate controller; a max also sets the
      rate control buffer size.

    # Presets and tunes

    Presets trade speed for compression efficiency, from `ultrafast` to
    `placebo` (default `slow`). Tunes adapt the encoder to the content
    (default `film`). Encoders without these options ignore them.

    # Negotiation

    Parameters inherited from the input that the codec does not support are
    swapped for supported ones; explicitly requested profiles and channel
    layouts must be supported or opening fails. See [`negotiate`].
*/

mod config;
mod encoder;
pub mod negotiate;

pub use config::{Bitrate, Crf, EncodeContext, EncoderPreset, EncoderTune};
pub use encoder::{AudioInput, Encoder, VideoInput};
