/*!
    Batch media transcoding on top of the workspace's FFmpeg crates.

    A [`Transcoder`] maps every input stream to an output stream, re-encodes
    audio and video with the configured [`EncodeContext`]s, copies subtitles,
    attachments and cover art, and reports progress through a bounded queue
    of [`PropertyChangeEvent`]s. Preview frames are extracted on a separate
    pool with their own file handle.

    ```ignore
    let mut transcoder = Transcoder::new()?;
    transcoder.set_input_path("in.mkv");
    transcoder.set_output_path("out.mp4");
    transcoder.set_video_encode_context(
        EncodeContext::video("libx264").with_crf(23).with_size(FrameSize::new(640, 360)),
    );
    transcoder.set_audio_encode_context(EncodeContext::audio("aac").with_bitrate(128_000));
    transcoder.parse_input_file();
    transcoder.start_transcode()?;
    while let Some(event) = transcoder.wait_property_change_event(Duration::from_secs(1)) {
        if let PropertyChangeEvent::TranscodeFinished { .. } = event {
            break;
        }
    }
    ```
*/

pub mod events;
pub mod fps;
pub mod job_file;
pub mod preview;
pub mod transcoder;

pub use events::{EventQueue, PropertyChangeEvent};
pub use ffmpeg_encode::EncodeContext;
pub use job_file::{JobFile, JobFileError};
pub use preview::{PreviewFrame, PreviewTask};
pub use transcoder::Transcoder;
