/*!
    TOML job files.

    ```toml
    input = "movie.mkv"
    output = "movie.mp4"
    subtitle = "movie.srt"

    [range]
    start = 30.0
    end = 90.5

    [video]
    encoder = "libx264"
    crf = 23
    preset = "medium"
    size = "1280x720"

    [audio]
    encoder = "aac"
    bitrate = { max = 128000 }
    ```
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use ffmpeg_encode::EncodeContext;
use ffmpeg_types::MediaKind;

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("failed to read job file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse job file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid range: {0}")]
    InvalidRange(String),
}

/**
    Range bounds in seconds.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeSection {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobFile {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub subtitle: Option<PathBuf>,
    pub range: RangeSection,
    pub video: Option<EncodeContext>,
    pub audio: Option<EncodeContext>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self, JobFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| JobFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, JobFileError> {
        let mut job: JobFile = toml::from_str(content)?;

        // The section decides the kind.
        if let Some(video) = job.video.as_mut() {
            video.kind = MediaKind::Video;
        }
        if let Some(audio) = job.audio.as_mut() {
            audio.kind = MediaKind::Audio;
        }

        job.range()?;
        Ok(job)
    }

    /**
        The range as durations, checked to be non-negative and ordered.
    */
    pub fn range(&self) -> Result<(Option<Duration>, Option<Duration>), JobFileError> {
        let start = self.range.start.map(seconds).transpose()?;
        let end = self.range.end.map(seconds).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(JobFileError::InvalidRange(format!(
                    "end {end:?} is not after start {start:?}"
                )));
            }
        }
        Ok((start, end))
    }
}

fn seconds(value: f64) -> Result<Duration, JobFileError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| JobFileError::InvalidRange(format!("{value} seconds: {e}")))
}

#[cfg(test)]
mod tests {
    use ffmpeg_encode::EncoderPreset;
    use ffmpeg_types::FrameSize;

    use super::*;

    #[test]
    fn full_job_parses() {
        let job = JobFile::from_toml(
            r#"
            input = "in.mkv"
            output = "out.mp4"

            [range]
            start = 1.5
            end = 10

            [video]
            encoder = "libx264"
            crf = 23
            preset = "medium"
            size = "640x360"

            [audio]
            encoder = "aac"
            bitrate = { max = 128000 }
            "#,
        )
        .unwrap();

        assert_eq!(job.input.as_deref(), Some(Path::new("in.mkv")));
        assert_eq!(
            job.range().unwrap(),
            (Some(Duration::from_millis(1500)), Some(Duration::from_secs(10)))
        );

        let video = job.video.unwrap();
        assert_eq!(video.kind, MediaKind::Video);
        assert_eq!(video.crf.get(), 23);
        assert_eq!(video.preset, EncoderPreset::Medium);
        assert_eq!(video.size, Some(FrameSize::new(640, 360)));
        assert!(video.gpu_decode);

        let audio = job.audio.unwrap();
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(audio.bitrate.max, Some(128_000));
        assert_eq!(audio.bitrate.target, None);
    }

    #[test]
    fn empty_file_is_a_default_job() {
        let job = JobFile::from_toml("").unwrap();
        assert_eq!(job, JobFile::default());
        assert_eq!(job.range().unwrap(), (None, None));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            JobFile::from_toml("[video]\ncrf = 60"),
            Err(JobFileError::Parse(_))
        ));
        assert!(matches!(
            JobFile::from_toml("[video]\npreset = \"warp\""),
            Err(JobFileError::Parse(_))
        ));
        assert!(matches!(
            JobFile::from_toml("outptu = \"typo.mkv\""),
            Err(JobFileError::Parse(_))
        ));
        assert!(matches!(
            JobFile::from_toml("[range]\nstart = 5\nend = 2"),
            Err(JobFileError::InvalidRange(_))
        ));
        assert!(matches!(
            JobFile::from_toml("[range]\nstart = -1"),
            Err(JobFileError::InvalidRange(_))
        ));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = JobFile::load(Path::new("/nonexistent/job.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/job.toml"));
    }
}
