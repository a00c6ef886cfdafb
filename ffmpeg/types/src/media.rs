/*!
    Media kinds, track summaries and container-level descriptions.
*/

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Rational};

/**
    The kind of media carried by a stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Data,
    Unknown,
}

impl MediaKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Attachment => "attachment",
            Self::Data => "data",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ffmpeg_next::media::Type> for MediaKind {
    fn from(medium: ffmpeg_next::media::Type) -> Self {
        use ffmpeg_next::media::Type;

        match medium {
            Type::Video => Self::Video,
            Type::Audio => Self::Audio,
            Type::Subtitle => Self::Subtitle,
            Type::Attachment => Self::Attachment,
            Type::Data => Self::Data,
            Type::Unknown => Self::Unknown,
        }
    }
}

/**
    A frame size in pixels, written `WIDTHxHEIGHT`.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X', ':'])
            .ok_or_else(|| Error::invalid_data(format!("frame size '{s}' is not WIDTHxHEIGHT")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid_data(format!("frame size '{s}' is not WIDTHxHEIGHT")))
        };
        let size = Self::new(parse(width)?, parse(height)?);
        if size.is_empty() {
            return Err(Error::invalid_data(format!("frame size '{s}' is empty")));
        }
        Ok(size)
    }
}

impl TryFrom<String> for FrameSize {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameSize> for String {
    fn from(size: FrameSize) -> Self {
        size.to_string()
    }
}

/**
    Summary of one input stream, free of FFmpeg types.

    Published with track list events and printed by `probe`.
*/
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackInfo {
    pub index: usize,
    pub kind: MediaKind,
    /// Short codec name, e.g. `h264` or `aac`.
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Embedded cover art rather than a moving picture.
    pub attached_pic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<FrameSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

/**
    Container duration together with its tracks.
*/
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    #[serde(with = "duration_micros")]
    pub duration: Option<Duration>,
    pub tracks: Vec<TrackInfo>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.kind == MediaKind::Video && !t.attached_pic)
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == MediaKind::Audio)
    }
}

/**
    A chapter marker copied from input to output.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct Chapter {
    pub id: i64,
    pub time_base: Rational,
    pub start: i64,
    pub end: i64,
    pub metadata: Vec<(String, String)>,
}

impl Chapter {
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("title"))
            .map(|(_, value)| value.as_str())
    }
}

mod duration_micros {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_micros() as u64)),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_parses_common_spellings() {
        assert_eq!("640x360".parse::<FrameSize>().unwrap(), FrameSize::new(640, 360));
        assert_eq!("1920X1080".parse::<FrameSize>().unwrap(), FrameSize::new(1920, 1080));
        assert_eq!(" 320:240 ".parse::<FrameSize>().unwrap(), FrameSize::new(320, 240));
    }

    #[test]
    fn frame_size_rejects_garbage() {
        assert!("640".parse::<FrameSize>().is_err());
        assert!("axb".parse::<FrameSize>().is_err());
        assert!("0x360".parse::<FrameSize>().is_err());
    }

    #[test]
    fn frame_size_display_matches_parse() {
        let size = FrameSize::new(1280, 720);
        assert_eq!(size.to_string(), "1280x720");
        assert_eq!(size.to_string().parse::<FrameSize>().unwrap(), size);
    }

    #[test]
    fn chapter_title_lookup_is_case_insensitive() {
        let chapter = Chapter {
            id: 1,
            time_base: Rational::new(1, 1000),
            start: 0,
            end: 60_000,
            metadata: vec![("TITLE".into(), "Opening".into())],
        };
        assert_eq!(chapter.title(), Some("Opening"));
    }

    #[test]
    fn media_info_ignores_cover_art_for_video() {
        let cover = TrackInfo {
            index: 1,
            kind: MediaKind::Video,
            codec: "mjpeg".into(),
            language: None,
            title: None,
            attached_pic: true,
            size: Some(FrameSize::new(600, 600)),
            frame_rate: None,
            sample_rate: None,
            channels: None,
        };
        let audio = TrackInfo {
            index: 0,
            kind: MediaKind::Audio,
            codec: "flac".into(),
            attached_pic: false,
            size: None,
            sample_rate: Some(44_100),
            channels: Some(2),
            ..cover.clone()
        };
        let info = MediaInfo {
            duration: Some(Duration::from_secs(200)),
            tracks: vec![audio, cover],
        };
        assert!(info.has_audio());
        assert!(!info.has_video());
    }

    #[test]
    fn media_kind_display() {
        assert_eq!(MediaKind::Subtitle.to_string(), "subtitle");
        assert_eq!(MediaKind::Attachment.as_str(), "attachment");
    }
}
