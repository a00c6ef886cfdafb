/*!
    Encoder configuration types.
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use ffmpeg_types::{Error, FrameSize, MediaKind};

/**
    Encoder speed preset.

    Slower presets produce better compression (smaller files at same quality)
    but take longer to encode.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    /// Fastest encoding, largest files.
    Ultrafast,
    /// Very fast encoding.
    Superfast,
    /// Fast encoding.
    Veryfast,
    /// Faster than default.
    Faster,
    /// Fast encoding, good for real-time.
    Fast,
    /// Default balance of speed and compression.
    Medium,
    /// Better compression, slower.
    #[default]
    Slow,
    /// Even better compression.
    Slower,
    /// Best compression, slowest.
    Veryslow,
    /// Exhaustive search, for reference encodes only.
    Placebo,
}

impl EncoderPreset {
    pub const ALL: [Self; 10] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
        Self::Placebo,
    ];

    /**
        Get the FFmpeg preset string.
    */
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

/**
    Encoder tuning for a kind of content.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderTune {
    #[default]
    Film,
    Animation,
    Grain,
    StillImage,
    Psnr,
    Ssim,
    FastDecode,
    ZeroLatency,
}

impl EncoderTune {
    pub const ALL: [Self; 8] = [
        Self::Film,
        Self::Animation,
        Self::Grain,
        Self::StillImage,
        Self::Psnr,
        Self::Ssim,
        Self::FastDecode,
        Self::ZeroLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Film => "film",
            Self::Animation => "animation",
            Self::Grain => "grain",
            Self::StillImage => "stillimage",
            Self::Psnr => "psnr",
            Self::Ssim => "ssim",
            Self::FastDecode => "fastdecode",
            Self::ZeroLatency => "zerolatency",
        }
    }
}

macro_rules! keyword_from_str {
    ($ty:ty, $what:literal) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| Error::invalid_data(format!("unknown {} '{s}'", $what)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keyword_from_str!(EncoderPreset, "preset");
keyword_from_str!(EncoderTune, "tune");

/**
    Constant rate factor, 0 (lossless) to 51 (worst). Lower is better.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Crf(u8);

impl Crf {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 51;

    pub fn new(value: u8) -> Result<Self, Error> {
        if value > Self::MAX {
            return Err(Error::invalid_data(format!(
                "crf {value} is outside {}..={}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Crf {
    fn default() -> Self {
        Self(18)
    }
}

impl TryFrom<u8> for Crf {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Crf> for u8 {
    fn from(crf: Crf) -> Self {
        crf.0
    }
}

/**
    Bitrate bounds in bits per second. Unset values are left to the codec.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bitrate {
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub target: Option<u64>,
}

impl Bitrate {
    pub fn is_unset(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.target.is_none()
    }
}

/**
    Parameters for re-encoding one kind of stream.

    An empty encoder name keeps the source stream's codec. Everything not
    set explicitly is inherited from the decoded stream.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeContext {
    pub kind: MediaKind,
    /// FFmpeg encoder name, e.g. `libx264` or `aac`.
    pub encoder: String,
    pub bitrate: Bitrate,
    pub thread_count: Option<usize>,
    /// Try hardware decoding for the source side.
    pub gpu_decode: bool,
    pub crf: Crf,
    pub preset: EncoderPreset,
    pub tune: EncoderTune,
    /// Profile name as the codec reports it, e.g. `High` or `LC`.
    pub profile: Option<String>,
    /// Output frame size (video).
    pub size: Option<FrameSize>,
    /// Output channel layout (audio), e.g. `stereo`.
    pub channel_layout: Option<String>,
}

impl Default for EncodeContext {
    fn default() -> Self {
        Self {
            kind: MediaKind::Video,
            encoder: String::new(),
            bitrate: Bitrate::default(),
            thread_count: None,
            gpu_decode: true,
            crf: Crf::default(),
            preset: EncoderPreset::default(),
            tune: EncoderTune::default(),
            profile: None,
            size: None,
            channel_layout: None,
        }
    }
}

impl EncodeContext {
    /**
        Video encode settings using the named encoder.
    */
    pub fn video(encoder: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            encoder: encoder.into(),
            ..Self::default()
        }
    }

    /**
        Audio encode settings using the named encoder.
    */
    pub fn audio(encoder: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Audio,
            encoder: encoder.into(),
            ..Self::default()
        }
    }

    /**
        Whether the codec is inherited from the source stream.
    */
    pub fn keeps_source_codec(&self) -> bool {
        self.encoder.trim().is_empty()
    }

    /**
        Set CRF quality (0-51, lower is better, typical 18-28). Values
        above 51 are clamped.
    */
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = Crf(crf.min(Crf::MAX));
        self
    }

    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_tune(mut self, tune: EncoderTune) -> Self {
        self.tune = tune;
        self
    }

    /**
        Set the target bitrate in bits per second.
    */
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate.target = Some(bitrate);
        self
    }

    pub fn with_bitrate_bounds(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.bitrate.min = min;
        self.bitrate.max = max;
        self
    }

    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = Some(threads);
        self
    }

    pub fn with_gpu_decode(mut self, enabled: bool) -> Self {
        self.gpu_decode = enabled;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_channel_layout(mut self, layout: impl Into<String>) -> Self {
        self.channel_layout = Some(layout.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_archival_settings() {
        let ctx = EncodeContext::video("libx264");
        assert_eq!(ctx.kind, MediaKind::Video);
        assert_eq!(ctx.crf.get(), 18);
        assert_eq!(ctx.preset, EncoderPreset::Slow);
        assert_eq!(ctx.tune, EncoderTune::Film);
        assert!(ctx.gpu_decode);
        assert!(ctx.bitrate.is_unset());
        assert!(!ctx.keeps_source_codec());
        assert!(EncodeContext::audio("").keeps_source_codec());
    }

    #[test]
    fn crf_is_bounded() {
        assert!(Crf::new(51).is_ok());
        assert!(Crf::new(52).is_err());
        assert_eq!(EncodeContext::video("x").with_crf(80).crf.get(), 51);
    }

    #[test]
    fn presets_and_tunes_parse() {
        assert_eq!("placebo".parse::<EncoderPreset>().unwrap(), EncoderPreset::Placebo);
        assert_eq!("Medium".parse::<EncoderPreset>().unwrap(), EncoderPreset::Medium);
        assert_eq!("zerolatency".parse::<EncoderTune>().unwrap(), EncoderTune::ZeroLatency);
        assert!("ludicrous".parse::<EncoderPreset>().is_err());
        for tune in EncoderTune::ALL {
            assert_eq!(tune.to_string().parse::<EncoderTune>().unwrap(), tune);
        }
    }

    #[test]
    fn builder_sets_fields() {
        let ctx = EncodeContext::audio("aac")
            .with_bitrate(128_000)
            .with_bitrate_bounds(None, Some(128_000))
            .with_channel_layout("stereo")
            .with_thread_count(2);
        assert_eq!(ctx.kind, MediaKind::Audio);
        assert_eq!(ctx.bitrate.target, Some(128_000));
        assert_eq!(ctx.bitrate.max, Some(128_000));
        assert_eq!(ctx.channel_layout.as_deref(), Some("stereo"));
        assert_eq!(ctx.thread_count, Some(2));
    }
}
