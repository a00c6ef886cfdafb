/*!
    Decoder configuration types.
*/

use crate::hw::HwDeviceType;

/**
    Configuration for opening a decoder.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Try hardware decoding for video streams, falling back to software.
    pub prefer_hw: bool,
    /// Specific device to use (None = first available for this platform).
    pub hw_device: Option<HwDeviceType>,
    /// Decoder threads (None = FFmpeg picks).
    pub thread_count: Option<usize>,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Enable hardware decoding with auto-detection.
    */
    pub fn with_hw_accel(mut self) -> Self {
        self.prefer_hw = true;
        self
    }

    pub fn with_hw_device(mut self, device: HwDeviceType) -> Self {
        self.prefer_hw = true;
        self.hw_device = Some(device);
        self
    }

    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = Some(threads);
        self
    }
}
