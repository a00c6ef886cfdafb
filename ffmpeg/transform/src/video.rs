/*!
    Video frame conversion to packed RGBA.
*/

use ffmpeg_next::{
    format::Pixel,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
};

use ffmpeg_types::{Error, FrameSize, Result};

/**
    Scaling algorithm for video resizing.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingAlgorithm {
    /// Nearest neighbor - fastest, lowest quality.
    Nearest,
    /// Bilinear interpolation - fast, acceptable quality.
    #[default]
    Bilinear,
    /// Bicubic interpolation - moderate speed, good quality.
    Bicubic,
    /// Lanczos resampling - slowest, highest quality.
    Lanczos,
}

impl ScalingAlgorithm {
    fn to_ffmpeg_flags(self) -> ScalerFlags {
        match self {
            Self::Nearest => ScalerFlags::POINT,
            Self::Bilinear => ScalerFlags::BILINEAR,
            Self::Bicubic => ScalerFlags::BICUBIC,
            Self::Lanczos => ScalerFlags::LANCZOS,
        }
    }
}

/**
    Tightly packed RGBA pixels, four bytes per pixel, no row padding.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaPicture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for RgbaPicture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaPicture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/**
    Fit `source` within `max_width`, keeping the aspect ratio.

    Frames already narrow enough keep their size. Heights round to the
    nearest even number since most pixel formats subsample chroma.
*/
pub fn fit_width(source: FrameSize, max_width: u32) -> FrameSize {
    if max_width == 0 || source.width <= max_width || source.width == 0 {
        return source;
    }
    let height = (u64::from(source.height) * u64::from(max_width) + u64::from(source.width) / 2)
        / u64::from(source.width);
    let height = ((height as u32 + 1) & !1).max(2);
    FrameSize::new(max_width, height)
}

/**
    Converts decoded video frames to RGBA, downscaling wide frames.

    The scaler context is lazily initialized on first use and
    automatically reinitialized if the input format changes.
*/
pub struct RgbaScaler {
    max_width: u32,
    algorithm: ScalingAlgorithm,
    scaler_state: Option<ScalerState>,
}

struct ScalerState {
    context: ScalerContext,
    src_width: u32,
    src_height: u32,
    src_format: Pixel,
    dst: FrameSize,
}

impl RgbaScaler {
    /**
        Scaler limiting output width to `max_width` (0 keeps the source size).
    */
    pub fn new(max_width: u32) -> Self {
        Self {
            max_width,
            algorithm: ScalingAlgorithm::default(),
            scaler_state: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: ScalingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    /**
        Convert one frame.
    */
    pub fn convert(&mut self, frame: &VideoFrameFFmpeg) -> Result<RgbaPicture> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(Error::invalid_data("input frame has zero dimensions"));
        }
        if frame.format() == Pixel::None {
            return Err(Error::invalid_data("input frame has no pixel format"));
        }

        let state = self.scaler_for(frame.width(), frame.height(), frame.format())?;

        let mut dst_frame = VideoFrameFFmpeg::new(Pixel::RGBA, state.dst.width, state.dst.height);
        state
            .context
            .run(frame, &mut dst_frame)
            .map_err(|e| Error::codec(format!("scaling failed: {e}")))?;

        Ok(RgbaPicture {
            width: state.dst.width,
            height: state.dst.height,
            data: pack_rows(&dst_frame, 4),
        })
    }

    fn scaler_for(&mut self, width: u32, height: u32, format: Pixel) -> Result<&mut ScalerState> {
        let reusable = self.scaler_state.as_ref().is_some_and(|state| {
            state.src_width == width && state.src_height == height && state.src_format == format
        });

        if !reusable {
            let dst = fit_width(FrameSize::new(width, height), self.max_width);
            let context = ScalerContext::get(
                format,
                width,
                height,
                Pixel::RGBA,
                dst.width,
                dst.height,
                self.algorithm.to_ffmpeg_flags(),
            )
            .map_err(|e| Error::codec(format!("failed to create scaler: {e}")))?;

            self.scaler_state = Some(ScalerState {
                context,
                src_width: width,
                src_height: height,
                src_format: format,
                dst,
            });
        }

        self.scaler_state
            .as_mut()
            .ok_or_else(|| Error::codec("scaler not initialized"))
    }
}

/**
    Copy plane 0 into a contiguous buffer, dropping stride padding.
*/
fn pack_rows(frame: &VideoFrameFFmpeg, bytes_per_pixel: usize) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width * bytes_per_pixel;

    let mut output = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let row_start = y * stride;
        output.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    output
}

impl std::fmt::Debug for RgbaScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaScaler")
            .field("max_width", &self.max_width)
            .field("algorithm", &self.algorithm)
            .field("initialized", &self.scaler_state.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_frames_keep_their_size() {
        let size = FrameSize::new(320, 240);
        assert_eq!(fit_width(size, 480), size);
        assert_eq!(fit_width(FrameSize::new(1920, 1080), 0), FrameSize::new(1920, 1080));
    }

    #[test]
    fn wide_frames_shrink_to_max_width() {
        assert_eq!(fit_width(FrameSize::new(1920, 1080), 480), FrameSize::new(480, 270));
        assert_eq!(fit_width(FrameSize::new(1280, 720), 480), FrameSize::new(480, 270));
        // 3840x1600 -> 480x200
        assert_eq!(fit_width(FrameSize::new(3840, 1600), 480), FrameSize::new(480, 200));
    }

    #[test]
    fn heights_stay_even_and_non_zero() {
        let size = fit_width(FrameSize::new(1000, 333), 480);
        assert_eq!(size.width, 480);
        assert_eq!(size.height % 2, 0);
        assert_eq!(fit_width(FrameSize::new(4000, 1), 480).height, 2);
    }

    #[test]
    fn converts_yuv_to_packed_rgba() {
        ffmpeg_next::init().unwrap();
        let mut frame = VideoFrameFFmpeg::new(Pixel::YUV420P, 640, 360);
        for plane in 0..3 {
            frame.data_mut(plane).fill(128);
        }

        let mut scaler = RgbaScaler::new(480);
        let picture = scaler.convert(&frame).unwrap();
        assert_eq!((picture.width, picture.height), (480, 270));
        assert_eq!(picture.data.len(), 480 * 270 * 4);
        assert!(picture.data.chunks(4).all(|px| px[3] == 255));
    }
}
