/*!
    Hardware decoding device contexts.
*/

use std::ptr;

use ffmpeg_next::{ffi, util::frame::video::Video as VideoFrameFFmpeg};
use tracing::debug;

use ffmpeg_types::{Error, Result};

/**
    Hardware device families FFmpeg can decode on.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HwDeviceType {
    VideoToolbox,
    Cuda,
    Vaapi,
    Qsv,
    D3d11va,
    Dxva2,
}

impl HwDeviceType {
    /**
        Devices worth probing on this platform, in preference order.
    */
    pub fn platform_candidates() -> &'static [HwDeviceType] {
        const MACOS: &[HwDeviceType] = &[HwDeviceType::VideoToolbox];
        const WINDOWS: &[HwDeviceType] = &[
            HwDeviceType::Cuda,
            HwDeviceType::D3d11va,
            HwDeviceType::Qsv,
            HwDeviceType::Dxva2,
        ];
        const OTHER: &[HwDeviceType] = &[HwDeviceType::Cuda, HwDeviceType::Vaapi, HwDeviceType::Qsv];

        if cfg!(target_os = "macos") {
            MACOS
        } else if cfg!(target_os = "windows") {
            WINDOWS
        } else {
            OTHER
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VideoToolbox => "videotoolbox",
            Self::Cuda => "cuda",
            Self::Vaapi => "vaapi",
            Self::Qsv => "qsv",
            Self::D3d11va => "d3d11va",
            Self::Dxva2 => "dxva2",
        }
    }

    fn to_ffmpeg(self) -> ffi::AVHWDeviceType {
        use ffi::AVHWDeviceType::*;

        match self {
            Self::VideoToolbox => AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            Self::Cuda => AV_HWDEVICE_TYPE_CUDA,
            Self::Vaapi => AV_HWDEVICE_TYPE_VAAPI,
            Self::Qsv => AV_HWDEVICE_TYPE_QSV,
            Self::D3d11va => AV_HWDEVICE_TYPE_D3D11VA,
            Self::Dxva2 => AV_HWDEVICE_TYPE_DXVA2,
        }
    }
}

impl std::str::FromStr for HwDeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::VideoToolbox,
            Self::Cuda,
            Self::Vaapi,
            Self::Qsv,
            Self::D3d11va,
            Self::Dxva2,
        ]
        .into_iter()
        .find(|device| device.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| Error::unsupported_format(format!("unknown hardware device '{s}'")))
    }
}

/**
    Owned reference to an FFmpeg hardware device context.
*/
pub(crate) struct HwDeviceContext {
    ptr: *mut ffi::AVBufferRef,
    device: HwDeviceType,
}

// SAFETY: AVBufferRef is reference counted with atomic counters; the device
// context itself is only touched through FFmpeg, which synchronizes it.
unsafe impl Send for HwDeviceContext {}

impl HwDeviceContext {
    /**
        Create a device of the requested type, or the first platform
        candidate that initializes. Returns `None` when nothing is available.
    */
    pub(crate) fn try_create(requested: Option<HwDeviceType>) -> Option<Self> {
        let candidates: Vec<HwDeviceType> = match requested {
            Some(device) => vec![device],
            None => HwDeviceType::platform_candidates().to_vec(),
        };

        candidates.into_iter().find_map(|device| {
            let mut ctx: *mut ffi::AVBufferRef = ptr::null_mut();
            // SAFETY: av_hwdevice_ctx_create writes a new reference into `ctx`
            // on success and leaves it null otherwise.
            let ret = unsafe {
                ffi::av_hwdevice_ctx_create(
                    &mut ctx,
                    device.to_ffmpeg(),
                    ptr::null(),
                    ptr::null_mut(),
                    0,
                )
            };
            if ret < 0 || ctx.is_null() {
                debug!(device = device.as_str(), error = ret, "hardware device unavailable");
                None
            } else {
                debug!(device = device.as_str(), "hardware device created");
                Some(Self { ptr: ctx, device })
            }
        })
    }

    pub(crate) fn device(&self) -> HwDeviceType {
        self.device
    }

    /**
        New reference for handing ownership to a codec context.
    */
    pub(crate) fn create_ref(&self) -> *mut ffi::AVBufferRef {
        // SAFETY: `self.ptr` is a live reference for our whole lifetime.
        unsafe { ffi::av_buffer_ref(self.ptr) }
    }
}

impl Drop for HwDeviceContext {
    fn drop(&mut self) {
        // SAFETY: we own exactly one reference, released here.
        unsafe { ffi::av_buffer_unref(&mut self.ptr) };
    }
}

/**
    Check if a frame lives in device memory and needs a transfer.
*/
pub(crate) fn is_hw_frame(frame: &VideoFrameFFmpeg) -> bool {
    // SAFETY: reading a field of an allocated frame.
    unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
}

/**
    Download a hardware frame into system memory, keeping its properties.
*/
pub(crate) fn transfer_hw_frame(hw_frame: &VideoFrameFFmpeg) -> Result<VideoFrameFFmpeg> {
    let mut sw_frame = VideoFrameFFmpeg::empty();
    // SAFETY: both frames are allocated; the transfer allocates the
    // destination buffers itself.
    unsafe {
        let ret = ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);
        if ret < 0 {
            return Err(Error::codec(format!(
                "hardware frame transfer failed: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        let ret = ffi::av_frame_copy_props(sw_frame.as_mut_ptr(), hw_frame.as_ptr());
        if ret < 0 {
            return Err(Error::codec(format!(
                "copying frame properties failed: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
    }
    Ok(sw_frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_parse_back() {
        for device in [
            HwDeviceType::VideoToolbox,
            HwDeviceType::Cuda,
            HwDeviceType::Vaapi,
            HwDeviceType::Qsv,
            HwDeviceType::D3d11va,
            HwDeviceType::Dxva2,
        ] {
            assert_eq!(device.as_str().parse::<HwDeviceType>().unwrap(), device);
        }
        assert_eq!("CUDA".parse::<HwDeviceType>().unwrap(), HwDeviceType::Cuda);
        assert!("voodoo".parse::<HwDeviceType>().is_err());
    }

    #[test]
    fn every_platform_has_a_candidate() {
        assert!(!HwDeviceType::platform_candidates().is_empty());
    }
}
