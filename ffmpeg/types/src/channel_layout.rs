/*!
    Channel layouts by name.

    Layouts cross crate boundaries as FFmpeg layout descriptions such as
    `stereo`, `5.1(side)` or `3 channels`, which `av_channel_layout_from_string`
    parses back. These helpers convert between descriptions and the
    `AVChannelLayout` structs owned by codec contexts and frames.
*/

use std::ffi::{CString, c_char};

use ffmpeg_next::ffi;

use crate::{Error, Result};

/**
    Describe a layout, e.g. `stereo`.

    # Safety

    `layout` must point to an initialized `AVChannelLayout`.
*/
pub unsafe fn describe(layout: *const ffi::AVChannelLayout) -> Option<String> {
    let mut buf = [0u8; 128];
    // SAFETY: buffer pointer and length describe `buf`; the caller vouches
    // for `layout`.
    let written = unsafe {
        ffi::av_channel_layout_describe(layout, buf.as_mut_ptr() as *mut c_char, buf.len())
    };
    if written <= 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/**
    Replace `dst` with the layout named by `name`.

    # Safety

    `dst` must point to an initialized (possibly empty) `AVChannelLayout`
    that the caller owns.
*/
pub unsafe fn assign(dst: *mut ffi::AVChannelLayout, name: &str) -> Result<()> {
    let cname = CString::new(name)
        .map_err(|_| Error::invalid_data(format!("channel layout '{name}' contains NUL")))?;
    // SAFETY: the caller vouches for `dst`; uninit before overwriting frees
    // any custom map it held.
    let ret = unsafe {
        ffi::av_channel_layout_uninit(dst);
        ffi::av_channel_layout_from_string(dst, cname.as_ptr())
    };
    if ret < 0 {
        return Err(Error::invalid_data(format!("unknown channel layout '{name}'")));
    }
    Ok(())
}

/**
    Number of channels in the named layout.
*/
pub fn channel_count(name: &str) -> Option<u16> {
    // SAFETY: a zeroed AVChannelLayout is the valid "unspecified" layout.
    let mut layout: ffi::AVChannelLayout = unsafe { std::mem::zeroed() };
    // SAFETY: `layout` is owned here and uninitialized before returning.
    unsafe {
        let parsed = assign(&mut layout, name).ok();
        let count = layout.nb_channels;
        ffi::av_channel_layout_uninit(&mut layout);
        parsed.and((count > 0).then_some(count as u16))
    }
}

/**
    Name of FFmpeg's default layout for a channel count.
*/
pub fn default_for_channels(channels: u16) -> String {
    // SAFETY: see `channel_count`.
    let mut layout: ffi::AVChannelLayout = unsafe { std::mem::zeroed() };
    unsafe {
        ffi::av_channel_layout_default(&mut layout, channels as i32);
        let name = describe(&layout);
        ffi::av_channel_layout_uninit(&mut layout);
        name.unwrap_or_else(|| format!("{channels} channels"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_named_layouts() {
        assert_eq!(channel_count("mono"), Some(1));
        assert_eq!(channel_count("stereo"), Some(2));
        assert_eq!(channel_count("5.1"), Some(6));
        assert_eq!(channel_count("not-a-layout"), None);
    }

    #[test]
    fn default_layouts_have_familiar_names() {
        assert_eq!(default_for_channels(1), "mono");
        assert_eq!(default_for_channels(2), "stereo");
        assert_eq!(channel_count(&default_for_channels(6)), Some(6));
    }

    #[test]
    fn describe_round_trips_through_assign() {
        let mut layout: ffi::AVChannelLayout = unsafe { std::mem::zeroed() };
        unsafe {
            assign(&mut layout, "stereo").unwrap();
            assert_eq!(describe(&layout).as_deref(), Some("stereo"));
            ffi::av_channel_layout_uninit(&mut layout);
        }
    }
}
