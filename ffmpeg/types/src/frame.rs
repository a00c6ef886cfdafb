/*!
    Decoded frame wrapper.
*/

use ffmpeg_next::util::frame::{audio::Audio as AudioFrame, video::Video as VideoFrame};

use crate::{MediaKind, Rational};

/**
    One decoded or filtered media unit.

    Each variant owns its FFmpeg frame; a filter that yields several outputs
    from one input hands out independent frames.
*/
pub enum Frame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl Frame {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Video(_) => MediaKind::Video,
            Self::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn pts(&self) -> Option<i64> {
        match self {
            Self::Video(f) => f.pts(),
            Self::Audio(f) => f.pts(),
        }
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        match self {
            Self::Video(f) => f.set_pts(pts),
            Self::Audio(f) => f.set_pts(pts),
        }
    }

    /**
        Frame duration in the time base of its pts, zero when unknown.
    */
    pub fn duration(&self) -> i64 {
        // SAFETY: the pointer comes from an owned, allocated AVFrame.
        unsafe {
            match self {
                Self::Video(f) => (*f.as_ptr()).duration,
                Self::Audio(f) => (*f.as_ptr()).duration,
            }
        }
    }

    pub fn is_key(&self) -> bool {
        match self {
            Self::Video(f) => f.is_key(),
            Self::Audio(_) => true,
        }
    }

    /**
        Rescale pts and duration from one time base to another.
    */
    pub fn rescale(&mut self, from: Rational, to: Rational) {
        if from == to {
            return;
        }
        let pts = self.pts().map(|pts| from.rescale(pts, to));
        self.set_pts(pts);
        // SAFETY: see `duration`.
        unsafe {
            let ptr = match self {
                Self::Video(f) => f.as_mut_ptr(),
                Self::Audio(f) => f.as_mut_ptr(),
            };
            if (*ptr).duration > 0 {
                (*ptr).duration = from.rescale((*ptr).duration, to);
            }
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match self {
            Self::Video(f) => Some(f),
            Self::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match self {
            Self::Audio(f) => Some(f),
            Self::Video(_) => None,
        }
    }

    pub fn as_ffmpeg(&self) -> &ffmpeg_next::Frame {
        match self {
            Self::Video(f) => &**f,
            Self::Audio(f) => &**f,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video(v) => f
                .debug_struct("Frame::Video")
                .field("pts", &v.pts())
                .field("width", &v.width())
                .field("height", &v.height())
                .field("format", &v.format())
                .finish(),
            Self::Audio(a) => f
                .debug_struct("Frame::Audio")
                .field("pts", &a.pts())
                .field("samples", &a.samples())
                .field("rate", &a.rate())
                .field("format", &a.format())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::format::Pixel;

    use super::*;

    #[test]
    fn rescale_updates_pts_and_duration() {
        let mut inner = VideoFrame::new(Pixel::YUV420P, 16, 16);
        inner.set_pts(Some(3_003));
        // SAFETY: freshly allocated frame.
        unsafe { (*inner.as_mut_ptr()).duration = 3_003 };
        let mut frame = Frame::Video(inner);

        frame.rescale(Rational::new(1, 90_000), Rational::new(1001, 30_000));
        assert_eq!(frame.pts(), Some(1));
        assert_eq!(frame.duration(), 1);
        assert_eq!(frame.kind(), MediaKind::Video);
    }

    #[test]
    fn missing_pts_stays_missing() {
        let mut frame = Frame::Video(VideoFrame::new(Pixel::YUV420P, 16, 16));
        frame.set_pts(None);
        frame.rescale(Rational::new(1, 25), Rational::new(1, 1000));
        assert_eq!(frame.pts(), None);
    }
}
