/*!
    Compressed packet wrapper.
*/

use crate::Rational;

/**
    One compressed bitstream unit together with the time base its timestamps
    are expressed in.

    Crossing a time-base boundary always goes through [`Packet::rescale_to`],
    which rescales pts, dts and duration together and records the new base.
*/
pub struct Packet {
    inner: ffmpeg_next::Packet,
    stream_index: usize,
    time_base: Rational,
}

impl Packet {
    pub fn new(inner: ffmpeg_next::Packet, stream_index: usize, time_base: Rational) -> Self {
        Self {
            inner,
            stream_index,
            time_base,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn set_stream_index(&mut self, index: usize) {
        self.stream_index = index;
        self.inner.set_stream(index);
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn pts(&self) -> Option<i64> {
        self.inner.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.inner.dts()
    }

    pub fn duration(&self) -> i64 {
        self.inner.duration()
    }

    /**
        Presentation time if known, falling back to the decode time.
    */
    pub fn timestamp(&self) -> Option<i64> {
        self.pts().or_else(|| self.dts())
    }

    pub fn is_key(&self) -> bool {
        self.inner.is_key()
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /**
        Rescale timestamps into `to` without changing their real-time meaning.
    */
    pub fn rescale_to(&mut self, to: Rational) {
        if self.time_base != to {
            self.inner.rescale_ts(self.time_base, to);
            self.time_base = to;
        }
    }

    pub fn as_ffmpeg(&self) -> &ffmpeg_next::Packet {
        &self.inner
    }

    pub fn as_ffmpeg_mut(&mut self) -> &mut ffmpeg_next::Packet {
        &mut self.inner
    }

    pub fn into_ffmpeg(self) -> ffmpeg_next::Packet {
        self.inner
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index)
            .field("pts", &self.pts())
            .field("dts", &self.dts())
            .field("time_base", &self.time_base)
            .field("size", &self.size())
            .field("is_key", &self.is_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64, dts: i64, duration: i64, time_base: Rational) -> Packet {
        let mut inner = ffmpeg_next::Packet::copy(&[0u8; 16]);
        inner.set_pts(Some(pts));
        inner.set_dts(Some(dts));
        inner.set_duration(duration);
        Packet::new(inner, 1, time_base)
    }

    #[test]
    fn rescale_moves_all_timestamps() {
        let mut pkt = packet(3_000, 0, 1_500, Rational::new(1, 90_000));
        pkt.rescale_to(Rational::new(1, 1_000));
        assert_eq!(pkt.pts(), Some(33));
        assert_eq!(pkt.dts(), Some(0));
        assert_eq!(pkt.duration(), 17);
        assert_eq!(pkt.time_base(), Rational::new(1, 1_000));
    }

    #[test]
    fn rescale_to_same_base_is_identity() {
        let tb = Rational::new(1, 48_000);
        let mut pkt = packet(1024, 1024, 1024, tb);
        pkt.rescale_to(tb);
        assert_eq!(pkt.pts(), Some(1024));
        assert_eq!(pkt.duration(), 1024);
    }

    #[test]
    fn timestamp_falls_back_to_dts() {
        let mut pkt = packet(10, 7, 1, Rational::new(1, 25));
        pkt.as_ffmpeg_mut().set_pts(None);
        assert_eq!(pkt.timestamp(), Some(7));
    }
}
