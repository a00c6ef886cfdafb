/*!
    Rational numbers used as time bases.
*/

use std::fmt;
use std::time::Duration;

/**
    A rational number, used for time bases and frame rates.

    A timestamp `ts` expressed in time base `num/den` means
    `ts * num / den` seconds.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Microsecond time base, the unit of container durations and progress.
    pub const MICROS: Self = Self::new(1, 1_000_000);

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns true if both terms are non-zero.

        FFmpeg reports unknown time bases and frame rates as `0/0` or `0/1`.
    */
    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    pub const fn invert(self) -> Self {
        Self::new(self.den, self.num)
    }

    /**
        Rescale `ts` from this time base into `to`, rounding to the nearest
        tick with halves away from zero.

        Invalid time bases on either side return `ts` unchanged.
    */
    pub fn rescale(self, ts: i64, to: Rational) -> i64 {
        if self == to || !self.is_valid() || !to.is_valid() {
            return ts;
        }

        let mut num = ts as i128 * self.num as i128 * to.den as i128;
        let mut den = self.den as i128 * to.num as i128;
        if den < 0 {
            num = -num;
            den = -den;
        }
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            -((-num + half) / den)
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /**
        Convert a timestamp in this time base to a wall-clock duration.

        Negative timestamps clamp to zero.
    */
    pub fn to_duration(self, ts: i64) -> Duration {
        let micros = self.rescale(ts, Self::MICROS);
        Duration::from_micros(micros.max(0) as u64)
    }

    /**
        Convert a duration to a timestamp in this time base.
    */
    pub fn from_duration(self, duration: Duration) -> i64 {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Self::MICROS.rescale(micros, self)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<ffmpeg_next::Rational> for Rational {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

impl From<Rational> for ffmpeg_next::Rational {
    fn from(r: Rational) -> Self {
        ffmpeg_next::Rational::new(r.num, r.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_between_common_time_bases() {
        let mpegts = Rational::new(1, 90_000);
        let mp4 = Rational::new(1, 15_360);
        // 1.5 seconds
        assert_eq!(mpegts.rescale(135_000, mp4), 23_040);
        assert_eq!(mp4.rescale(23_040, mpegts), 135_000);
        assert_eq!(mpegts.rescale(135_000, Rational::MICROS), 1_500_000);
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        let ms = Rational::new(1, 1_000);
        let ntsc = Rational::new(1001, 30_000);
        // frame 1 of 29.97 fps is 33.366ms
        assert_eq!(ntsc.rescale(1, ms), 33);
        assert_eq!(ntsc.rescale(2, ms), 67);
        assert_eq!(ntsc.rescale(-2, ms), -67);
    }

    #[test]
    fn rescale_audio_samples() {
        let samples = Rational::new(1, 48_000);
        let decoder = Rational::new(1, 44_100);
        assert_eq!(samples.rescale(1024, decoder), 941);
        assert_eq!(samples.rescale(48_000, decoder), 44_100);
    }

    #[test]
    fn invalid_time_base_passes_through() {
        let unknown = Rational::new(0, 1);
        assert_eq!(unknown.rescale(42, Rational::MICROS), 42);
        assert_eq!(Rational::MICROS.rescale(42, Rational::new(1, 0)), 42);
    }

    #[test]
    fn duration_round_trip() {
        let tb = Rational::new(1, 90_000);
        let ts = tb.from_duration(Duration::from_millis(2_500));
        assert_eq!(ts, 225_000);
        assert_eq!(tb.to_duration(ts), Duration::from_millis(2_500));
        assert_eq!(tb.to_duration(-10), Duration::ZERO);
    }

    #[test]
    fn to_f64_and_display() {
        assert_eq!(Rational::new(30_000, 1001).to_string(), "30000/1001");
        assert!((Rational::new(30_000, 1001).to_f64() - 29.97).abs() < 0.01);
        assert_eq!(Rational::new(1, 0).to_f64(), 0.0);
    }
}
