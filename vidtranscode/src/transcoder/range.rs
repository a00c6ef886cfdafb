/*!
    Requested input range.
*/

use std::time::Duration;

/**
    Decides which packets fall inside the requested end point.

    A packet whose timestamp lies past the end is dropped and marks its
    stream as finished. Once every tracked stream has finished the job can
    stop reading. Packets without a timestamp are always admitted.
*/
#[derive(Debug, Clone)]
pub struct RangeGate {
    end: Option<Duration>,
    tracked: Vec<bool>,
    finished: Vec<bool>,
}

impl RangeGate {
    /**
        `tracked[i]` says whether stream `i` has to pass the end before the
        range is exhausted. Streams that may never carry a late packet
        (attachments, cover art, subtitles) should not be tracked.
    */
    pub fn new(end: Option<Duration>, tracked: Vec<bool>) -> Self {
        let finished = vec![false; tracked.len()];
        Self {
            end,
            tracked,
            finished,
        }
    }

    pub fn end(&self) -> Option<Duration> {
        self.end
    }

    pub fn admit(&mut self, stream: usize, timestamp: Option<Duration>) -> bool {
        let (Some(end), Some(ts)) = (self.end, timestamp) else {
            return true;
        };
        if ts <= end {
            return true;
        }
        if let Some(done) = self.finished.get_mut(stream) {
            *done = true;
        }
        false
    }

    /**
        True once every tracked stream passed the end. Never true without
        an end or without tracked streams.
    */
    pub fn is_exhausted(&self) -> bool {
        self.end.is_some()
            && self.tracked.iter().any(|&t| t)
            && self
                .tracked
                .iter()
                .zip(&self.finished)
                .all(|(&tracked, &done)| !tracked || done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Option<Duration> {
        Some(Duration::from_secs(s))
    }

    #[test]
    fn open_range_admits_everything() {
        let mut gate = RangeGate::new(None, vec![true]);
        assert!(gate.admit(0, secs(1_000)));
        assert!(!gate.is_exhausted());
    }

    #[test]
    fn exhausted_once_all_tracked_streams_pass_the_end() {
        let mut gate = RangeGate::new(secs(10), vec![true, true, false]);
        assert!(gate.admit(0, secs(9)));
        assert!(gate.admit(1, None));
        assert!(!gate.admit(0, secs(11)));
        assert!(!gate.is_exhausted());

        assert!(!gate.admit(2, secs(12)));
        assert!(!gate.is_exhausted());

        assert!(!gate.admit(1, secs(11)));
        assert!(gate.is_exhausted());
    }

    #[test]
    fn end_point_is_inclusive() {
        let mut gate = RangeGate::new(secs(10), vec![true]);
        assert!(gate.admit(0, secs(10)));
        assert!(!gate.is_exhausted());
    }

    #[test]
    fn nothing_tracked_never_exhausts() {
        let mut gate = RangeGate::new(secs(1), vec![false]);
        assert!(!gate.admit(0, secs(2)));
        assert!(!gate.is_exhausted());
    }
}
