/*!
    Property change events published to the embedding application.
*/

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use ffmpeg_types::TrackInfo;

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;

/**
    Something about the engine changed.

    Events are queued and taken by the observer exactly once.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyChangeEvent {
    DurationChanged(Duration),
    TrackListChanged(Vec<TrackInfo>),
    PositionChanged(Duration),
    /// Number of preview frames now available.
    PreviewFramesChanged(usize),
    ErrorOccurred(String),
    /// A job that started its packet loop has ended.
    TranscodeFinished { elapsed: Duration, cancelled: bool },
}

struct QueueInner {
    events: VecDeque<PropertyChangeEvent>,
    max_size: usize,
    sequence: u64,
}

/**
    Bounded event queue that drops the oldest event on overflow.

    Producers never block. Observers either poll with [`EventQueue::take`]
    or park in [`EventQueue::wait_timeout`] until something is pushed.
*/
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    pushed: Condvar,
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(max_size),
                max_size,
                sequence: 0,
            }),
            pushed: Condvar::new(),
        }
    }

    pub fn push(&self, event: PropertyChangeEvent) {
        let mut inner = self.inner.lock();
        inner.events.push_back(event);
        while inner.events.len() > inner.max_size {
            inner.events.pop_front();
        }
        inner.sequence += 1;
        self.pushed.notify_all();
    }

    pub fn take(&self) -> Option<PropertyChangeEvent> {
        self.inner.lock().events.pop_front()
    }

    /**
        Take the next event, waiting up to `timeout` for one to arrive.
    */
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PropertyChangeEvent> {
        let mut inner = self.inner.lock();
        if inner.events.is_empty() {
            let seen = inner.sequence;
            let _ = self
                .pushed
                .wait_while_for(&mut inner, |inner| inner.sequence == seen, timeout);
        }
        inner.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size
    }

    /**
        Change the capacity. Shrinking drops the oldest queued events.
    */
    pub fn set_max_size(&self, max_size: usize) {
        let mut inner = self.inner.lock();
        inner.max_size = max_size.max(1);
        while inner.events.len() > inner.max_size {
            inner.events.pop_front();
        }
    }

    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_QUEUE_SIZE)
    }
}
