//! One-shot timer queue.
//!
//! Timers carry the task to run when they fire. Entries that fire at the same
//! instant run in the order they were started.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, TaskError};
use crate::logging::targets;
use crate::task::LocalTask;

/// Deadline offset used when `now + delay` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// Internal timer data.
struct TimerData {
    /// The task to run when the timer fires.
    task: LocalTask,
}

/// An entry in the timer queue (min-heap by fire time, then start order).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
    seq: u64,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending one-shot timers.
pub struct TimerQueue {
    /// All registered timers.
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending timer fires.
    queue: BinaryHeap<TimerQueueEntry>,
    next_seq: u64,
}

impl TimerQueue {
    /// Create an empty timer queue.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Start a one-shot timer that runs `task` after `delay`.
    ///
    /// Delays too large for an `Instant` are capped at roughly a century.
    pub fn start(&mut self, delay: Duration, task: LocalTask) -> TimerId {
        let now = Instant::now();
        let fire_at = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let id = self.timers.insert(TimerData { task });
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: fire_at,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        tracing::trace!(target: targets::TIMER, ?id, ?delay, "timer started");
        id
    }

    /// Stop a timer before it fires.
    pub fn stop(&mut self, id: TimerId) -> Result<()> {
        match self.timers.remove(id) {
            Some(_) => Ok(()),
            None => Err(TaskError::InvalidTimerId),
        }
    }

    /// Check if a timer is still waiting to fire.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Get the duration until the next timer fires, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        self.discard_stopped();
        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(Instant::now()))
    }

    /// Remove and return the task of the earliest timer due at `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<LocalTask> {
        self.discard_stopped();
        let entry = *self.queue.peek()?;
        if entry.fire_time > now {
            return None;
        }
        self.queue.pop();
        let data = self.timers.remove(entry.id)?;
        tracing::trace!(target: targets::TIMER, id = ?entry.id, "timer fired");
        Some(data.task)
    }

    /// Get the number of timers waiting to fire.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    fn discard_stopped(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> LocalTask {
        let log = Rc::clone(log);
        Box::new(move || log.borrow_mut().push(label))
    }

    #[test]
    fn expired_timers_fire_in_start_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timers = TimerQueue::new();
        timers.start(Duration::ZERO, recording(&log, "a"));
        timers.start(Duration::ZERO, recording(&log, "b"));

        let now = Instant::now();
        while let Some(task) = timers.pop_expired(now) {
            task();
        }

        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn future_timers_do_not_fire() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timers = TimerQueue::new();
        let id = timers.start(Duration::from_secs(60), recording(&log, "late"));

        assert!(timers.pop_expired(Instant::now()).is_none());
        assert!(timers.is_active(id));
        assert!(timers.time_until_next().is_some());
    }

    #[test]
    fn stopped_timer_is_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timers = TimerQueue::new();
        let id = timers.start(Duration::ZERO, recording(&log, "stopped"));

        assert!(timers.stop(id).is_ok());
        assert_eq!(timers.stop(id), Err(TaskError::InvalidTimerId));
        assert!(timers.pop_expired(Instant::now()).is_none());
        assert!(timers.time_until_next().is_none());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unrepresentable_delay_is_capped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut timers = TimerQueue::new();
        let id = timers.start(Duration::MAX, recording(&log, "never"));

        assert!(timers.is_active(id));
        assert!(timers.pop_expired(Instant::now()).is_none());
        assert!(timers.time_until_next().is_some_and(|wait| wait > Duration::from_secs(60)));
    }
}
