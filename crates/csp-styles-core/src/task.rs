//! Deferred task queue modeled on a browser event loop.
//!
//! Microtasks run at the next checkpoint, after the synchronous work that
//! posted them. Delayed tasks run once their timer expires, each followed by
//! a microtask checkpoint. Everything runs on the thread that drives the
//! queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Result, TaskError};
use crate::logging::targets;
use crate::timer::{TimerId, TimerQueue};

/// A boxed task closure.
pub type LocalTask = Box<dyn FnOnce() + 'static>;

/// A unique identifier for a queued microtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw u64 value of this task ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Global counter for generating unique task IDs.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// Something that can run deferred work on the host's event loop.
///
/// Implementations must never run a task synchronously from inside the
/// `spawn_*` call.
pub trait Executor {
    /// Run `task` at the next microtask checkpoint.
    fn spawn_microtask(&self, task: LocalTask);

    /// Run `task` once `delay` has elapsed.
    fn spawn_after(&self, delay: Duration, task: LocalTask);
}

/// Internal task data.
struct TaskData {
    id: TaskId,
    task: LocalTask,
}

#[derive(Default)]
struct QueueState {
    microtasks: VecDeque<TaskData>,
    timers: TimerQueue,
}

/// Single-threaded microtask and timer queue.
///
/// `TaskQueue` is a cheap handle; clones share the same queue. Tasks may post
/// further tasks while running.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Rc<RefCell<QueueState>>,
}

impl TaskQueue {
    /// Create an empty task queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a microtask.
    pub fn post_microtask<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() + 'static,
    {
        let id = next_task_id();
        self.inner.borrow_mut().microtasks.push_back(TaskData {
            id,
            task: Box::new(task),
        });
        tracing::trace!(target: targets::TASK, id = id.as_u64(), "microtask queued");
        id
    }

    /// Queue a task to run after `delay`.
    pub fn post_delayed<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().timers.start(delay, Box::new(task))
    }

    /// Cancel a queued microtask.
    ///
    /// Fails if the task is unknown or has already run.
    pub fn cancel_microtask(&self, id: TaskId) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        let pos = state
            .microtasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskError::InvalidTaskId)?;
        state.microtasks.remove(pos);
        Ok(())
    }

    /// Cancel a delayed task before its timer fires.
    pub fn cancel_timer(&self, id: TimerId) -> Result<()> {
        self.inner.borrow_mut().timers.stop(id)
    }

    /// Check if there is any queued work.
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Get the number of queued microtasks and waiting timers.
    pub fn pending_count(&self) -> usize {
        let state = self.inner.borrow();
        state.microtasks.len() + state.timers.active_count()
    }

    /// Get the duration until the next timer fires, if any.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.inner.borrow_mut().timers.time_until_next()
    }

    /// Run microtasks until the queue is empty, including microtasks posted
    /// while draining.
    ///
    /// Returns the number of tasks run.
    #[tracing::instrument(skip(self), target = "csp_styles_core::task", level = "trace")]
    pub fn run_microtasks(&self) -> usize {
        let mut count = 0;
        loop {
            // Release the borrow before running so the task may post more work.
            let next = self.inner.borrow_mut().microtasks.pop_front();
            let Some(data) = next else {
                break;
            };
            tracing::trace!(target: targets::TASK, id = data.id.as_u64(), "running microtask");
            (data.task)();
            count += 1;
        }
        count
    }

    /// Run every timer that is due now, each followed by a microtask checkpoint.
    ///
    /// Timers started while this runs wait for a later call. Returns the
    /// number of tasks run, microtasks included.
    #[tracing::instrument(skip(self), target = "csp_styles_core::timer", level = "trace")]
    pub fn run_expired(&self) -> usize {
        let now = Instant::now();
        let mut count = 0;
        loop {
            let next = self.inner.borrow_mut().timers.pop_expired(now);
            let Some(task) = next else {
                break;
            };
            task();
            count += 1 + self.run_microtasks();
        }
        count
    }

    /// Run until no microtasks or timers remain, sleeping between timers.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = self.run_microtasks();
        while let Some(wait) = self.time_until_next() {
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            count += self.run_expired();
        }
        count
    }
}

impl Executor for TaskQueue {
    fn spawn_microtask(&self, task: LocalTask) {
        self.post_microtask(task);
    }

    fn spawn_after(&self, delay: Duration, task: LocalTask) {
        self.post_delayed(delay, task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("TaskQueue")
            .field("microtasks", &state.microtasks.len())
            .field("timers", &state.timers.active_count())
            .finish()
    }
}
