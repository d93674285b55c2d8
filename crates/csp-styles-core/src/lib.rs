//! Event-loop plumbing for csp-styles.
//!
//! This crate provides the host-agnostic pieces the rule manager defers work
//! through:
//!
//! - **Task Queue**: Microtask and delayed-task processing on a single thread
//! - **Timers**: One-shot timers ordered by fire time
//! - **Executor**: The seam a host event loop implements to run deferred work
//! - **Logging**: Target names for filtering `tracing` output
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use csp_styles_core::TaskQueue;
//!
//! let queue = TaskQueue::new();
//! let ran = Rc::new(Cell::new(false));
//!
//! let flag = Rc::clone(&ran);
//! queue.post_microtask(move || flag.set(true));
//! assert!(!ran.get());
//!
//! // The host event loop reaches a microtask checkpoint.
//! queue.run_microtasks();
//! assert!(ran.get());
//! ```

mod error;
pub mod logging;
mod task;
mod timer;

pub use error::{Result, TaskError};
pub use task::{Executor, LocalTask, TaskId, TaskQueue};
pub use timer::{TimerId, TimerQueue};
