//! Error types for the csp-styles event-loop plumbing.

use std::fmt;

/// Task-queue errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The timer ID is invalid, has already fired, or was already stopped.
    InvalidTimerId,
    /// The microtask ID is unknown or the task has already run.
    InvalidTaskId,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimerId => write!(f, "Invalid or expired timer ID"),
            Self::InvalidTaskId => write!(f, "Invalid or already executed task ID"),
        }
    }
}

impl std::error::Error for TaskError {}

/// A specialized Result type for task-queue operations.
pub type Result<T> = std::result::Result<T, TaskError>;
