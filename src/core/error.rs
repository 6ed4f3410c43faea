//! Error types for admission and scheduling operations.

use thiserror::Error;

use crate::util::serde::RequestId;

/// Errors produced by the admission-control components.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A priority value outside the five known levels hit a parse boundary.
    /// Scheduler state is never touched by this error.
    #[error("unknown priority level: {0}")]
    InvalidPriority(String),
    /// The queue is at capacity and nothing strictly lower-priority could be
    /// shed to make room.
    #[error("queue full: {queued} queued, limit {limit}")]
    QueueFull {
        /// Total queued records at rejection time.
        queued: usize,
        /// Configured queue capacity.
        limit: usize,
    },
    /// A queued record waited past its admission timeout and was shed.
    #[error("request {id} timed out after {waited_ms}ms in queue")]
    RequestTimeout {
        /// Identifier of the shed record.
        id: RequestId,
        /// Time the record spent queued, in milliseconds.
        waited_ms: u64,
    },
    /// A queued record was evicted to make room for higher-priority work.
    #[error("request {id} shed under backpressure")]
    Shed {
        /// Identifier of the shed record.
        id: RequestId,
    },
    /// Resuming an admitted record failed. The completion port still
    /// releases the slot, wherever the continuation left it; the error
    /// itself is surfaced, never swallowed.
    #[error("dispatch failed for request {id}: {reason}")]
    Dispatch {
        /// Identifier of the failed record.
        id: RequestId,
        /// Failure context from the continuation.
        reason: String,
    },
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
