//! Request records and the capabilities that resolve them.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::error::AdmissionError;
use crate::util::serde::{PriorityLevel, RequestId};

/// Why a queued record was dropped before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    /// The record sat queued past the configured admission timeout.
    TimedOut,
    /// Backpressure shed the record to make room for higher-priority work.
    Shed,
}

/// Suspended work, resumed with a [`CompletionPort`] when its record is
/// admitted. Invoked at most once.
pub type Continuation =
    Box<dyn FnOnce(CompletionPort) -> Result<(), AdmissionError> + Send + 'static>;

/// Callback fired when a queued record is evicted before dispatch. Invoked at
/// most once.
pub type DropNotifier = Box<dyn FnOnce(DropCause) + Send + 'static>;

/// Single-use capability for reporting that admitted work finished.
///
/// Handed to the continuation at dispatch. `notify` consumes the port, so
/// double completion is unrepresentable; the scheduler's completion path is
/// idempotent besides, so a port racing a direct `complete` call stays a
/// no-op. Dropping a port that was never notified still releases the
/// concurrency slot, using the time since dispatch as the processing time;
/// a panicking handler cannot leave its record stuck in flight.
pub struct CompletionPort {
    id: RequestId,
    dispatched_at: Instant,
    notify: Option<Box<dyn FnOnce(Duration) + Send + Sync>>,
}

impl CompletionPort {
    pub(crate) fn new(id: RequestId, notify: Box<dyn FnOnce(Duration) + Send + Sync>) -> Self {
        Self {
            id,
            dispatched_at: Instant::now(),
            notify: Some(notify),
        }
    }

    /// Identifier of the admitted record.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Time elapsed since dispatch.
    pub fn elapsed(&self) -> Duration {
        self.dispatched_at.elapsed()
    }

    /// Report the elapsed processing time and release the concurrency slot.
    pub fn notify(mut self, processing: Duration) {
        if let Some(done) = self.notify.take() {
            done(processing);
        }
    }
}

impl fmt::Debug for CompletionPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionPort")
            .field("id", &self.id)
            .field("notified", &self.notify.is_none())
            .finish()
    }
}

impl Drop for CompletionPort {
    fn drop(&mut self) {
        if let Some(done) = self.notify.take() {
            tracing::debug!(id = %self.id, "completion port dropped without notify; releasing slot");
            done(self.dispatched_at.elapsed());
        }
    }
}

/// A unit of admission: identity, priority, timing, and the callbacks that
/// resolve it.
///
/// Exactly one of the two callbacks fires: the continuation on admission, or
/// the drop notifier on eviction. A record rejected at the door fires
/// neither; the caller learns that from the `enqueue` result. Retry counters
/// are bookkeeping carried for callers; the scheduler never re-enqueues on
/// its own.
pub struct RequestRecord {
    id: RequestId,
    priority: PriorityLevel,
    enqueued_at: Instant,
    continuation: Continuation,
    on_drop: DropNotifier,
    retry_count: u32,
    max_retries: u32,
}

impl RequestRecord {
    /// Create a record with default callbacks: admission completes
    /// immediately with zero processing time, eviction is silent.
    pub fn new(id: RequestId, priority: PriorityLevel) -> Self {
        Self {
            id,
            priority,
            enqueued_at: Instant::now(),
            continuation: Box::new(|port| {
                port.notify(Duration::ZERO);
                Ok(())
            }),
            on_drop: Box::new(|_cause| {}),
            retry_count: 0,
            max_retries: 0,
        }
    }

    /// Replace the continuation invoked at dispatch.
    pub fn on_dispatch<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CompletionPort) -> Result<(), AdmissionError> + Send + 'static,
    {
        self.continuation = Box::new(f);
        self
    }

    /// Replace the eviction notifier.
    pub fn on_drop<F>(mut self, f: F) -> Self
    where
        F: FnOnce(DropCause) + Send + 'static,
    {
        self.on_drop = Box::new(f);
        self
    }

    /// Set the retry bookkeeping carried on the record.
    pub fn with_retry_budget(mut self, retry_count: u32, max_retries: u32) -> Self {
        self.retry_count = retry_count;
        self.max_retries = max_retries;
        self
    }

    /// Record identifier.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Priority lane the record belongs to.
    pub fn priority(&self) -> PriorityLevel {
        self.priority
    }

    /// Instant the record was created for enqueueing.
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Time spent queued so far.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Retries already attempted for this request.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Retry budget for this request.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Consume the record, resuming its continuation with the given port.
    pub(crate) fn resume_with(self, port: CompletionPort) -> Result<(), AdmissionError> {
        (self.continuation)(port)
    }

    /// Consume the record, firing its drop notifier.
    pub(crate) fn drop_with(self, cause: DropCause) {
        (self.on_drop)(cause);
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
