//! The admission gate: classify a request, enqueue it, await the verdict.
//!
//! The scheduler itself speaks in callbacks; this adapter turns one admission
//! round into a single `await`. The continuation and the drop notifier share
//! one oneshot sender behind a take-once slot, so exactly one of them can
//! ever signal the waiting caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::core::classify::{Classify, DefaultClassifier, RequestAttrs};
use crate::core::error::AdmissionError;
use crate::core::record::{CompletionPort, DropCause, RequestRecord};
use crate::core::scheduler::Scheduler;
use crate::runtime::tokio_spawner::TokioSpawner;
use crate::util::clock::duration_to_ms;
use crate::util::serde::{PriorityLevel, RequestId};

/// What the scheduler decided about one gated request.
enum GateSignal {
    Admitted(CompletionPort),
    Dropped(DropCause),
}

/// Why a gated request was turned away.
#[derive(Debug, Error)]
pub enum Rejection {
    /// The queue was full and nothing lower-priority could be shed.
    #[error("queue full: {queued} queued, limit {limit}")]
    Capacity {
        /// Total queued records at rejection time.
        queued: usize,
        /// Configured queue capacity.
        limit: usize,
    },
    /// The request was queued, then evicted to admit higher-priority work.
    #[error("request {id} shed under backpressure")]
    Shed {
        /// Identifier assigned at the gate.
        id: RequestId,
    },
    /// The request waited past the admission timeout.
    #[error("request {id} timed out after {waited_ms}ms in queue")]
    Timeout {
        /// Identifier assigned at the gate.
        id: RequestId,
        /// Time spent waiting at the gate, in milliseconds.
        waited_ms: u64,
    },
    /// The scheduler went away before deciding.
    #[error("request {id} abandoned: scheduler shut down")]
    Closed {
        /// Identifier assigned at the gate.
        id: RequestId,
    },
}

impl Rejection {
    /// Retry-After to advise when rejecting for capacity.
    pub const RETRY_AFTER_CAPACITY: Duration = Duration::from_secs(5);
    /// Retry-After to advise when rejecting for queue timeout.
    pub const RETRY_AFTER_TIMEOUT: Duration = Duration::from_secs(1);

    /// HTTP status a transport layer should map this rejection to. Capacity
    /// rejections are 503s, timeouts 408s, so client retry logic can back
    /// off differently for each.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Capacity { .. } | Self::Shed { .. } | Self::Closed { .. } => 503,
            Self::Timeout { .. } => 408,
        }
    }

    /// Suggested Retry-After delay, when retrying makes sense.
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Capacity { .. } | Self::Shed { .. } => Some(Self::RETRY_AFTER_CAPACITY),
            Self::Timeout { .. } => Some(Self::RETRY_AFTER_TIMEOUT),
            Self::Closed { .. } => None,
        }
    }
}

impl From<Rejection> for AdmissionError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Capacity { queued, limit } => Self::QueueFull { queued, limit },
            Rejection::Shed { id } => Self::Shed { id },
            Rejection::Timeout { id, waited_ms } => Self::RequestTimeout { id, waited_ms },
            Rejection::Closed { id } => Self::Dispatch {
                id,
                reason: "scheduler shut down before dispatch".to_owned(),
            },
        }
    }
}

/// Proof that a request was admitted, holding its concurrency slot.
///
/// Call [`finish`](Self::finish) when the work is done. Dropping an
/// unfinished permit still releases the slot, charging the time since
/// dispatch as processing time.
#[derive(Debug)]
pub struct Permit {
    port: CompletionPort,
    priority: PriorityLevel,
    waited: Duration,
}

impl Permit {
    /// Identifier assigned at the gate.
    pub fn id(&self) -> &RequestId {
        self.port.id()
    }

    /// Lane the request was classified into.
    pub fn priority(&self) -> PriorityLevel {
        self.priority
    }

    /// Time from submission to admission.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Release the slot, charging the time since dispatch as processing
    /// time.
    pub fn finish(self) {
        let processing = self.port.elapsed();
        self.port.notify(processing);
    }

    /// Release the slot with an explicit processing time.
    pub fn finish_with(self, processing: Duration) {
        self.port.notify(processing);
    }
}

/// Work to run under an admission permit; see [`AdmissionGate::run`].
#[async_trait]
pub trait ScheduledHandler: Send + Sync {
    /// Value produced when the work runs.
    type Response: Send;

    /// Run the admitted work. The permit stays open until this returns.
    async fn handle(&self, permit: &Permit) -> Self::Response;
}

/// Front door for request traffic: classifies, enqueues, and suspends the
/// caller until the scheduler admits or drops the request.
///
/// Cloning shares the underlying scheduler.
#[derive(Clone)]
pub struct AdmissionGate {
    scheduler: Scheduler,
    classifier: Arc<dyn Classify>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Build a gate over an existing scheduler.
    pub fn new(scheduler: Scheduler, classifier: Arc<dyn Classify>) -> Self {
        Self {
            scheduler,
            classifier,
        }
    }

    /// Build a gate with the stock classifier, spawning onto the ambient
    /// tokio runtime. Fails outside a runtime or on invalid configuration.
    pub fn with_defaults(config: SchedulerConfig) -> Result<Self, AdmissionError> {
        let spawner = TokioSpawner::try_current()
            .ok_or_else(|| AdmissionError::InvalidConfig("no tokio runtime in scope".into()))?;
        let scheduler = Scheduler::new(config, Arc::new(spawner))?;
        Ok(Self::new(scheduler, Arc::new(DefaultClassifier)))
    }

    /// The scheduler behind the gate, for stats and status snapshots.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Classify and enqueue one request, then wait for the scheduler.
    ///
    /// Resolves to a [`Permit`] when dispatched, or a [`Rejection`] when the
    /// queue was full, the request was shed or timed out, or the scheduler
    /// shut down mid-wait.
    pub async fn admit(&self, attrs: &RequestAttrs<'_>) -> Result<Permit, Rejection> {
        let priority = self.classifier.classify(attrs);
        let id = RequestId::generate();
        let submitted = Instant::now();

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let dispatch_slot = Arc::clone(&slot);
        let record = RequestRecord::new(id.clone(), priority)
            .on_dispatch(move |port| {
                if let Some(tx) = dispatch_slot.lock().take() {
                    // A closed receiver means the caller stopped waiting; the
                    // unsent port drops here and releases the slot.
                    let _ = tx.send(GateSignal::Admitted(port));
                }
                Ok(())
            })
            .on_drop(move |cause| {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(GateSignal::Dropped(cause));
                }
            });

        if let Err(err) = self.scheduler.enqueue(record) {
            return Err(match err {
                AdmissionError::QueueFull { queued, limit } => {
                    Rejection::Capacity { queued, limit }
                }
                other => {
                    tracing::error!(id = %id, error = %other, "unexpected enqueue failure");
                    Rejection::Closed { id }
                }
            });
        }

        match rx.await {
            Ok(GateSignal::Admitted(port)) => Ok(Permit {
                port,
                priority,
                waited: submitted.elapsed(),
            }),
            Ok(GateSignal::Dropped(DropCause::TimedOut)) => Err(Rejection::Timeout {
                id,
                waited_ms: duration_to_ms(submitted.elapsed()),
            }),
            Ok(GateSignal::Dropped(DropCause::Shed)) => Err(Rejection::Shed { id }),
            Err(_) => Err(Rejection::Closed { id }),
        }
    }

    /// Admit, run the handler, then release the slot with the measured
    /// processing time.
    pub async fn run<H>(
        &self,
        attrs: &RequestAttrs<'_>,
        handler: &H,
    ) -> Result<H::Response, Rejection>
    where
        H: ScheduledHandler,
    {
        let permit = self.admit(attrs).await?;
        let response = handler.handle(&permit).await;
        permit.finish();
        Ok(response)
    }
}
