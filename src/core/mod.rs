//! Core scheduling abstractions and capacity accounting.

pub mod audit;
pub mod classify;
pub mod error;
pub mod lanes;
pub mod record;
pub mod scheduler;
pub mod stats;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use classify::{Classify, DefaultClassifier, RequestAttrs};
pub use error::{AdmissionError, AppResult};
pub use lanes::LaneSet;
pub use record::{CompletionPort, Continuation, DropCause, DropNotifier, RequestRecord};
pub use scheduler::{AdmittedRequest, Scheduler, Spawn};
pub use stats::{LaneStatus, QueueStatus, SchedulingStats};
