//! Audit trail for admission decisions.
//!
//! Keeps a bounded in-memory record of scheduler transitions for diagnostics
//! and tests.

use std::collections::VecDeque;

use serde::Serialize;

use crate::util::clock::now_ms;
use crate::util::serde::{PriorityLevel, RequestId};

/// Scheduler transition recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Record accepted into a lane.
    Enqueued,
    /// Enqueue attempt rejected at the door.
    Rejected,
    /// Queued record evicted by backpressure.
    Shed,
    /// Queued record evicted by its admission timeout.
    TimedOut,
    /// Record moved to the in-flight set and resumed.
    Dispatched,
    /// Continuation failed after dispatch.
    DispatchFailed,
    /// In-flight record completed.
    Completed,
}

impl AuditAction {
    /// Stable lower-case name, used in event ids.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Rejected => "rejected",
            Self::Shed => "shed",
            Self::TimedOut => "timed_out",
            Self::Dispatched => "dispatched",
            Self::DispatchFailed => "dispatch_failed",
            Self::Completed => "completed",
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier (`<request id>-<action>-<timestamp>`).
    pub event_id: String,
    /// Related request identifier.
    pub request_id: RequestId,
    /// Priority lane of the request.
    pub priority: PriorityLevel,
    /// Transition recorded.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    request_id: &RequestId,
    priority: PriorityLevel,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{request_id}-{}-{created_at_ms}", action.as_str()),
        request_id: request_id.clone(),
        priority,
        action,
        created_at_ms,
        detail,
    }
}
