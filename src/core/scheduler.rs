//! The admission scheduler: lanes, concurrency accounting, timers, dispatch.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::error::AdmissionError;
use crate::core::lanes::LaneSet;
use crate::core::record::{CompletionPort, DropCause, RequestRecord};
use crate::core::stats::{LaneStatus, QueueStatus, SchedulingStats, StatsLedger};
use crate::util::clock::duration_to_ms;
use crate::util::serde::{PriorityLevel, RequestId};

/// Spawns futures onto whatever runtime drives the scheduler.
///
/// Object-safe so the scheduler can hold `Arc<dyn Spawn>`; see
/// [`TokioSpawner`](crate::runtime::TokioSpawner) for the stock
/// implementation.
pub trait Spawn: Send + Sync {
    /// Spawn a future to run to completion in the background.
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// A record popped from its lane, holding the capability to resume it.
///
/// Dropping an `AdmittedRequest` without resuming releases its concurrency
/// slot (the port's drop-safety) and discards the continuation unresumed.
#[derive(Debug)]
pub struct AdmittedRequest {
    record: RequestRecord,
    port: CompletionPort,
    waited: Duration,
}

impl AdmittedRequest {
    /// Identifier of the admitted record.
    pub fn id(&self) -> &RequestId {
        self.record.id()
    }

    /// Priority lane the record came from.
    pub fn priority(&self) -> PriorityLevel {
        self.record.priority()
    }

    /// Time the record spent queued.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Resume the continuation with this record's completion port.
    pub fn resume(self) -> Result<(), AdmissionError> {
        self.record.resume_with(self.port)
    }
}

/// State guarded by the scheduler mutex. Every mutation of one field that
/// implies a mutation of another happens inside the same critical section.
struct SchedulerState {
    lanes: LaneSet,
    in_flight: HashMap<RequestId, PriorityLevel>,
    /// Timer registry: ids with an armed admission timeout. Deregistration is
    /// cancellation; a fired timer whose id is absent does nothing.
    timers: HashSet<RequestId>,
    stats: StatsLedger,
}

struct SchedulerInner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    spawner: Arc<dyn Spawn>,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
}

/// Outcome of the enqueue critical section, resolved outside the lock.
enum EnqueueDecision {
    Admitted { shed: Option<RequestRecord> },
    Rejected { queued: usize },
}

/// Multi-lane admission scheduler with weighted fair dispatch, backpressure
/// eviction, and timeout shedding.
///
/// Cloning is cheap and shares the same scheduler. Every mutating operation
/// is a synchronous critical section under one lock with no await points, so
/// capacity checks can never interleave with the state changes they guard.
/// Continuations, drop notifications, and audit writes run outside the lock.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler from validated configuration.
    pub fn new(config: SchedulerConfig, spawner: Arc<dyn Spawn>) -> Result<Self, AdmissionError> {
        Self::with_audit(config, spawner, None)
    }

    /// Build a scheduler that records admission decisions to an audit sink.
    pub fn with_audit(
        config: SchedulerConfig,
        spawner: Arc<dyn Spawn>,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Result<Self, AdmissionError> {
        config.validate().map_err(AdmissionError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState {
                    lanes: LaneSet::new(),
                    in_flight: HashMap::new(),
                    timers: HashSet::new(),
                    stats: StatsLedger::default(),
                }),
                spawner,
                audit: audit.map(Mutex::new),
            }),
        })
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Admit a record into its priority lane.
    ///
    /// The capacity check and, when backpressure is enabled, the make-room
    /// scan run as one critical section; at most one queued record is shed
    /// per call, always from a lane strictly below the newcomer. Admission
    /// schedules an asynchronous dispatch attempt; enqueue itself never
    /// dispatches. Returns [`AdmissionError::QueueFull`] when capacity is
    /// exhausted and nothing can be shed.
    ///
    /// Record ids must be unique for the scheduler's lifetime; the gate
    /// satisfies this by generating UUIDs.
    pub fn enqueue(&self, record: RequestRecord) -> Result<(), AdmissionError> {
        let inner = &self.inner;
        let id = record.id().clone();
        let priority = record.priority();

        let decision = {
            let mut state = inner.state.lock();
            state.stats.note_attempt();

            let queued = state.lanes.total_queued();
            let over_capacity = queued >= inner.config.max_queue_size;
            let victim = if over_capacity && inner.config.enable_backpressure {
                state.lanes.shed_candidate(priority)
            } else {
                None
            };

            if over_capacity && victim.is_none() {
                state.stats.note_rejected();
                EnqueueDecision::Rejected { queued }
            } else {
                let shed = victim
                    .and_then(|lane| state.lanes.pop_back(lane))
                    .map(|evicted| {
                        state.timers.remove(evicted.id());
                        state.stats.note_dropped();
                        evicted
                    });
                state.timers.insert(id.clone());
                state.lanes.push_back(record);
                state.stats.note_queued(priority);
                EnqueueDecision::Admitted { shed }
            }
        };

        match decision {
            EnqueueDecision::Admitted { shed } => {
                if let Some(evicted) = shed {
                    tracing::warn!(
                        evicted = %evicted.id(),
                        lane = %evicted.priority(),
                        admitted = %id,
                        "backpressure shed queued record"
                    );
                    inner.record_audit(
                        evicted.id(),
                        evicted.priority(),
                        AuditAction::Shed,
                        Some(format!("made room for {id}")),
                    );
                    evicted.drop_with(DropCause::Shed);
                }
                tracing::debug!(id = %id, priority = %priority, "request enqueued");
                inner.record_audit(&id, priority, AuditAction::Enqueued, None);
                inner.arm_timeout(&id);
                inner.kick();
                Ok(())
            }
            EnqueueDecision::Rejected { queued } => {
                tracing::warn!(
                    id = %id,
                    priority = %priority,
                    queued,
                    limit = inner.config.max_queue_size,
                    "queue full, request rejected"
                );
                inner.record_audit(
                    &id,
                    priority,
                    AuditAction::Rejected,
                    Some(format!("{queued} queued")),
                );
                Err(AdmissionError::QueueFull {
                    queued,
                    limit: inner.config.max_queue_size,
                })
            }
        }
    }

    /// Pop the next dispatchable record, if capacity and lanes allow.
    ///
    /// The scheduler's own pump drives this continuously; it is public for
    /// callers that manage dispatch themselves.
    pub fn dequeue(&self) -> Option<AdmittedRequest> {
        self.inner.next_admitted()
    }

    /// Report completion of an in-flight record. Idempotent: the second call
    /// for an id is a no-op.
    pub fn complete(&self, id: &RequestId, processing: Duration) {
        self.inner.complete(id, processing);
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> SchedulingStats {
        self.inner.state.lock().stats.snapshot()
    }

    /// Per-lane diagnostic snapshot.
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        let lanes = PriorityLevel::ALL.map(|level| LaneStatus {
            priority: level,
            depth: state.lanes.depth(level),
            dispatched: state.lanes.dispatched(level),
            oldest_wait_ms: state.lanes.oldest_wait(level).map(duration_to_ms),
        });
        QueueStatus {
            lanes,
            total_queued: state.lanes.total_queued(),
            in_flight: state.in_flight.len(),
            max_concurrent: self.inner.config.max_concurrent,
            max_queue_size: self.inner.config.max_queue_size,
        }
    }

    /// Zero the counters and means. Queue contents and per-lane dispatch
    /// history are preserved; the queued gauge is re-seeded from the live
    /// lanes.
    pub fn reset_stats(&self) {
        let mut state = self.inner.state.lock();
        let live = state.lanes.total_queued();
        state.stats.reset(live);
    }
}

impl SchedulerInner {
    /// Schedule an asynchronous dispatch attempt.
    fn kick(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.spawner.spawn(Box::pin(async move {
            inner.pump();
        }));
    }

    /// Dispatch admitted records until capacity or lanes run out.
    fn pump(self: &Arc<Self>) {
        while let Some(admitted) = self.next_admitted() {
            let id = admitted.id().clone();
            let priority = admitted.priority();
            if let Err(err) = admitted.resume() {
                tracing::error!(id = %id, error = %err, "continuation failed after dispatch");
                self.record_audit(
                    &id,
                    priority,
                    AuditAction::DispatchFailed,
                    Some(err.to_string()),
                );
                // No-op when the failing continuation already dropped its
                // port; settles the slot when it did not.
                self.complete(&id, Duration::ZERO);
            }
        }
    }

    /// The dequeue critical section: selection, timer deregistration,
    /// in-flight accounting, wait bookkeeping.
    fn next_admitted(self: &Arc<Self>) -> Option<AdmittedRequest> {
        let (record, waited) = {
            let mut state = self.state.lock();
            if state.in_flight.len() >= self.config.max_concurrent {
                return None;
            }
            let selected = if self.config.fair_scheduling {
                state.lanes.select_fair(&self.config.priority_weights)
            } else {
                state.lanes.select_strict()
            };
            let lane = selected?;
            let record = state.lanes.pop_front(lane)?;
            state.timers.remove(record.id());
            state.lanes.note_dispatch(lane);
            state
                .in_flight
                .insert(record.id().clone(), record.priority());
            let waited = record.wait_time();
            state.stats.note_dispatched(waited);
            (record, waited)
        };

        let id = record.id().clone();
        let priority = record.priority();
        tracing::debug!(
            id = %id,
            priority = %priority,
            waited_ms = duration_to_ms(waited),
            "request dispatched"
        );
        self.record_audit(&id, priority, AuditAction::Dispatched, None);
        let port = self.completion_port(id);
        Some(AdmittedRequest {
            record,
            port,
            waited,
        })
    }

    /// Build the completion capability for a dispatched record. The port
    /// holds only a weak reference: completing after the scheduler is gone
    /// is a no-op.
    fn completion_port(self: &Arc<Self>, id: RequestId) -> CompletionPort {
        let weak = Arc::downgrade(self);
        let callback_id = id.clone();
        CompletionPort::new(
            id,
            Box::new(move |processing| {
                if let Some(inner) = weak.upgrade() {
                    inner.complete(&callback_id, processing);
                }
            }),
        )
    }

    fn complete(self: &Arc<Self>, id: &RequestId, processing: Duration) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.in_flight.remove(id);
            if removed.is_some() {
                state.stats.note_completed(processing);
            }
            removed
        };
        match removed {
            Some(priority) => {
                tracing::debug!(
                    id = %id,
                    priority = %priority,
                    processing_ms = duration_to_ms(processing),
                    "request completed"
                );
                self.record_audit(id, priority, AuditAction::Completed, None);
                self.kick();
            }
            None => {
                tracing::debug!(id = %id, "duplicate or unknown completion ignored");
            }
        }
    }

    /// Spawn the admission timeout for a registered id. Registration happened
    /// inside the enqueue critical section; deregistration is cancellation.
    fn arm_timeout(self: &Arc<Self>, id: &RequestId) {
        let weak = Arc::downgrade(self);
        let id = id.clone();
        let timeout = self.config.request_timeout();
        self.spawner.spawn(Box::pin(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict_timed_out(&id);
            }
        }));
    }

    /// Timer-fire handler. A missing registration means the record already
    /// reached a terminal state: do nothing. Timeouts free queue space, not
    /// capacity, so no dispatch attempt follows.
    fn evict_timed_out(self: &Arc<Self>, id: &RequestId) {
        let victim = {
            let mut state = self.state.lock();
            if !state.timers.remove(id) {
                return;
            }
            let removed = state.lanes.remove(id);
            if removed.is_some() {
                state.stats.note_dropped();
            }
            removed
        };
        let Some(record) = victim else {
            tracing::debug!(id = %id, "timeout fired for already-settled record");
            return;
        };
        let waited = record.wait_time();
        tracing::warn!(
            id = %id,
            priority = %record.priority(),
            waited_ms = duration_to_ms(waited),
            "queued request timed out"
        );
        self.record_audit(
            id,
            record.priority(),
            AuditAction::TimedOut,
            Some(format!("waited {}ms", duration_to_ms(waited))),
        );
        record.drop_with(DropCause::TimedOut);
    }

    fn record_audit(
        &self,
        id: &RequestId,
        priority: PriorityLevel,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock().record(build_audit_event(id, priority, action, detail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drops spawned futures: no pump, no timers. Lets these tests drive the
    /// scheduler synchronously.
    struct NullSpawn;

    impl Spawn for NullSpawn {
        fn spawn(&self, _fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {}
    }

    fn scheduler(config: SchedulerConfig) -> Scheduler {
        Scheduler::new(config, Arc::new(NullSpawn)).unwrap()
    }

    fn record(id: &str, priority: PriorityLevel) -> RequestRecord {
        RequestRecord::new(RequestId::from(id), priority)
    }

    #[test]
    fn test_rejects_when_full_without_backpressure() {
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 0,
            max_queue_size: 1,
            enable_backpressure: false,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("a", PriorityLevel::Low)).unwrap();
        let err = sched.enqueue(record("b", PriorityLevel::Critical)).unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::QueueFull { queued: 1, limit: 1 }
        ));
        // The resident record is untouched.
        let status = sched.queue_status();
        assert_eq!(status.total_queued, 1);
        assert_eq!(status.lanes[PriorityLevel::Low.index()].depth, 1);
    }

    #[test]
    fn test_make_room_sheds_tail_of_lowest_lane() {
        let shed = Arc::new(Mutex::new(Vec::new()));
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 0,
            max_queue_size: 2,
            ..SchedulerConfig::default()
        });

        for id in ["l1", "l2"] {
            let log = Arc::clone(&shed);
            sched
                .enqueue(
                    record(id, PriorityLevel::Low)
                        .on_drop(move |cause| log.lock().push((id.to_owned(), cause))),
                )
                .unwrap();
        }
        sched.enqueue(record("h1", PriorityLevel::High)).unwrap();

        // The newest Low entry lost its slot; the oldest kept its place.
        assert_eq!(shed.lock().as_slice(), &[("l2".to_owned(), DropCause::Shed)]);
        let status = sched.queue_status();
        assert_eq!(status.lanes[PriorityLevel::Low.index()].depth, 1);
        assert_eq!(status.lanes[PriorityLevel::High.index()].depth, 1);
        assert_eq!(sched.stats().dropped_requests, 1);
    }

    #[test]
    fn test_make_room_never_evicts_equal_or_higher() {
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 0,
            max_queue_size: 2,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("c1", PriorityLevel::Critical)).unwrap();
        sched.enqueue(record("n1", PriorityLevel::Normal)).unwrap();

        // A Normal newcomer cannot displace the resident Normal or Critical.
        let err = sched.enqueue(record("n2", PriorityLevel::Normal)).unwrap_err();
        assert!(matches!(err, AdmissionError::QueueFull { .. }));
        assert_eq!(sched.queue_status().total_queued, 2);
    }

    #[test]
    fn test_dequeue_respects_concurrency_bound() {
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 1,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("a", PriorityLevel::Normal)).unwrap();
        sched.enqueue(record("b", PriorityLevel::Normal)).unwrap();

        let first = sched.dequeue().unwrap();
        assert_eq!(first.id().as_str(), "a");
        // Slot taken: nothing else may dispatch.
        assert!(sched.dequeue().is_none());

        sched.complete(&RequestId::from("a"), Duration::from_millis(3));
        let second = sched.dequeue().unwrap();
        assert_eq!(second.id().as_str(), "b");
    }

    #[test]
    fn test_drain_mode_never_dispatches() {
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 0,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("a", PriorityLevel::Critical)).unwrap();
        assert!(sched.dequeue().is_none());
    }

    #[test]
    fn test_strict_scheduling_ignores_weights() {
        let sched = scheduler(SchedulerConfig {
            fair_scheduling: false,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("bg", PriorityLevel::Background)).unwrap();
        sched.enqueue(record("cr", PriorityLevel::Critical)).unwrap();

        let first = sched.dequeue().unwrap();
        assert_eq!(first.priority(), PriorityLevel::Critical);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let sched = scheduler(SchedulerConfig::default());
        sched.enqueue(record("a", PriorityLevel::Normal)).unwrap();
        let admitted = sched.dequeue().unwrap();
        let id = admitted.id().clone();

        sched.complete(&id, Duration::from_millis(40));
        sched.complete(&id, Duration::from_millis(999));

        let stats = sched.stats();
        assert_eq!(stats.processed_requests, 1);
        assert!((stats.average_processing_ms - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_balances_at_quiescence() {
        let sched = scheduler(SchedulerConfig {
            max_concurrent: 1,
            max_queue_size: 2,
            enable_backpressure: false,
            ..SchedulerConfig::default()
        });
        sched.enqueue(record("a", PriorityLevel::Normal)).unwrap();
        sched.enqueue(record("b", PriorityLevel::Normal)).unwrap();
        // Third attempt bounces off the full queue.
        assert!(sched.enqueue(record("c", PriorityLevel::Normal)).is_err());

        let first = sched.dequeue().unwrap();
        sched.complete(&first.id().clone(), Duration::from_millis(5));
        let second = sched.dequeue().unwrap();
        sched.complete(&second.id().clone(), Duration::from_millis(5));

        let stats = sched.stats();
        let status = sched.queue_status();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(
            stats.processed_requests
                + stats.dropped_requests
                + stats.queued_requests
                + status.in_flight as u64,
            stats.total_requests
        );
    }

    #[test]
    fn test_reset_stats_preserves_queue_and_fairness() {
        let sched = scheduler(SchedulerConfig::default());
        sched.enqueue(record("a", PriorityLevel::Normal)).unwrap();
        sched.enqueue(record("b", PriorityLevel::Normal)).unwrap();
        let admitted = sched.dequeue().unwrap();
        sched.complete(&admitted.id().clone(), Duration::from_millis(10));

        sched.reset_stats();
        let stats = sched.stats();
        let status = sched.queue_status();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.queued_requests, 1);
        assert_eq!(status.total_queued, 1);
        // Dispatch history is lane state, not stats state.
        assert_eq!(status.lanes[PriorityLevel::Normal.index()].dispatched, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let bad = SchedulerConfig {
            max_queue_size: 0,
            ..SchedulerConfig::default()
        };
        let err = Scheduler::new(bad, Arc::new(NullSpawn)).unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidConfig(_)));
    }
}
