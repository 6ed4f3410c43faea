//! Scheduling counters, running means, and diagnostic snapshots.

use std::time::Duration;

use serde::Serialize;

use crate::util::serde::{PerPriority, PriorityLevel};

/// Point-in-time scheduling statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingStats {
    /// Every enqueue attempt, including rejected ones.
    pub total_requests: u64,
    /// Requests that completed processing.
    pub processed_requests: u64,
    /// Records currently queued across all lanes.
    pub queued_requests: u64,
    /// Requests rejected at the door, shed, or timed out.
    pub dropped_requests: u64,
    /// Running mean queue wait, in milliseconds.
    pub average_wait_ms: f64,
    /// Running mean processing time, in milliseconds.
    pub average_processing_ms: f64,
    /// Admitted-to-queue counts per level. Monotonic until reset.
    pub priority_distribution: PerPriority<u64>,
}

/// Per-lane row in a [`QueueStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneStatus {
    /// The lane's priority level.
    pub priority: PriorityLevel,
    /// Records currently queued in the lane.
    pub depth: usize,
    /// Dequeues from this lane since construction. Fairness history.
    pub dispatched: u64,
    /// Queue wait of the lane head, in milliseconds.
    pub oldest_wait_ms: Option<u64>,
}

/// Point-in-time view of lanes, in-flight work, and configured limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    /// One row per lane, highest priority first.
    pub lanes: [LaneStatus; PriorityLevel::COUNT],
    /// Total queued records.
    pub total_queued: usize,
    /// Records dispatched and not yet completed.
    pub in_flight: usize,
    /// Configured concurrency bound.
    pub max_concurrent: usize,
    /// Configured queue capacity.
    pub max_queue_size: usize,
}

/// Mutable counter state kept behind the scheduler lock.
///
/// The queued gauge mirrors total lane depth; every mutation here pairs with
/// the lane mutation that justifies it, inside the same critical section.
#[derive(Debug, Default)]
pub(crate) struct StatsLedger {
    total: u64,
    processed: u64,
    queued: u64,
    dropped: u64,
    wait_ms_mean: f64,
    wait_samples: u64,
    processing_ms_mean: f64,
    distribution: PerPriority<u64>,
}

impl StatsLedger {
    /// An enqueue attempt arrived, before any capacity check.
    pub fn note_attempt(&mut self) {
        self.total += 1;
    }

    /// A record entered its lane.
    pub fn note_queued(&mut self, level: PriorityLevel) {
        self.queued += 1;
        *self.distribution.get_mut(level) += 1;
    }

    /// An enqueue attempt was rejected at the door.
    pub fn note_rejected(&mut self) {
        self.dropped += 1;
    }

    /// A queued record was shed or timed out.
    pub fn note_dropped(&mut self) {
        self.queued = self.queued.saturating_sub(1);
        self.dropped += 1;
    }

    /// A record left its lane for the in-flight set.
    #[allow(clippy::cast_precision_loss)]
    pub fn note_dispatched(&mut self, wait: Duration) {
        self.queued = self.queued.saturating_sub(1);
        self.wait_samples += 1;
        let sample = wait.as_secs_f64() * 1000.0;
        self.wait_ms_mean += (sample - self.wait_ms_mean) / self.wait_samples as f64;
    }

    /// An in-flight record completed.
    #[allow(clippy::cast_precision_loss)]
    pub fn note_completed(&mut self, processing: Duration) {
        self.processed += 1;
        let sample = processing.as_secs_f64() * 1000.0;
        self.processing_ms_mean += (sample - self.processing_ms_mean) / self.processed as f64;
    }

    /// Snapshot the ledger.
    pub fn snapshot(&self) -> SchedulingStats {
        SchedulingStats {
            total_requests: self.total,
            processed_requests: self.processed,
            queued_requests: self.queued,
            dropped_requests: self.dropped,
            average_wait_ms: self.wait_ms_mean,
            average_processing_ms: self.processing_ms_mean,
            priority_distribution: self.distribution,
        }
    }

    /// Zero every counter and mean, then re-seed the queued gauge from live
    /// lane depth. Queue contents and fairness history are not stats state
    /// and survive untouched.
    pub fn reset(&mut self, live_queued: usize) {
        *self = Self::default();
        self.queued = live_queued as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_means_are_incremental() {
        let mut ledger = StatsLedger::default();
        ledger.note_dispatched(Duration::from_millis(100));
        ledger.note_dispatched(Duration::from_millis(200));
        ledger.note_completed(Duration::from_millis(30));
        ledger.note_completed(Duration::from_millis(60));
        ledger.note_completed(Duration::from_millis(90));

        let snap = ledger.snapshot();
        assert!((snap.average_wait_ms - 150.0).abs() < 1e-9);
        assert!((snap.average_processing_ms - 60.0).abs() < 1e-9);
        assert_eq!(snap.processed_requests, 3);
    }

    #[test]
    fn test_ledger_balances_at_quiescence() {
        let mut ledger = StatsLedger::default();
        // Three attempts: one rejected, one dropped after queueing, one served.
        ledger.note_attempt();
        ledger.note_rejected();
        ledger.note_attempt();
        ledger.note_queued(PriorityLevel::Low);
        ledger.note_dropped();
        ledger.note_attempt();
        ledger.note_queued(PriorityLevel::Normal);
        ledger.note_dispatched(Duration::ZERO);
        ledger.note_completed(Duration::from_millis(10));

        let snap = ledger.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(
            snap.processed_requests + snap.dropped_requests + snap.queued_requests,
            snap.total_requests
        );
    }

    #[test]
    fn test_distribution_counts_only_admitted() {
        let mut ledger = StatsLedger::default();
        ledger.note_attempt();
        ledger.note_rejected();
        ledger.note_attempt();
        ledger.note_queued(PriorityLevel::High);

        let snap = ledger.snapshot();
        assert_eq!(snap.priority_distribution.high, 1);
        assert_eq!(snap.priority_distribution.critical, 0);
    }

    #[test]
    fn test_reset_reseeds_queued_gauge() {
        let mut ledger = StatsLedger::default();
        ledger.note_attempt();
        ledger.note_queued(PriorityLevel::Normal);
        ledger.note_dispatched(Duration::from_millis(500));

        ledger.reset(4);
        let snap = ledger.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.queued_requests, 4);
        assert!((snap.average_wait_ms - 0.0).abs() < f64::EPSILON);
        assert_eq!(snap.priority_distribution, PerPriority::default());
    }
}
