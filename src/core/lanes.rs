//! The five priority lanes and the selection policies over them.

use std::collections::VecDeque;
use std::time::Duration;

use crate::core::record::RequestRecord;
use crate::util::serde::{PerPriority, PriorityLevel, RequestId};

/// One FIFO lane plus its dispatch history.
#[derive(Default)]
struct Lane {
    entries: VecDeque<RequestRecord>,
    dispatched: u64,
}

/// Fixed set of five priority lanes.
///
/// Normal dequeue pops lane heads, so FIFO holds within a lane. Backpressure
/// eviction pops the victim lane's tail instead: among same-priority victims
/// the entry that waited least loses the least invested wait. `dispatched`
/// counts dequeues, not completions, and is what weighted fair selection
/// normalizes by.
pub struct LaneSet {
    lanes: [Lane; PriorityLevel::COUNT],
}

impl LaneSet {
    /// Five empty lanes with zeroed dispatch history.
    pub fn new() -> Self {
        Self {
            lanes: std::array::from_fn(|_| Lane::default()),
        }
    }

    /// Number of queued records in one lane.
    pub fn depth(&self, level: PriorityLevel) -> usize {
        self.lanes[level.index()].entries.len()
    }

    /// Total queued records across all lanes.
    pub fn total_queued(&self) -> usize {
        self.lanes.iter().map(|lane| lane.entries.len()).sum()
    }

    /// True when every lane is empty.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|lane| lane.entries.is_empty())
    }

    /// Per-lane depths, for snapshots.
    pub fn depths(&self) -> PerPriority<usize> {
        PerPriority::from_fn(|level| self.depth(level))
    }

    /// Dispatch count for one lane.
    pub fn dispatched(&self, level: PriorityLevel) -> u64 {
        self.lanes[level.index()].dispatched
    }

    /// Queue wait of the lane head, if any.
    pub fn oldest_wait(&self, level: PriorityLevel) -> Option<Duration> {
        self.lanes[level.index()]
            .entries
            .front()
            .map(RequestRecord::wait_time)
    }

    /// Append a record at the tail of its lane.
    pub fn push_back(&mut self, record: RequestRecord) {
        self.lanes[record.priority().index()].entries.push_back(record);
    }

    /// Pop the head of a lane.
    pub fn pop_front(&mut self, level: PriorityLevel) -> Option<RequestRecord> {
        self.lanes[level.index()].entries.pop_front()
    }

    /// Pop the tail of a lane. The backpressure eviction primitive.
    pub fn pop_back(&mut self, level: PriorityLevel) -> Option<RequestRecord> {
        self.lanes[level.index()].entries.pop_back()
    }

    /// Remove a record by id from whatever position it occupies.
    pub fn remove(&mut self, id: &RequestId) -> Option<RequestRecord> {
        for lane in &mut self.lanes {
            if let Some(pos) = lane.entries.iter().position(|record| record.id() == id) {
                return lane.entries.remove(pos);
            }
        }
        None
    }

    /// Record a dispatch from a lane.
    pub fn note_dispatch(&mut self, level: PriorityLevel) {
        self.lanes[level.index()].dispatched += 1;
    }

    /// Backpressure victim lane: the lowest-priority non-empty lane strictly
    /// below `level`, scanning upward from Background. `None` means the
    /// newcomer cannot displace anything.
    pub fn shed_candidate(&self, level: PriorityLevel) -> Option<PriorityLevel> {
        PriorityLevel::ALL
            .into_iter()
            .rev()
            .take_while(|candidate| *candidate > level)
            .find(|candidate| !self.lanes[candidate.index()].entries.is_empty())
    }

    /// Weighted fair choice: the non-empty lane with the highest
    /// `weight / max(1, dispatched)` score. Ascending iteration with a
    /// strictly-greater comparison makes ties go to the higher-priority
    /// (numerically lower) lane, independent of float edge cases.
    #[allow(clippy::cast_precision_loss)]
    pub fn select_fair(&self, weights: &PerPriority<u32>) -> Option<PriorityLevel> {
        let mut best: Option<(PriorityLevel, f64)> = None;
        for level in PriorityLevel::ALL {
            let lane = &self.lanes[level.index()];
            if lane.entries.is_empty() {
                continue;
            }
            let score = f64::from(*weights.get(level)) / lane.dispatched.max(1) as f64;
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((level, score));
            }
        }
        best.map(|(level, _)| level)
    }

    /// Strict choice: the first non-empty lane in ascending level order.
    pub fn select_strict(&self) -> Option<PriorityLevel> {
        PriorityLevel::ALL
            .into_iter()
            .find(|level| !self.lanes[level.index()].entries.is_empty())
    }
}

impl Default for LaneSet {
    fn default() -> Self {
        Self::new()
    }
}
