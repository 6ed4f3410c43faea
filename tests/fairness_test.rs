//! Integration tests for lane selection under load.
//!
//! These validate:
//! 1. The weighted fair rule produces its exact expected interleaving
//! 2. Strict mode drains lanes in descending priority
//! 3. Empty lanes are skipped without affecting the others' scores
//! 4. Uniform weights converge to equal shares
//! 5. FIFO order holds inside a lane
//! 6. Low lanes keep progressing under sustained high-priority load
//! 7. Fairness history advances at dispatch, before any completion
//!
//! Dispatch is driven by hand: the spawner drops every future, so no pump
//! races the assertions.

use fairlane::config::SchedulerConfig;
use fairlane::core::{RequestRecord, Scheduler, Spawn};
use fairlane::util::serde::PriorityLevel::{Background, Critical, High, Low, Normal};
use fairlane::util::serde::{PerPriority, PriorityLevel, RequestId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

struct ManualSpawn;

impl Spawn for ManualSpawn {
    fn spawn(&self, _fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {}
}

fn scheduler(config: SchedulerConfig) -> Scheduler {
    Scheduler::new(config, Arc::new(ManualSpawn)).unwrap()
}

fn seed(sched: &Scheduler, level: PriorityLevel, count: usize) {
    for i in 0..count {
        sched
            .enqueue(RequestRecord::new(
                RequestId::from(format!("{level}-{i}")),
                level,
            ))
            .unwrap();
    }
}

fn drain(sched: &Scheduler, count: usize) -> Vec<PriorityLevel> {
    (0..count)
        .map(|_| {
            let admitted = sched.dequeue().expect("a lane should still have work");
            let id = admitted.id().clone();
            let priority = admitted.priority();
            sched.complete(&id, Duration::ZERO);
            priority
        })
        .collect()
}

#[test]
fn test_default_weights_produce_expected_interleaving() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        ..SchedulerConfig::default()
    });
    for level in PriorityLevel::ALL {
        seed(&sched, level, 12);
    }

    // Weight over dispatch count, ties to the higher lane, computed by hand
    // for weights 10/5/3/2/1.
    let expected = [
        Critical, Critical, Critical, High, High, Critical, Normal, Normal, Critical, High,
        Critical, Low, Low, Critical, High, Normal, Critical, Critical, High, Critical, Critical,
        High, Normal, Low, Background,
    ];
    assert_eq!(drain(&sched, 25), expected);

    let status = sched.queue_status();
    let dispatched: Vec<u64> = status.lanes.iter().map(|lane| lane.dispatched).collect();
    assert_eq!(dispatched, vec![11, 6, 4, 3, 1]);
}

#[test]
fn test_strict_mode_serves_descending_priority() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        fair_scheduling: false,
        ..SchedulerConfig::default()
    });
    for level in PriorityLevel::ALL {
        seed(&sched, level, 3);
    }

    let expected = [
        Critical, Critical, Critical, High, High, High, Normal, Normal, Normal, Low, Low, Low,
        Background, Background, Background,
    ];
    assert_eq!(drain(&sched, 15), expected);
}

#[test]
fn test_empty_lanes_are_skipped() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        ..SchedulerConfig::default()
    });
    seed(&sched, Low, 4);
    seed(&sched, Background, 3);

    assert_eq!(drain(&sched, 6), [Low, Low, Low, Background, Background, Low]);
}

#[test]
fn test_uniform_weights_share_evenly() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        priority_weights: PerPriority::uniform(1),
        ..SchedulerConfig::default()
    });
    for level in PriorityLevel::ALL {
        seed(&sched, level, 6);
    }

    let picks = drain(&sched, 30);
    for level in PriorityLevel::ALL {
        let share = picks.iter().filter(|p| **p == level).count();
        assert_eq!(share, 6, "lane {level} should receive an equal share");
    }
}

#[test]
fn test_fifo_order_within_a_lane() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        ..SchedulerConfig::default()
    });
    seed(&sched, Normal, 5);

    for i in 0..5 {
        let admitted = sched.dequeue().unwrap();
        assert_eq!(admitted.id().as_str(), format!("normal-{i}"));
        sched.complete(&admitted.id().clone(), Duration::ZERO);
    }
}

#[test]
fn test_dispatch_history_advances_without_completions() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 4,
        ..SchedulerConfig::default()
    });
    seed(&sched, Critical, 3);
    seed(&sched, High, 1);

    // Hold every admission open; selection scores must respond to
    // dispatches alone.
    let mut open = Vec::new();
    for _ in 0..4 {
        open.push(sched.dequeue().unwrap());
    }
    let picks: Vec<PriorityLevel> = open.iter().map(|a| a.priority()).collect();
    assert_eq!(picks, [Critical, Critical, Critical, High]);

    let status = sched.queue_status();
    assert_eq!(status.in_flight, 4);
    assert_eq!(status.lanes[Critical.index()].dispatched, 3);
    assert_eq!(status.lanes[High.index()].dispatched, 1);
    assert_eq!(sched.stats().processed_requests, 0);
}

#[test]
fn test_background_progresses_under_sustained_critical_load() {
    let sched = scheduler(SchedulerConfig {
        max_concurrent: 1,
        ..SchedulerConfig::default()
    });
    seed(&sched, Critical, 30);
    seed(&sched, Background, 2);

    let picks = drain(&sched, 26);
    let background_at: Vec<usize> = picks
        .iter()
        .enumerate()
        .filter(|(_, p)| **p == Background)
        .map(|(i, _)| i)
        .collect();
    // Critical's score decays to 10/11 after eleven dispatches, letting the
    // weight-1 lane through.
    assert_eq!(background_at, vec![11, 12]);
}
