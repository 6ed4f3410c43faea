//! Configuration models for admission control and scheduling.

pub mod scheduling;

pub use scheduling::SchedulerConfig;
