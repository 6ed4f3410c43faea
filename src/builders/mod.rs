//! Builders to construct schedulers and gates from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::SchedulerBuilder;
