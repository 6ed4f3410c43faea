//! Runtime adapters: the async admission gate and the tokio spawner.

pub mod adapter;
pub mod tokio_spawner;

pub use adapter::{AdmissionGate, Permit, Rejection, ScheduledHandler};
pub use tokio_spawner::TokioSpawner;
