//! # Fairlane
//!
//! Admission control and fair scheduling for request-driven servers.
//!
//! This library sits between a transport layer and its handlers and decides,
//! per request, whether to run it now, queue it, or reject it. It was built
//! for a collaborative kanban server whose traffic mixes health probes,
//! interactive board edits, search queries, and maintenance jobs: without
//! admission control a burst of background work starves the interactive
//! traffic, and an overload takes down health checking with everything else.
//!
//! ## How It Works
//!
//! - **Five priority lanes**: every request is classified into `Critical`,
//!   `High`, `Normal`, `Low`, or `Background`. Each lane is FIFO.
//! - **Weighted fair dispatch**: lanes are drained by a weighted fair rule
//!   (weight over dispatch count), so lower lanes keep making progress while
//!   higher lanes get most of the capacity. Strict priority order is
//!   available when fairness is not wanted.
//! - **Bounded concurrency and queueing**: at most `max_concurrent` requests
//!   run at once; at most `max_queue_size` wait. Admission past that point
//!   sheds the newest entry of a strictly lower lane, or rejects the
//!   newcomer when nothing lower is queued.
//! - **Timeout shedding**: a request that waits past `request_timeout_ms` is
//!   evicted and its caller told to retry.
//! - **Async gate**: [`runtime::AdmissionGate`] wraps the callback-driven
//!   scheduler into one `await` returning a permit or a rejection with HTTP
//!   mapping hints.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fairlane::config::SchedulerConfig;
//! use fairlane::core::RequestAttrs;
//! use fairlane::runtime::AdmissionGate;
//!
//! let gate = AdmissionGate::with_defaults(SchedulerConfig::default())?;
//!
//! let attrs = RequestAttrs {
//!     path: "/api/boards/42/cards",
//!     method: "POST",
//!     upgrade_requested: false,
//! };
//! match gate.admit(&attrs).await {
//!     Ok(permit) => {
//!         // ... handle the request ...
//!         permit.finish();
//!     }
//!     Err(rejection) => {
//!         respond(rejection.status_code(), rejection.retry_after());
//!     }
//! }
//! ```
//!
//! For complete examples, see:
//! - `tests/gate_test.rs` - End-to-end admission flows
//! - `tests/fairness_test.rs` - Lane selection behavior under load

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct schedulers and gates from configuration.
pub mod builders;
/// Configuration models for admission control and scheduling.
pub mod config;
/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Runtime adapters: the async admission gate and the tokio spawner.
pub mod runtime;
/// Shared utilities.
pub mod util;
