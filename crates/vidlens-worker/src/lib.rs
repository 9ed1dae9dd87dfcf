//! Video analysis worker.
//!
//! This crate provides:
//! - Job processor driving the job state machine
//! - Executor consuming tasks with bounded concurrency and crash recovery
//! - Stall reconciler failing jobs abandoned in `Processing`
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod reconciler;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{JobProcessor, ProcessOutcome, SkipReason};
pub use reconciler::StallReconciler;
