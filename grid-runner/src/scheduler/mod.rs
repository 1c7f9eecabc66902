//! Scheduler layer for the runner
//!
//! The pipeline runs one claim → infer → submit cycle at a time; the worker
//! drives it in a background task and exposes stop, reload and status to
//! the rest of the process.

pub mod pipeline;
pub mod worker;

pub use worker::{Worker, WorkerHandle};
