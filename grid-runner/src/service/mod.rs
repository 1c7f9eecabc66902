//! Service layer
//!
//! Business logic that needs no I/O: turning grid payloads into backend
//! requests, and keeping the running statistics.

pub mod stats;
pub mod transform;

pub use stats::WorkerStats;
pub use transform::transform;
