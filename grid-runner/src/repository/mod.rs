//! Repository layer
//!
//! Repositories are the pipeline's only way out of the process: the grid
//! queue on one side, the local inference backend on the other. They carry
//! no business logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod inference;
mod queue;

// Re-export traits
pub use inference::InferenceRepository;
#[cfg(test)]
pub use inference::{BackendReply, TransportError};
pub use queue::QueueRepository;

// Re-export implementations
pub use inference::HttpInferenceRepository;
pub use queue::HttpQueueRepository;
