//! Core domain types
//!
//! These types represent the entities the worker reasons about and are
//! shared between the queue client, the backend probe and the runner.

pub mod backend;
pub mod job;
pub mod status;
