//! Local Inference Backend Probe
//!
//! Finds out which inference engine is running where: a parallel scan of
//! every known engine's default port, classification of an arbitrary URL,
//! model listing and context-window lookup.
//!
//! Engine knowledge lives in one table ([`engines::ENGINES`]); the probing
//! code walks it instead of branching on engine names. Nothing is cached,
//! every call talks to the backend again.
//!
//! # Example
//!
//! ```no_run
//! use grid_probe::{ProbeResult, identify, scan};
//!
//! #[tokio::main]
//! async fn main() {
//!     for backend in scan().await {
//!         println!("{} at {} ({} models)", backend.name, backend.url, backend.models.len());
//!     }
//!
//!     if let ProbeResult::AuthRequired = identify("http://127.0.0.1:8000", None).await {
//!         println!("backend wants an API key");
//!     }
//! }
//! ```

pub mod chat;
pub mod engines;
pub mod error;
pub mod extract;
mod http;
pub mod identify;
pub mod scan;

// Re-export commonly used items
pub use chat::{ModelReply, test_model};
pub use error::{ProbeError, Result};
pub use identify::{ProbeResult, context_length, identify, list_models, normalize_url};
pub use scan::{PROBE_TIMEOUT, scan, scan_host};
