//! Configuration module
//!
//! Handles CLI configuration: where the grid lives and which key to use.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the grid API
    pub api_url: String,
    /// Grid API key; only account commands need it
    pub api_key: Option<String>,
}
