//! Grid Core
//!
//! Core types shared by the grid worker crates.
//!
//! This crate contains:
//! - Domain types: jobs, outcomes, backend descriptors, worker statistics
//! - DTOs: wire shapes for the grid queue API and chat-completion backends
//! - Text helpers applied to generated output

pub mod domain;
pub mod dto;
pub mod text;
