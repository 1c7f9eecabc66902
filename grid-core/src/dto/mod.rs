//! Data Transfer Objects
//!
//! Wire shapes for the two HTTP APIs the worker speaks: the grid queue API
//! and the chat-completion API of the local backend.

pub mod chat;
pub mod queue;
