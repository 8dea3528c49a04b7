//! Repository layer for the workspace side store.
//!
//! # Responsibility
//! - Define the key-value contract used by services for durable state.
//! - Keep SQL details behind the repository boundary.
//!
//! # Invariants
//! - Values are JSON documents; each write replaces the whole value for a key.

pub mod state_repo;
