//! Persisted metro map model and task file conventions.
//!
//! # Responsibility
//! - Define the JSON shape of the layout document (nodes, edges, groups).
//! - Define the plain-text conventions of task files.
//!
//! # Invariants
//! - Node ids are opaque strings, stable for the node lifetime.
//! - Fields unknown to core survive a load/save cycle untouched.

pub mod layout;
pub mod task;
