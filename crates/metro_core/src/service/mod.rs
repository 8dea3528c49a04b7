//! Layout synchronization services.
//!
//! # Responsibility
//! - `layout_store`: own the in-memory map and persist every mutation.
//! - `reconciler`: follow external file renames and deletions.
//! - `task_sync`: keep task checkboxes, node flags and timestamps aligned.
//! - `task_board`: derive the task, coordinate and plan lists.
//! - `session`: route view commands and host events into the store.

pub mod layout_store;
pub mod reconciler;
pub mod session;
pub mod task_board;
pub mod task_sync;
pub mod workspace_state;
