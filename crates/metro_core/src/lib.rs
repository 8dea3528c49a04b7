//! Core of the metro map organizer.
//! Owns the persisted station graph and keeps it consistent with the
//! workspace filesystem and with task file content.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{MetroSettings, WorkspacePaths};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::layout::{
    Edge, Group, LayoutDocument, Node, NodeId, NodeKind, NodeMark, NodeStatus, Position, Viewport,
};
pub use repo::state_repo::{
    MemoryStateRepository, RepoError, RepoResult, SqliteWorkspaceStateRepository,
    WorkspaceStateRepository,
};
pub use service::layout_store::{LayoutEvent, LayoutStore, ListenerId, StoreError, StoreResult};
pub use service::session::{DragItem, FileRename, HostEffect, HostEvent, MetroSession, ViewCommand};
pub use service::task_board::{TaskCategory, TaskEntry};
pub use service::workspace_state::GhostTask;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
