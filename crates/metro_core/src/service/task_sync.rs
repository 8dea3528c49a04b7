//! Task completion synchronization.
//!
//! # Responsibility
//! - Keep a task node's `completed` flag, the checkbox marker inside its
//!   file, and the completion timestamp in the workspace state in agreement.
//! - Create task files and task stations.
//!
//! # Invariants
//! - Completion sync is one-way: file write, then timestamp write, then an
//!   in-memory patch. It never calls `save()`, so the diff inside `save()`
//!   cannot re-trigger it.
//! - An existing task file is never overwritten on create.
//! - A completed task has a timestamp entry; an uncompleted one has none.

use crate::model::layout::{LayoutDocument, Node, NodeId, Position};
use crate::model::task::{apply_completion, is_checked, task_file_name, task_file_template};
use crate::service::layout_store::{
    io_error, path_string, LayoutStore, StoreError, StoreResult,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A task node whose `completed` flag changed between two documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletionChange {
    pub node_id: NodeId,
    pub file_path: String,
    pub completed: bool,
}

/// Task nodes in `incoming` whose completion differs from the node with the
/// same id in `previous`. Nodes new to `incoming` are not changes.
pub(crate) fn completion_changes(
    previous: &LayoutDocument,
    incoming: &LayoutDocument,
) -> Vec<CompletionChange> {
    let previous_by_id: HashMap<&str, &Node> = previous
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    incoming
        .nodes
        .iter()
        .filter(|node| node.is_task())
        .filter_map(|node| {
            let old = previous_by_id.get(node.id.as_str())?;
            if old.is_completed() == node.is_completed() {
                return None;
            }
            Some(CompletionChange {
                node_id: node.id.clone(),
                file_path: node.file_path.clone()?,
                completed: node.is_completed(),
            })
        })
        .collect()
}

impl LayoutStore {
    /// Sets the completion state of the task stored at `file_path`.
    ///
    /// Returns `false` without side effects when the file cannot be read.
    pub fn update_task_completion(&mut self, file_path: &str, completed: bool) -> bool {
        if !self.apply_task_completion(file_path, completed, None) {
            return false;
        }
        self.commit();
        true
    }

    /// Flips the task at `file_path` based on its current file content.
    pub fn toggle_task_file(&mut self, file_path: &str) -> bool {
        match fs::read_to_string(file_path) {
            Ok(content) => self.update_task_completion(file_path, !is_checked(&content)),
            Err(err) => {
                debug!(
                    "event=task_toggle module=task_sync status=skip path={} error={}",
                    file_path, err
                );
                false
            }
        }
    }

    /// File marker, timestamp and node patch, without persisting the layout.
    ///
    /// The patched node is `node_id` when given, otherwise the first node
    /// bound to `file_path`.
    pub(super) fn apply_task_completion(
        &mut self,
        file_path: &str,
        completed: bool,
        node_id: Option<&str>,
    ) -> bool {
        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) => {
                debug!(
                    "event=task_sync module=task_sync status=skip path={} error={}",
                    file_path, err
                );
                return false;
            }
        };

        if let Some(updated) = apply_completion(&content, completed) {
            if let Err(err) = fs::write(file_path, updated) {
                warn!(
                    "event=task_sync module=task_sync status=error stage=file path={} error={}",
                    file_path, err
                );
            }
        }

        let completed_at = if completed {
            let now = Utc::now().timestamp_millis();
            if let Err(err) = self.state.record_completion(file_path, now) {
                warn!(
                    "event=task_sync module=task_sync status=error stage=state error={}",
                    err
                );
            }
            Some(now)
        } else {
            if let Err(err) = self.state.clear_completion(file_path) {
                warn!(
                    "event=task_sync module=task_sync status=error stage=state error={}",
                    err
                );
            }
            None
        };

        let target = match node_id {
            Some(id) => self.layout.nodes.iter_mut().find(|node| node.id == id),
            None => self
                .layout
                .nodes
                .iter_mut()
                .find(|node| node.is_bound_to(file_path)),
        };
        if let Some(node) = target {
            node.completed = Some(completed);
            node.completed_at = completed_at;
        }

        info!(
            "event=task_sync module=task_sync status=ok completed={}",
            completed
        );
        true
    }

    /// Ensures a task file named after `name` exists in the task directory.
    ///
    /// Returns the file path, whether freshly created or already present.
    pub fn create_task(&self, name: &str) -> Option<PathBuf> {
        match self.try_create_task(name) {
            Ok(path) => Some(path),
            Err(StoreError::NoWorkspace) => {
                debug!("event=task_create module=task_sync status=skip reason=no_workspace");
                None
            }
            Err(err) => {
                warn!(
                    "event=task_create module=task_sync status=error error={}",
                    err
                );
                None
            }
        }
    }

    fn try_create_task(&self, name: &str) -> StoreResult<PathBuf> {
        let task_dir = &self.paths.as_ref().ok_or(StoreError::NoWorkspace)?.task_dir;
        let file_name =
            task_file_name(name).ok_or_else(|| StoreError::InvalidTaskName(name.to_string()))?;
        fs::create_dir_all(task_dir).map_err(io_error("mkdir", task_dir))?;

        let path = task_dir.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(task_file_template(name.trim()).as_bytes())
                    .map_err(io_error("write", &path))?;
                info!("event=task_create module=task_sync status=ok created=true");
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                info!("event=task_create module=task_sync status=ok created=false");
            }
            Err(err) => return Err(io_error("create", &path)(err)),
        }
        Ok(path)
    }

    /// Creates (or reuses) a task file and places a task station for it.
    pub fn create_task_node(&mut self, name: &str, position: Position) -> Option<Node> {
        let path = self.create_task(name)?;
        let node = self.file_node(Path::new(&path), position, None);
        debug!(
            "event=task_node_create module=task_sync status=ok node_id={} path={}",
            node.id,
            path_string(&path)
        );
        self.layout.nodes.push(node.clone());
        self.commit();
        Some(node)
    }
}
