//! List projections for the side panels: open/done tasks, coordinates, and
//! the plan list of task ideas.
//!
//! # Invariants
//! - Task lists are derived from the task directory, not from the graph;
//!   files that are not on the map still appear, without a node id.
//! - Completion is read from file content at list time.
//! - A task is archived once completed for longer than the archive window.

use crate::model::layout::{Node, NodeId, NodeMark};
use crate::model::task::{is_checked, TASK_FILE_EXTENSION};
use crate::service::layout_store::{file_name_of, path_string, LayoutStore};
use crate::service::workspace_state::GhostTask;
use chrono::Utc;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    /// Not completed, or completed within the archive window.
    Open,
    /// Completed before the archive window.
    Done,
}

/// One task file as shown in a side list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub label: String,
    pub file_path: String,
    pub completed: bool,
    pub completed_at: Option<i64>,
    /// Station bound to this file, if it is on the map.
    pub node_id: Option<NodeId>,
}

impl TaskEntry {
    pub fn is_archived(&self, now_ms: i64, archive_after_ms: i64) -> bool {
        self.completed
            && self
                .completed_at
                .is_some_and(|at| now_ms - at > archive_after_ms)
    }
}

impl LayoutStore {
    /// Task files in the given category, sorted by file name.
    pub fn task_entries(&self, category: TaskCategory, now_ms: i64) -> Vec<TaskEntry> {
        let archive_after_ms = self.settings.archive_after_ms;
        self.scan_task_files()
            .into_iter()
            .filter(|entry| {
                let archived = entry.is_archived(now_ms, archive_after_ms);
                match category {
                    TaskCategory::Open => !archived,
                    TaskCategory::Done => archived,
                }
            })
            .collect()
    }

    fn scan_task_files(&self) -> Vec<TaskEntry> {
        let Some(task_dir) = self.paths.as_ref().map(|paths| &paths.task_dir) else {
            return Vec::new();
        };
        let read_dir = match fs::read_dir(task_dir) {
            Ok(read_dir) => read_dir,
            Err(err) => {
                debug!(
                    "event=task_scan module=task_board status=skip path={} error={}",
                    task_dir.display(),
                    err
                );
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(TASK_FILE_EXTENSION)
            })
            .collect();
        files.sort();

        let task_nodes: Vec<(PathBuf, &Node)> = self
            .layout
            .nodes
            .iter()
            .filter(|node| node.is_task())
            .filter_map(|node| {
                let path = node.file_path.as_deref()?;
                Some((normalize(Path::new(path)), node))
            })
            .collect();

        files
            .into_iter()
            .map(|path| {
                let normalized = normalize(&path);
                let node = task_nodes
                    .iter()
                    .find(|(node_path, _)| *node_path == normalized)
                    .map(|(_, node)| *node);
                let file_path = path_string(&path);
                let completed = match fs::read_to_string(&path) {
                    Ok(content) => is_checked(&content),
                    Err(err) => {
                        warn!(
                            "event=task_scan module=task_board status=error path={} error={}",
                            file_path, err
                        );
                        node.is_some_and(Node::is_completed)
                    }
                };
                let completed_at = node
                    .and_then(|node| node.completed_at)
                    .or_else(|| self.state.completed_at(&file_path))
                    .or_else(|| {
                        node.and_then(|node| node.file_path.as_deref())
                            .and_then(|bound| self.state.completed_at(bound))
                    });
                TaskEntry {
                    label: file_name_of(&path),
                    file_path,
                    completed,
                    completed_at,
                    node_id: node.map(|node| node.id.clone()),
                }
            })
            .collect()
    }

    /// Stations marked as coordinates, in document order.
    pub fn coordinate_nodes(&self) -> Vec<&Node> {
        self.layout
            .nodes
            .iter()
            .filter(|node| node.mark == Some(NodeMark::Coordinate))
            .collect()
    }

    pub fn ghost_tasks(&self) -> Vec<GhostTask> {
        self.state.ghost_tasks()
    }

    /// Appends a plan item. Blank labels are ignored.
    pub fn add_ghost_task(&mut self, label: &str) -> Option<GhostTask> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        let mut tasks = self.state.ghost_tasks();
        let base_id = format!("ghost-{}", Utc::now().timestamp_millis());
        let mut id = base_id.clone();
        let mut suffix = 1;
        while tasks.iter().any(|task| task.id == id) {
            id = format!("{base_id}-{suffix}");
            suffix += 1;
        }

        let task = GhostTask {
            id,
            label: label.to_string(),
            completed: false,
        };
        tasks.push(task.clone());
        self.write_ghost_tasks(&tasks).then_some(task)
    }

    pub fn remove_ghost_task(&mut self, id: &str) -> bool {
        let mut tasks = self.state.ghost_tasks();
        let before = tasks.len();
        tasks.retain(|task| !task.matches(id));
        tasks.len() != before && self.write_ghost_tasks(&tasks)
    }

    pub fn toggle_ghost_task(&mut self, id: &str) -> bool {
        let mut tasks = self.state.ghost_tasks();
        let Some(task) = tasks.iter_mut().find(|task| task.matches(id)) else {
            return false;
        };
        task.completed = !task.completed;
        self.write_ghost_tasks(&tasks)
    }

    /// Turns a plan item into a real task file and drops it from the plan.
    pub fn promote_ghost_task(&mut self, id: &str) -> Option<PathBuf> {
        let task = self
            .state
            .ghost_tasks()
            .into_iter()
            .find(|task| task.matches(id))?;
        let path = self.create_task(&task.label)?;
        self.remove_ghost_task(&task.id);
        Some(path)
    }

    fn write_ghost_tasks(&self, tasks: &[GhostTask]) -> bool {
        match self.state.save_ghost_tasks(tasks) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=ghost_tasks_save module=task_board status=error error={}",
                    err
                );
                false
            }
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
