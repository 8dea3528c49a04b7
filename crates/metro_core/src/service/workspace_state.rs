//! Cached view over the workspace state repository.
//!
//! # Responsibility
//! - Hold the task completion timestamp map in memory.
//! - Persist the whole map on every change.
//! - Store the plan list of task ideas that have no file yet.
//!
//! # Invariants
//! - The map key is the task file path exactly as bound on the node.
//! - A read failure at load time leaves the map empty instead of failing.
//! - The cached map always equals the last successfully written map.

use crate::repo::state_repo::{
    read_state, write_state, MemoryStateRepository, RepoResult, WorkspaceStateRepository,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COMPLETION_TIMES_KEY: &str = "metro.taskCompletionTimes";
pub const GHOST_TASKS_KEY: &str = "metro.ghostTasks";

/// Plan list entry: a task idea that does not have a backing file yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostTask {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub completed: bool,
}

impl GhostTask {
    /// Accepts both the stored id and the `ghost-` prefixed list item id.
    pub fn matches(&self, id: &str) -> bool {
        self.id == id || id.strip_prefix("ghost-") == Some(self.id.as_str())
    }
}

pub struct WorkspaceState {
    repo: Box<dyn WorkspaceStateRepository>,
    completion_times: BTreeMap<String, i64>,
}

impl WorkspaceState {
    /// Loads the completion map from `repo`.
    pub fn load(repo: Box<dyn WorkspaceStateRepository>) -> Self {
        let completion_times = match read_state::<BTreeMap<String, i64>>(
            repo.as_ref(),
            COMPLETION_TIMES_KEY,
        ) {
            Ok(times) => times.unwrap_or_default(),
            Err(err) => {
                error!(
                    "event=state_load module=workspace_state status=error key={} error={}",
                    COMPLETION_TIMES_KEY, err
                );
                BTreeMap::new()
            }
        };
        info!(
            "event=state_load module=workspace_state status=ok completion_entries={}",
            completion_times.len()
        );
        Self {
            repo,
            completion_times,
        }
    }

    /// State that is not backed by any workspace.
    pub fn detached() -> Self {
        Self {
            repo: Box::new(MemoryStateRepository::default()),
            completion_times: BTreeMap::new(),
        }
    }

    pub fn completed_at(&self, path: &str) -> Option<i64> {
        self.completion_times.get(path).copied()
    }

    pub fn completion_times(&self) -> &BTreeMap<String, i64> {
        &self.completion_times
    }

    pub fn record_completion(&mut self, path: &str, completed_at: i64) -> RepoResult<()> {
        let mut next = self.completion_times.clone();
        next.insert(path.to_string(), completed_at);
        self.commit_completion_times(next)
    }

    /// Removes the entry for `path`; returns whether one existed.
    pub fn clear_completion(&mut self, path: &str) -> RepoResult<bool> {
        let mut next = self.completion_times.clone();
        if next.remove(path).is_none() {
            return Ok(false);
        }
        self.commit_completion_times(next)?;
        Ok(true)
    }

    /// Moves the entry for `old_path` to `new_path`.
    pub fn rekey_completion(&mut self, old_path: &str, new_path: &str) -> RepoResult<bool> {
        let mut next = self.completion_times.clone();
        let Some(completed_at) = next.remove(old_path) else {
            return Ok(false);
        };
        next.insert(new_path.to_string(), completed_at);
        self.commit_completion_times(next)?;
        Ok(true)
    }

    /// Current plan list; unreadable state reads as empty.
    pub fn ghost_tasks(&self) -> Vec<GhostTask> {
        match read_state::<Vec<GhostTask>>(self.repo.as_ref(), GHOST_TASKS_KEY) {
            Ok(tasks) => tasks.unwrap_or_default(),
            Err(err) => {
                error!(
                    "event=state_load module=workspace_state status=error key={} error={}",
                    GHOST_TASKS_KEY, err
                );
                Vec::new()
            }
        }
    }

    pub fn save_ghost_tasks(&self, tasks: &[GhostTask]) -> RepoResult<()> {
        write_state(self.repo.as_ref(), GHOST_TASKS_KEY, tasks)
    }

    /// The cache only takes `next` once the repository accepted it.
    fn commit_completion_times(&mut self, next: BTreeMap<String, i64>) -> RepoResult<()> {
        write_state(self.repo.as_ref(), COMPLETION_TIMES_KEY, &next)?;
        self.completion_times = next;
        Ok(())
    }
}
