//! Filesystem reconciliation for file-backed stations.
//!
//! Matching is by exact path string, the form in which the host reports
//! rename and delete events. Each operation saves at most once and only
//! when at least one node changed.

use crate::model::layout::{NodeKind, NodeStatus};
use crate::service::layout_store::LayoutStore;
use log::{info, warn};
use std::path::Path;

impl LayoutStore {
    /// Re-checks existence of every `file` node and flips `status` where it
    /// drifted. Returns whether anything changed.
    pub fn check_files(&mut self) -> bool {
        let mut flipped = 0usize;
        for node in self
            .layout
            .nodes
            .iter_mut()
            .filter(|node| node.kind == NodeKind::File)
        {
            let exists = node
                .file_path
                .as_deref()
                .is_some_and(|path| Path::new(path).exists());
            let status = NodeStatus::from_exists(exists);
            if node.status != Some(status) {
                node.status = Some(status);
                flipped += 1;
            }
        }

        if flipped == 0 {
            return false;
        }
        info!(
            "event=check_files module=reconciler status=ok flipped={}",
            flipped
        );
        self.commit();
        true
    }

    /// Rebinds every node pointing at `old_path` to `new_path`.
    pub fn handle_file_rename(&mut self, old_path: &str, new_path: &str) -> bool {
        let label = Path::new(new_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| new_path.to_string());

        let mut matched = 0usize;
        for node in self
            .layout
            .nodes
            .iter_mut()
            .filter(|node| node.is_bound_to(old_path))
        {
            node.file_path = Some(new_path.to_string());
            node.label = Some(label.clone());
            node.status = Some(NodeStatus::Active);
            matched += 1;
        }

        if matched == 0 {
            return false;
        }
        if let Err(err) = self.state.rekey_completion(old_path, new_path) {
            warn!(
                "event=file_renamed module=reconciler status=error stage=state error={}",
                err
            );
        }
        info!(
            "event=file_renamed module=reconciler status=ok nodes={}",
            matched
        );
        self.commit();
        true
    }

    /// Marks every node pointing at `file_path` as missing. Nodes are kept.
    pub fn handle_file_delete(&mut self, file_path: &str) -> bool {
        let mut matched = 0usize;
        for node in self
            .layout
            .nodes
            .iter_mut()
            .filter(|node| node.is_bound_to(file_path))
        {
            node.status = Some(NodeStatus::Missing);
            matched += 1;
        }

        if matched == 0 {
            return false;
        }
        info!(
            "event=file_deleted module=reconciler status=ok nodes={}",
            matched
        );
        self.commit();
        true
    }
}
