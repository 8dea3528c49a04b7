//! Layout store: sole owner of the in-memory metro map.
//!
//! # Responsibility
//! - Load and persist `metro-layout.json` for the attached workspace.
//! - Apply every graph mutation and flush it to disk synchronously.
//! - Notify subscribers after each persisted change.
//!
//! # Invariants
//! - Public operations never return errors; failures are logged and reported
//!   through a sentinel (`None`/`false`) or a `LayoutEvent::Warning`.
//! - `save()` diffs task completion against the previous document before it
//!   is replaced.
//! - `viewport`/`zoomLocked` missing from an incoming save are carried
//!   forward from the previous document.
//! - Without a workspace root, file-creating operations are silent no-ops.

use crate::config::{MetroSettings, WorkspacePaths};
use crate::db::open_db;
use crate::model::layout::{
    Edge, LayoutDocument, Node, NodeId, NodeKind, NodeMark, NodeStatus, Position,
};
use crate::model::task::is_checked;
use crate::repo::state_repo::{
    MemoryStateRepository, RepoError, SqliteWorkspaceStateRepository, WorkspaceStateRepository,
};
use crate::service::task_sync::completion_changes;
use crate::service::workspace_state::WorkspaceState;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::Rng;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Display colors handed out to new notes.
pub const METRO_COLORS: [&str; 7] = [
    "#e3002c", "#007fd4", "#008000", "#f3a900", "#800080", "#ff7f00", "#a0a0a0",
];
pub const NOTE_TEMPLATE: &str = "# New Note\n";
const NOTE_FILE_PREFIX: &str = "Note_";
const MAX_NAME_ATTEMPTS: usize = 100;

/// Errors raised inside store operations before they are logged.
#[derive(Debug)]
pub enum StoreError {
    /// No workspace root is attached.
    NoWorkspace,
    /// Target node does not exist.
    NodeNotFound(NodeId),
    /// Task name is blank after file name normalization.
    InvalidTaskName(String),
    /// Rename target is not a plain file name.
    InvalidFileName(String),
    /// Rename target already exists and would be replaced.
    TargetExists(PathBuf),
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    Json(serde_json::Error),
    Repo(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWorkspace => write!(f, "no workspace root is available"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::InvalidTaskName(name) => write!(f, "invalid task name: `{name}`"),
            Self::InvalidFileName(name) => write!(f, "invalid file name: `{name}`"),
            Self::TargetExists(path) => write!(f, "target already exists: {}", path.display()),
            Self::Io { op, path, source } => {
                write!(f, "{op} failed for {}: {source}", path.display())
            }
            Self::Json(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn io_error(op: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { op, path, source }
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, Copy)]
pub enum LayoutEvent<'a> {
    /// The document was replaced or mutated and flushed.
    Changed(&'a LayoutDocument),
    /// A user-initiated operation failed; the document is unchanged.
    Warning(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&LayoutEvent<'_>)>;

/// Owner of the metro map for one hosting session.
pub struct LayoutStore {
    pub(super) paths: Option<WorkspacePaths>,
    pub(super) settings: MetroSettings,
    pub(super) layout: LayoutDocument,
    pub(super) state: WorkspaceState,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl Default for LayoutStore {
    fn default() -> Self {
        Self::detached()
    }
}

impl LayoutStore {
    /// Creates a store with no workspace; file operations are no-ops.
    pub fn detached() -> Self {
        Self {
            paths: None,
            settings: MetroSettings::default(),
            layout: LayoutDocument::default(),
            state: WorkspaceState::detached(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Creates a store attached to `root` and loads its layout.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let mut store = Self::detached();
        store.attach_workspace(root);
        store
    }

    /// Like `open`, with a caller-provided side store.
    pub fn open_with_state(
        root: impl Into<PathBuf>,
        repo: Box<dyn WorkspaceStateRepository>,
    ) -> Self {
        let mut store = Self::detached();
        let paths = WorkspacePaths::for_root(root);
        prepare_layout_dir(&paths);
        store.attach(paths, repo);
        store
    }

    /// Handles a workspace root becoming available.
    ///
    /// Replaces any previously attached workspace, including its in-memory
    /// document, then loads the new one.
    pub fn attach_workspace(&mut self, root: impl Into<PathBuf>) {
        let paths = WorkspacePaths::for_root(root);
        prepare_layout_dir(&paths);
        let repo = open_state_repository(&paths);
        self.attach(paths, repo);
    }

    fn attach(&mut self, paths: WorkspacePaths, repo: Box<dyn WorkspaceStateRepository>) {
        info!(
            "event=workspace_attach module=layout_store status=ok layout_path={}",
            paths.layout_file.display()
        );
        self.settings = MetroSettings::load(&paths);
        self.state = WorkspaceState::load(repo);
        self.layout = LayoutDocument::default();
        self.paths = Some(paths);
        self.load();
    }

    pub fn workspace(&self) -> Option<&WorkspacePaths> {
        self.paths.as_ref()
    }

    pub fn settings(&self) -> MetroSettings {
        self.settings
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    /// Current document. Mutate only through store operations.
    pub fn get_layout(&self) -> &LayoutDocument {
        &self.layout
    }

    /// First node bound to `path`.
    pub fn node_for_file(&self, path: &str) -> Option<&Node> {
        self.layout.node_for_file(path)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&LayoutEvent<'_>) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Reloads the document from disk.
    ///
    /// A missing file keeps the current document; an unreadable or corrupt
    /// one is logged and the last good document is kept. A successful load
    /// is followed by a file existence check.
    pub fn load(&mut self) -> &LayoutDocument {
        let Some(layout_file) = self.paths.as_ref().map(|paths| paths.layout_file.clone()) else {
            return &self.layout;
        };

        match read_layout_file(&layout_file) {
            Ok(Some(mut doc)) => {
                let report = doc.sanitize();
                if !report.is_clean() {
                    warn!(
                        "event=layout_load module=layout_store status=sanitized duplicate_nodes={} dropped_edges={}",
                        report.duplicate_nodes, report.dropped_edges
                    );
                }
                info!(
                    "event=layout_load module=layout_store status=ok nodes={} edges={}",
                    doc.nodes.len(),
                    doc.edges.len()
                );
                self.layout = doc;
                self.check_files();
            }
            Ok(None) => {
                debug!(
                    "event=layout_load module=layout_store status=skip reason=missing_file path={}",
                    layout_file.display()
                );
            }
            Err(err) => {
                error!(
                    "event=layout_load module=layout_store status=error path={} error={}",
                    layout_file.display(),
                    err
                );
            }
        }
        &self.layout
    }

    /// Replaces the document with `incoming` and persists it.
    ///
    /// Task nodes whose `completed` flag differs from the previous document
    /// have their file marker and completion timestamp updated before the
    /// single write.
    pub fn save(&mut self, mut incoming: LayoutDocument) {
        incoming.merge_view_state(&self.layout);
        let report = incoming.sanitize();
        if !report.is_clean() {
            warn!(
                "event=layout_save module=layout_store status=sanitized duplicate_nodes={} dropped_edges={}",
                report.duplicate_nodes, report.dropped_edges
            );
        }

        let changes = completion_changes(&self.layout, &incoming);
        self.layout = incoming;
        for change in &changes {
            self.apply_task_completion(
                &change.file_path,
                change.completed,
                Some(change.node_id.as_str()),
            );
        }
        self.commit();
    }

    /// Creates a note file under the note directory and a `note` node for it.
    pub fn create_note(&mut self, position: Position) -> Option<Node> {
        match self.try_create_note(position) {
            Ok(node) => Some(node),
            Err(StoreError::NoWorkspace) => {
                debug!("event=note_create module=layout_store status=skip reason=no_workspace");
                None
            }
            Err(err) => {
                warn!(
                    "event=note_create module=layout_store status=error error={}",
                    err
                );
                None
            }
        }
    }

    fn try_create_note(&mut self, position: Position) -> StoreResult<Node> {
        let note_dir = self
            .paths
            .as_ref()
            .ok_or(StoreError::NoWorkspace)?
            .note_dir
            .clone();
        fs::create_dir_all(&note_dir).map_err(io_error("mkdir", &note_dir))?;

        let stem = note_file_stem(Utc::now());
        let file_path = create_unique_file(&note_dir, &stem, "md", NOTE_TEMPLATE)?;
        let file_name = file_name_of(&file_path);

        let mut node = Node::new(NodeKind::Note, position)
            .with_file(path_string(&file_path))
            .with_label(file_name);
        node.color = Some(random_metro_color().to_string());

        info!(
            "event=note_create module=layout_store status=ok node_id={}",
            node.id
        );
        self.layout.nodes.push(node.clone());
        self.commit();
        Ok(node)
    }

    /// Links an existing file into the graph.
    ///
    /// Files under the task directory become `task`-marked stations whose
    /// completion is read from the file content.
    pub fn create_node_for_file(
        &mut self,
        file_path: &str,
        position: Position,
        label: Option<String>,
    ) -> Option<Node> {
        let path = Path::new(file_path);
        if !path.exists() {
            debug!(
                "event=node_link module=layout_store status=skip reason=missing_file path={}",
                file_path
            );
            return None;
        }

        let node = self.file_node(path, position, label);
        info!(
            "event=node_link module=layout_store status=ok node_id={} task={}",
            node.id,
            node.is_task()
        );
        self.layout.nodes.push(node.clone());
        self.commit();
        Some(node)
    }

    /// Builds an active `file` node; task detection is by path convention.
    pub(super) fn file_node(&self, path: &Path, position: Position, label: Option<String>) -> Node {
        let file_path = path_string(path);
        let label = label.unwrap_or_else(|| file_name_of(path));
        let mut node = Node::new(NodeKind::File, position)
            .with_file(file_path.as_str())
            .with_label(label);

        let is_task = self
            .paths
            .as_ref()
            .is_some_and(|paths| paths.is_task_path(path));
        if is_task {
            let completed = read_checked(path);
            node.mark = Some(NodeMark::Task);
            node.completed = Some(completed);
            node.completed_at = completed
                .then(|| self.state.completed_at(&file_path))
                .flatten();
        }
        node
    }

    /// Renames the node's backing file, then rebinds the node.
    ///
    /// On failure a warning is emitted and the node is left untouched.
    pub fn rename_file(&mut self, node_id: &str, old_path: &str, new_name: &str) -> bool {
        let new_path = match self.try_rename_file(old_path, new_name) {
            Ok(new_path) => new_path,
            Err(err) => {
                warn!(
                    "event=file_rename module=layout_store status=error node_id={} error={}",
                    node_id, err
                );
                self.emit_warning(&format!("Failed to rename file: {err}"));
                return false;
            }
        };

        let new_path = path_string(&new_path);
        if let Err(err) = self.state.rekey_completion(old_path, &new_path) {
            warn!(
                "event=file_rename module=layout_store status=error stage=state error={}",
                err
            );
        }
        match self.layout.node_mut(node_id) {
            Some(node) => {
                node.file_path = Some(new_path);
                node.label = Some(new_name.to_string());
                node.status = Some(NodeStatus::Active);
            }
            None => warn!(
                "event=file_rename module=layout_store status=error error={}",
                StoreError::NodeNotFound(node_id.to_string())
            ),
        }
        info!(
            "event=file_rename module=layout_store status=ok node_id={}",
            node_id
        );
        self.commit();
        true
    }

    fn try_rename_file(&self, old_path: &str, new_name: &str) -> StoreResult<PathBuf> {
        let mut components = Path::new(new_name).components();
        let is_plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_plain_name || new_name.trim() != new_name {
            return Err(StoreError::InvalidFileName(new_name.to_string()));
        }
        let old = Path::new(old_path);
        let new_path = old
            .parent()
            .map(|dir| dir.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        if new_path != old && fs::symlink_metadata(&new_path).is_ok() {
            return Err(StoreError::TargetExists(new_path));
        }
        fs::rename(old, &new_path).map_err(io_error("rename", old))?;
        Ok(new_path)
    }

    /// Removes a node and every edge touching it in one save.
    pub fn delete_node(&mut self, node_id: &str) -> bool {
        match self.layout.remove_node(node_id) {
            Some(edges_removed) => {
                info!(
                    "event=node_delete module=layout_store status=ok node_id={} edges_removed={}",
                    node_id, edges_removed
                );
                self.commit();
                true
            }
            None => {
                debug!(
                    "event=node_delete module=layout_store status=skip reason=not_found node_id={}",
                    node_id
                );
                false
            }
        }
    }

    pub fn update_node_color(&mut self, node_id: &str, color: impl Into<String>) -> bool {
        let Some(node) = self.layout.node_mut(node_id) else {
            return false;
        };
        node.color = Some(color.into());
        self.commit();
        true
    }

    /// Sets or clears a node mark.
    ///
    /// Marking as `task` reads completion from the backing file; any other
    /// mark clears the completion fields.
    pub fn update_node_mark(&mut self, node_id: &str, mark: Option<NodeMark>) -> bool {
        let Some(file_path) = self.layout.node(node_id).map(|node| node.file_path.clone()) else {
            return false;
        };

        let (completed, completed_at) = if mark == Some(NodeMark::Task) {
            let completed = file_path
                .as_deref()
                .is_some_and(|path| read_checked(Path::new(path)));
            let completed_at = file_path
                .as_deref()
                .filter(|_| completed)
                .and_then(|path| self.state.completed_at(path));
            (Some(completed), completed_at)
        } else {
            (None, None)
        };

        if let Some(node) = self.layout.node_mut(node_id) {
            node.mark = mark;
            node.completed = completed;
            node.completed_at = completed_at;
        }
        self.commit();
        true
    }

    /// Removes the line between `a` and `b` if present, otherwise adds one.
    pub fn toggle_edge(&mut self, a: &str, b: &str) -> bool {
        if a == b || self.layout.node(a).is_none() || self.layout.node(b).is_none() {
            debug!(
                "event=edge_toggle module=layout_store status=skip source={} target={}",
                a, b
            );
            return false;
        }

        let before = self.layout.edges.len();
        self.layout.edges.retain(|edge| !edge.connects(a, b));
        if self.layout.edges.len() == before {
            self.layout.edges.push(Edge::new(a, b));
        }
        self.commit();
        true
    }

    /// Flushes the document and notifies subscribers.
    pub(super) fn commit(&mut self) {
        if let Err(err) = self.write_layout() {
            error!(
                "event=layout_save module=layout_store status=error error={}",
                err
            );
        }
        self.emit_changed();
    }

    fn write_layout(&self) -> StoreResult<()> {
        let Some(paths) = self.paths.as_ref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.layout)?;
        fs::write(&paths.layout_file, json).map_err(io_error("write", &paths.layout_file))?;
        debug!(
            "event=layout_save module=layout_store status=ok nodes={} edges={}",
            self.layout.nodes.len(),
            self.layout.edges.len()
        );
        Ok(())
    }

    fn emit_changed(&mut self) {
        let event = LayoutEvent::Changed(&self.layout);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub(super) fn emit_warning(&mut self, message: &str) {
        let event = LayoutEvent::Warning(message);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

fn prepare_layout_dir(paths: &WorkspacePaths) {
    if let Err(err) = fs::create_dir_all(&paths.layout_dir) {
        warn!(
            "event=workspace_attach module=layout_store status=error path={} error={}",
            paths.layout_dir.display(),
            err
        );
    }
}

fn open_state_repository(paths: &WorkspacePaths) -> Box<dyn WorkspaceStateRepository> {
    let opened = open_db(&paths.state_db)
        .map_err(RepoError::from)
        .and_then(SqliteWorkspaceStateRepository::try_new);
    match opened {
        Ok(repo) => Box::new(repo),
        Err(err) => {
            warn!(
                "event=state_open module=layout_store status=error fallback=memory path={} error={}",
                paths.state_db.display(),
                err
            );
            Box::new(MemoryStateRepository::default())
        }
    }
}

fn read_layout_file(path: &Path) -> StoreResult<Option<LayoutDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error("read", path)(err)),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Whether the file at `path` carries a checked marker; unreadable is unchecked.
pub(super) fn read_checked(path: &Path) -> bool {
    fs::read_to_string(path).is_ok_and(|content| is_checked(&content))
}

pub(super) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_string(path))
}

/// `Note_<ISO-8601 with ':' and '.' replaced by '-'>`.
fn note_file_stem(now: DateTime<Utc>) -> String {
    format!(
        "{NOTE_FILE_PREFIX}{}",
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

fn random_metro_color() -> &'static str {
    METRO_COLORS[rand::rng().random_range(0..METRO_COLORS.len())]
}

/// Writes `content` to `<dir>/<stem>.<ext>`, adding `_<n>` on collisions.
fn create_unique_file(dir: &Path, stem: &str, ext: &str, content: &str) -> StoreResult<PathBuf> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = if attempt == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{attempt}.{ext}")
        };
        let path = dir.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content.as_bytes())
                    .map_err(io_error("write", &path))?;
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(io_error("create", &path)(err)),
        }
    }
    Err(StoreError::Io {
        op: "create",
        path: dir.join(format!("{stem}.{ext}")),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
    })
}

#[cfg(test)]
mod tests {
    use super::{create_unique_file, note_file_stem, random_metro_color, METRO_COLORS};
    use chrono::{TimeZone, Utc};

    #[test]
    fn note_stem_replaces_time_separators() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(note_file_stem(at), "Note_2026-01-02T03-04-05-000Z");
    }

    #[test]
    fn random_color_comes_from_palette() {
        for _ in 0..20 {
            assert!(METRO_COLORS.contains(&random_metro_color()));
        }
    }

    #[test]
    fn unique_file_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_unique_file(dir.path(), "n", "md", "one").unwrap();
        let second = create_unique_file(dir.path(), "n", "md", "two").unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(first).unwrap(), "one");
        assert!(second.ends_with("n_1.md"));
    }
}
