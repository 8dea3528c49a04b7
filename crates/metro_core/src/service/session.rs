//! Message dispatch between the canvas view, the host and the layout store.
//!
//! # Responsibility
//! - Decode view commands and host events into a closed set of variants.
//! - Apply each one to the owned `LayoutStore`.
//! - Translate store notifications into outbound host effects.
//!
//! # Invariants
//! - Every inbound message yields a (possibly empty) list of effects; a
//!   message that cannot be decoded yields a single `ShowWarning`.
//! - At most one `UpdateLayout` effect is produced per message, and only
//!   for changes made while handling that message. A `saveLayout` command
//!   originates from the view, so it is not echoed.

use crate::model::layout::{LayoutDocument, NodeId, NodeMark, Position};
use crate::service::layout_store::{LayoutEvent, LayoutStore, ListenerId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Vertical distance between stations created from one drop.
pub const DROP_GRID_STEP: f64 = 40.0;

/// Message sent by the canvas view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewCommand {
    SaveLayout {
        layout: LayoutDocument,
    },
    CreateNote {
        position: Position,
    },
    CreateTaskNode {
        name: String,
        position: Position,
    },
    LinkFile {
        file_path: String,
        position: Position,
        #[serde(default)]
        label: Option<String>,
    },
    RenameNode {
        id: NodeId,
        old_path: String,
        new_name: String,
    },
    DeleteNode {
        id: NodeId,
    },
    UpdateNodeColor {
        id: NodeId,
        color: String,
    },
    UpdateNodeMark {
        id: NodeId,
        #[serde(default)]
        mark: Option<NodeMark>,
    },
    ToggleEdge {
        source: NodeId,
        target: NodeId,
    },
    ToggleTaskCompletion {
        file_path: String,
    },
    DropItems {
        position: Position,
        items: Vec<DragItem>,
    },
    OpenFile {
        file_path: String,
    },
    WebviewReady,
}

/// One entry dragged from a side list onto the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub is_ghost: bool,
}

/// Notification raised by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    FilesRenamed { files: Vec<FileRename> },
    FilesDeleted { paths: Vec<String> },
    WorkspaceRootAvailable { root: String },
    ActiveEditorChanged {
        #[serde(default)]
        file_path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRename {
    pub old_path: String,
    pub new_path: String,
}

/// Outbound request to the host or the canvas view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEffect {
    UpdateLayout { layout: LayoutDocument },
    FocusNode { node_id: NodeId },
    OpenFile { file_path: String },
    ShowWarning { message: String },
    ApplyConfig { show_inactive_stations: bool },
}

#[derive(Debug, Default)]
struct Signals {
    changed: bool,
    warnings: Vec<String>,
}

/// Owns the store for one hosting session and routes messages into it.
pub struct MetroSession {
    store: LayoutStore,
    signals: Rc<RefCell<Signals>>,
    listener: ListenerId,
}

impl MetroSession {
    pub fn new(mut store: LayoutStore) -> Self {
        let signals = Rc::new(RefCell::new(Signals::default()));
        let sink = Rc::clone(&signals);
        let listener = store.subscribe(move |event| {
            let mut signals = sink.borrow_mut();
            match event {
                LayoutEvent::Changed(_) => signals.changed = true,
                LayoutEvent::Warning(message) => signals.warnings.push((*message).to_string()),
            }
        });
        Self {
            store,
            signals,
            listener,
        }
    }

    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LayoutStore {
        &mut self.store
    }

    /// Releases the store, detaching the session listener.
    pub fn into_store(mut self) -> LayoutStore {
        self.store.unsubscribe(self.listener);
        self.store
    }

    /// Decodes a raw JSON message and dispatches it.
    ///
    /// Objects carrying a `command` key are view commands; objects carrying
    /// an `event` key are host events.
    pub fn handle_message(&mut self, raw: &str) -> Vec<HostEffect> {
        match decode_message(raw) {
            Ok(Inbound::Command(command)) => self.handle_command(command),
            Ok(Inbound::Event(event)) => self.handle_host_event(event),
            Err(message) => {
                warn!(
                    "event=message_decode module=session status=error error={}",
                    message
                );
                vec![HostEffect::ShowWarning { message }]
            }
        }
    }

    pub fn handle_command(&mut self, command: ViewCommand) -> Vec<HostEffect> {
        self.reset_signals();
        let echo_layout = !matches!(command, ViewCommand::SaveLayout { .. });
        let mut effects = Vec::new();

        match command {
            ViewCommand::SaveLayout { layout } => self.store.save(layout),
            ViewCommand::CreateNote { position } => {
                self.store.create_note(position);
            }
            ViewCommand::CreateTaskNode { name, position } => {
                self.store.create_task_node(&name, position);
            }
            ViewCommand::LinkFile {
                file_path,
                position,
                label,
            } => {
                if self
                    .store
                    .create_node_for_file(&file_path, position, label)
                    .is_none()
                {
                    effects.push(file_not_found(&file_path));
                }
            }
            ViewCommand::RenameNode {
                id,
                old_path,
                new_name,
            } => {
                self.store.rename_file(&id, &old_path, &new_name);
            }
            ViewCommand::DeleteNode { id } => {
                self.store.delete_node(&id);
            }
            ViewCommand::UpdateNodeColor { id, color } => {
                self.store.update_node_color(&id, color);
            }
            ViewCommand::UpdateNodeMark { id, mark } => {
                self.store.update_node_mark(&id, mark);
            }
            ViewCommand::ToggleEdge { source, target } => {
                self.store.toggle_edge(&source, &target);
            }
            ViewCommand::ToggleTaskCompletion { file_path } => {
                self.store.toggle_task_file(&file_path);
            }
            ViewCommand::DropItems { position, items } => {
                self.drop_items(position, &items);
            }
            ViewCommand::OpenFile { file_path } => {
                if Path::new(&file_path).exists() {
                    effects.push(HostEffect::OpenFile { file_path });
                } else {
                    effects.push(file_not_found(&file_path));
                }
            }
            ViewCommand::WebviewReady => {
                effects.push(self.apply_config());
                effects.push(self.update_layout());
                self.signals.borrow_mut().changed = false;
            }
        }

        self.drain_signals(echo_layout, &mut effects);
        effects
    }

    pub fn handle_host_event(&mut self, event: HostEvent) -> Vec<HostEffect> {
        self.reset_signals();
        let mut effects = Vec::new();
        match event {
            HostEvent::FilesRenamed { files } => {
                for file in &files {
                    self.store.handle_file_rename(&file.old_path, &file.new_path);
                }
            }
            HostEvent::FilesDeleted { paths } => {
                for path in &paths {
                    self.store.handle_file_delete(path);
                }
            }
            HostEvent::WorkspaceRootAvailable { root } => {
                self.store.attach_workspace(root);
                effects.push(self.apply_config());
                self.signals.borrow_mut().changed = true;
            }
            HostEvent::ActiveEditorChanged { file_path } => {
                if let Some(node) = file_path
                    .as_deref()
                    .and_then(|path| self.store.node_for_file(path))
                {
                    effects.push(HostEffect::FocusNode {
                        node_id: node.id.clone(),
                    });
                }
            }
        }

        self.drain_signals(true, &mut effects);
        effects
    }

    /// Places dragged side-list items on the canvas, one grid step apart.
    ///
    /// Plan items are promoted to task files first; items that resolve to
    /// no file are skipped.
    fn drop_items(&mut self, position: Position, items: &[DragItem]) {
        for (index, item) in items.iter().enumerate() {
            let at = position.offset(0.0, DROP_GRID_STEP * index as f64);
            let placed = if item.is_ghost {
                match self.store.promote_ghost_task(&item.id) {
                    Some(path) => {
                        let path = path.to_string_lossy().into_owned();
                        self.store.create_node_for_file(&path, at, None)
                    }
                    None => self.store.create_task_node(&item.label, at),
                }
            } else {
                item.file_path
                    .as_deref()
                    .and_then(|path| self.store.create_node_for_file(path, at, None))
            };
            debug!(
                "event=drop_item module=session status={} ghost={}",
                if placed.is_some() { "ok" } else { "skip" },
                item.is_ghost
            );
        }
        info!(
            "event=drop_items module=session status=ok items={}",
            items.len()
        );
    }

    fn apply_config(&self) -> HostEffect {
        HostEffect::ApplyConfig {
            show_inactive_stations: self.store.settings().show_inactive_stations,
        }
    }

    fn update_layout(&self) -> HostEffect {
        HostEffect::UpdateLayout {
            layout: self.store.get_layout().clone(),
        }
    }

    /// Drops notifications raised outside a dispatch, e.g. through `store_mut`.
    fn reset_signals(&mut self) {
        *self.signals.borrow_mut() = Signals::default();
    }

    fn drain_signals(&mut self, echo_layout: bool, effects: &mut Vec<HostEffect>) {
        let (changed, warnings) = {
            let mut signals = self.signals.borrow_mut();
            (
                std::mem::take(&mut signals.changed),
                std::mem::take(&mut signals.warnings),
            )
        };
        effects.extend(
            warnings
                .into_iter()
                .map(|message| HostEffect::ShowWarning { message }),
        );
        if changed && echo_layout {
            effects.push(self.update_layout());
        }
    }
}

enum Inbound {
    Command(ViewCommand),
    Event(HostEvent),
}

fn decode_message(raw: &str) -> Result<Inbound, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| format!("Invalid message: {err}"))?;
    let is_command = value.get("command").is_some();
    let is_event = value.get("event").is_some();
    if is_command {
        serde_json::from_value(value)
            .map(Inbound::Command)
            .map_err(|err| format!("Unsupported command: {err}"))
    } else if is_event {
        serde_json::from_value(value)
            .map(Inbound::Event)
            .map_err(|err| format!("Unsupported event: {err}"))
    } else {
        Err("Invalid message: missing `command` or `event`".to_string())
    }
}

fn file_not_found(file_path: &str) -> HostEffect {
    HostEffect::ShowWarning {
        message: format!("File not found: {file_path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{HostEffect, HostEvent, ViewCommand};
    use crate::model::layout::NodeMark;
    use serde_json::json;

    #[test]
    fn commands_decode_from_camel_case_tags() {
        let command: ViewCommand = serde_json::from_value(json!({
            "command": "renameNode",
            "id": "n1",
            "oldPath": "/w/a.md",
            "newName": "b.md"
        }))
        .unwrap();
        assert_eq!(
            command,
            ViewCommand::RenameNode {
                id: "n1".to_string(),
                old_path: "/w/a.md".to_string(),
                new_name: "b.md".to_string(),
            }
        );

        let command: ViewCommand =
            serde_json::from_value(json!({"command": "updateNodeMark", "id": "n1", "mark": "star"}))
                .unwrap();
        assert_eq!(
            command,
            ViewCommand::UpdateNodeMark {
                id: "n1".to_string(),
                mark: Some(NodeMark::Star),
            }
        );

        let ready: ViewCommand = serde_json::from_value(json!({"command": "webviewReady"})).unwrap();
        assert_eq!(ready, ViewCommand::WebviewReady);
    }

    #[test]
    fn host_events_decode_from_event_tag() {
        let event: HostEvent = serde_json::from_value(json!({
            "event": "filesRenamed",
            "files": [{"oldPath": "/a", "newPath": "/b"}]
        }))
        .unwrap();
        match event {
            HostEvent::FilesRenamed { files } => assert_eq!(files[0].new_path, "/b"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn effects_serialize_with_command_tag() {
        let value = serde_json::to_value(HostEffect::FocusNode {
            node_id: "n1".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"command": "focusNode", "nodeId": "n1"}));

        let value = serde_json::to_value(HostEffect::ApplyConfig {
            show_inactive_stations: false,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"command": "applyConfig", "showInactiveStations": false})
        );
    }
}
