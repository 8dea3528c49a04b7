//! Layout document model.
//!
//! # Responsibility
//! - Mirror the on-disk `metro-layout.json` schema with serde.
//! - Provide document-level hygiene used by load and save paths.
//!
//! # Invariants
//! - `nodes` and `edges` keep insertion order on serialization.
//! - `viewport` and `zoomLocked` are omitted from JSON when unset.
//! - Whole-number coordinates serialize without a fraction, so an unmodified
//!   document written by another tool round-trips unchanged.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Opaque node identifier.
pub type NodeId = String;

/// Canvas coordinate pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(serialize_with = "serialize_coord")]
    pub x: f64,
    #[serde(serialize_with = "serialize_coord")]
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this position shifted by `dx`/`dy`.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Camera state of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(serialize_with = "serialize_coord")]
    pub x: f64,
    #[serde(serialize_with = "serialize_coord")]
    pub y: f64,
    #[serde(serialize_with = "serialize_coord")]
    pub zoom: f64,
}

/// Node category. Core only distinguishes `file` and `note`; the richer
/// canvas variants are carried through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Note,
    Shape,
    Text,
    Sticky,
    #[serde(untagged)]
    Other(String),
}

/// Last known existence of the node's backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Missing,
}

impl NodeStatus {
    pub fn from_exists(exists: bool) -> Self {
        if exists {
            Self::Active
        } else {
            Self::Missing
        }
    }
}

/// Semantic tag attached to a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMark {
    None,
    Default,
    Check,
    Star,
    Coordinate,
    /// Backed by a checkbox-bearing task file.
    Task,
}

/// One station on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    /// Serialized as `type` to match the canvas schema.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Absolute path of the backing file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<NodeMark>,
    /// Meaningful only when `mark == Some(NodeMark::Task)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Epoch milliseconds, sourced from the workspace state store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Canvas-only fields (`parentId`, sizes, styles) preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// Creates an active node with a freshly generated id.
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            file_path: None,
            position,
            label: None,
            status: Some(NodeStatus::Active),
            color: None,
            mark: None,
            completed: None,
            completed_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_task(&self) -> bool {
        self.mark == Some(NodeMark::Task)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }

    /// Exact path equality; no normalization.
    pub fn is_bound_to(&self, path: &str) -> bool {
        self.file_path.as_deref() == Some(path)
    }
}

/// Line between two stations. Direction carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            label: None,
            extra: Map::new(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// True for `a-b` and `b-a`.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// Visual container. Core never mutates groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, serialize_with = "serialize_coord")]
    pub width: f64,
    #[serde(default, serialize_with = "serialize_coord")]
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted root of the metro map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_locked: Option<bool>,
}

/// What `LayoutDocument::sanitize` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub duplicate_nodes: usize,
    pub dropped_edges: usize,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_nodes == 0 && self.dropped_edges == 0
    }
}

impl LayoutDocument {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == node_id)
    }

    /// First node bound to `path`.
    pub fn node_for_file(&self, path: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.is_bound_to(path))
    }

    /// Carries `viewport` and `zoomLocked` forward from `previous` when this
    /// document omits them. All other fields are taken as-is.
    pub fn merge_view_state(&mut self, previous: &LayoutDocument) {
        if self.viewport.is_none() {
            self.viewport = previous.viewport;
        }
        if self.zoom_locked.is_none() {
            self.zoom_locked = previous.zoom_locked;
        }
    }

    /// Removes a node and every edge touching it.
    ///
    /// Returns the number of edges removed, or `None` if the node is unknown.
    pub fn remove_node(&mut self, node_id: &str) -> Option<usize> {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != node_id);
        if self.nodes.len() == before {
            return None;
        }
        let edges_before = self.edges.len();
        self.edges.retain(|edge| !edge.touches(node_id));
        Some(edges_before - self.edges.len())
    }

    /// Drops duplicate node ids (first wins), then edges that are self-loops
    /// or reference an unknown node.
    pub fn sanitize(&mut self) -> SanitizeReport {
        let mut seen = HashSet::new();
        let nodes_before = self.nodes.len();
        self.nodes.retain(|node| seen.insert(node.id.clone()));

        let edges_before = self.edges.len();
        self.edges.retain(|edge| {
            edge.source != edge.target && seen.contains(&edge.source) && seen.contains(&edge.target)
        });

        SanitizeReport {
            duplicate_nodes: nodes_before - self.nodes.len(),
            dropped_edges: edges_before - self.edges.len(),
        }
    }
}

fn serialize_coord<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    // JSON written by the canvas uses plain integers for snapped coordinates.
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, LayoutDocument, Node, NodeKind, NodeMark, NodeStatus, Position, Viewport};

    const CANVAS_JSON: &str = r##"{
  "nodes": [
    {
      "id": "a",
      "type": "file",
      "filePath": "/w/a.md",
      "position": { "x": 40, "y": 80.5 },
      "label": "a.md",
      "status": "active",
      "mark": "task",
      "completed": false,
      "parentId": "g1"
    },
    { "id": "b", "type": "sticky", "position": { "x": 0, "y": 0 } },
    { "id": "c", "type": "station", "position": { "x": 0, "y": 0 } }
  ],
  "groups": [],
  "edges": [{ "id": "e1", "source": "a", "target": "b", "style": { "stroke": "#e3002c" } }],
  "zoomLocked": true
}"##;

    #[test]
    fn canvas_document_keeps_unknown_fields_and_integer_coordinates() {
        let doc: LayoutDocument = serde_json::from_str(CANVAS_JSON).unwrap();
        assert_eq!(doc.nodes[0].kind, NodeKind::File);
        assert_eq!(doc.nodes[0].mark, Some(NodeMark::Task));
        assert_eq!(doc.nodes[0].status, Some(NodeStatus::Active));
        assert_eq!(doc.nodes[1].kind, NodeKind::Sticky);
        assert_eq!(doc.nodes[2].kind, NodeKind::Other("station".to_string()));
        assert_eq!(doc.zoom_locked, Some(true));
        assert!(doc.viewport.is_none());

        let written = serde_json::to_value(&doc).unwrap();
        let original: serde_json::Value = serde_json::from_str(CANVAS_JSON).unwrap();
        assert_eq!(written, original);
        assert!(serde_json::to_string(&doc).unwrap().contains(r#""x":40,"#));
    }

    #[test]
    fn merge_view_state_only_fills_missing_fields() {
        let previous = LayoutDocument {
            viewport: Some(Viewport {
                x: 1.0,
                y: 2.0,
                zoom: 1.5,
            }),
            zoom_locked: Some(true),
            ..LayoutDocument::default()
        };

        let mut incoming = LayoutDocument {
            zoom_locked: Some(false),
            ..LayoutDocument::default()
        };
        incoming.merge_view_state(&previous);

        assert_eq!(incoming.viewport, previous.viewport);
        assert_eq!(incoming.zoom_locked, Some(false));
    }

    #[test]
    fn sanitize_drops_duplicates_dangling_edges_and_self_loops() {
        let a = Node::new(NodeKind::File, Position::default());
        let b = Node::new(NodeKind::Note, Position::default());
        let mut duplicate = b.clone();
        duplicate.label = Some("shadow".to_string());

        let mut doc = LayoutDocument {
            nodes: vec![a.clone(), b.clone(), duplicate],
            edges: vec![
                Edge::new(a.id.clone(), b.id.clone()),
                Edge::new(a.id.clone(), "ghost"),
                Edge::new(b.id.clone(), b.id.clone()),
            ],
            ..LayoutDocument::default()
        };

        let report = doc.sanitize();
        assert_eq!(report.duplicate_nodes, 1);
        assert_eq!(report.dropped_edges, 2);
        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes[1].label.is_none());
        assert_eq!(doc.edges.len(), 1);
    }

    #[test]
    fn edges_are_undirected_for_matching() {
        let edge = Edge::new("a", "b");
        assert!(edge.connects("b", "a"));
        assert!(edge.touches("b"));
        assert!(!edge.connects("a", "c"));
    }
}
