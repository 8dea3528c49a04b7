use metro_core::{LayoutDocument, LayoutEvent, LayoutStore, Node, NodeKind, NodeStatus, Position};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

fn count_changes(store: &mut LayoutStore) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let sink = Rc::clone(&count);
    store.subscribe(move |event| {
        if let LayoutEvent::Changed(_) = event {
            sink.set(sink.get() + 1);
        }
    });
    count
}

fn file_node(id: &str, path: &str) -> Node {
    let mut node = Node::new(NodeKind::File, Position::default()).with_file(path);
    node.id = id.to_string();
    node
}

#[test]
fn check_files_flips_status_once_per_transition() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("station.md");
    let target_str = target.to_str().unwrap().to_string();

    let mut store = LayoutStore::open(dir.path());
    store.save(LayoutDocument {
        nodes: vec![file_node("a", &target_str)],
        ..LayoutDocument::default()
    });
    let changes = count_changes(&mut store);

    assert!(store.check_files());
    assert_eq!(changes.get(), 1);
    assert_eq!(
        store.get_layout().node("a").unwrap().status,
        Some(NodeStatus::Missing)
    );

    fs::write(&target, "back").unwrap();
    assert!(store.check_files());
    assert_eq!(changes.get(), 2);
    assert_eq!(
        store.get_layout().node("a").unwrap().status,
        Some(NodeStatus::Active)
    );

    assert!(!store.check_files());
    assert_eq!(changes.get(), 2);
}

#[test]
fn check_files_ignores_non_file_nodes() {
    let dir = TempDir::new().unwrap();
    let mut store = LayoutStore::open(dir.path());
    let mut note = Node::new(NodeKind::Note, Position::default()).with_file("/nowhere/n.md");
    note.id = "n".to_string();
    store.save(LayoutDocument {
        nodes: vec![note],
        ..LayoutDocument::default()
    });

    assert!(!store.check_files());
    assert_eq!(store.get_layout().node("n").unwrap().status, Some(NodeStatus::Active));
}

#[test]
fn load_marks_missing_files() {
    let dir = TempDir::new().unwrap();
    let mut store = LayoutStore::open(dir.path());
    store.save(LayoutDocument {
        nodes: vec![file_node("a", "/definitely/not/here.md")],
        ..LayoutDocument::default()
    });

    let reopened = LayoutStore::open(dir.path());
    assert_eq!(
        reopened.get_layout().node("a").unwrap().status,
        Some(NodeStatus::Missing)
    );
}

#[test]
fn rename_updates_every_matching_node() {
    let dir = TempDir::new().unwrap();
    let mut store = LayoutStore::open(dir.path());
    let mut stale = file_node("b", "/a/old.md");
    stale.status = Some(NodeStatus::Missing);
    store.save(LayoutDocument {
        nodes: vec![
            file_node("a", "/a/old.md"),
            stale,
            file_node("c", "/a/other.md"),
        ],
        ..LayoutDocument::default()
    });
    let changes = count_changes(&mut store);

    assert!(store.handle_file_rename("/a/old.md", "/a/new.md"));
    assert_eq!(changes.get(), 1);

    for id in ["a", "b"] {
        let node = store.get_layout().node(id).unwrap();
        assert_eq!(node.file_path.as_deref(), Some("/a/new.md"));
        assert_eq!(node.label.as_deref(), Some("new.md"));
        assert_eq!(node.status, Some(NodeStatus::Active));
    }
    let untouched = store.get_layout().node("c").unwrap();
    assert_eq!(untouched.file_path.as_deref(), Some("/a/other.md"));

    assert!(!store.handle_file_rename("/a/old.md", "/a/newer.md"));
    assert_eq!(changes.get(), 1);
}

#[test]
fn delete_marks_nodes_missing_without_removing_them() {
    let dir = TempDir::new().unwrap();
    let mut store = LayoutStore::open(dir.path());
    store.save(LayoutDocument {
        nodes: vec![file_node("a", "/a/gone.md"), file_node("b", "/a/gone.md")],
        ..LayoutDocument::default()
    });
    let changes = count_changes(&mut store);

    assert!(store.handle_file_delete("/a/gone.md"));
    assert_eq!(changes.get(), 1);
    assert_eq!(store.get_layout().nodes.len(), 2);
    assert!(store
        .get_layout()
        .nodes
        .iter()
        .all(|node| node.status == Some(NodeStatus::Missing)));

    assert!(!store.handle_file_delete("/a/unrelated.md"));
    assert_eq!(changes.get(), 1);
}
