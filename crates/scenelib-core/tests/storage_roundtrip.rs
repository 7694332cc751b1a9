use scenelib_core::config::StoreConfig;
use scenelib_core::graph::EntityGraph;
use scenelib_core::kind::{EntityKind, Id, TargetRef};
use scenelib_core::model::*;
use scenelib_core::ops;
use scenelib_core::storage;
use std::fs;
use tempfile::TempDir;

fn make_tag(id: Id, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
        phrase: Some(format!("{} things", name)),
    }
}

fn build_graph() -> EntityGraph {
    let mut graph = EntityGraph::new();
    graph.tags.set(make_tag(1, "Cute")).unwrap();
    graph
        .library
        .set(LibrarySource {
            id: 1,
            url: "https://x".into(),
            tags: vec![1],
            ..LibrarySource::default()
        })
        .unwrap();
    graph
        .scenes
        .set(Scene {
            id: 1,
            name: "Intro".into(),
            sources: vec![1],
            overlays: vec![1],
            ..Scene::default()
        })
        .unwrap();
    graph
        .grids
        .set(SceneGrid {
            id: 1,
            name: "Wall".into(),
            grid: vec![vec![GridCell {
                scene: Some(1),
                mirror: true,
            }]],
        })
        .unwrap();
    graph
        .overlays
        .set(Overlay {
            id: 1,
            target: Some(TargetRef::Grid(1)),
            opacity: 70,
        })
        .unwrap();
    graph
}

#[test]
fn test_save_and_load_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let graph = build_graph();

    storage::save(root, &graph, true).unwrap();
    assert!(storage::project_exists(root));

    let loaded = storage::load(root).unwrap();
    assert_eq!(loaded, graph);
    assert_eq!(
        loaded.overlays.get(1).unwrap().target,
        Some(TargetRef::Grid(1))
    );
}

#[test]
fn test_deleted_ids_survive_reload() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let mut graph = build_graph();
    graph.tags.set(make_tag(2, "Funny")).unwrap();
    graph.tags.delete(2).unwrap();

    storage::save(root, &graph, false).unwrap();
    let mut loaded = storage::load(root).unwrap();
    assert_eq!(loaded.tags.next_id(), 3);
    assert_eq!(loaded.tags.insert_new(make_tag(0, "New")).unwrap(), 3);
}

#[test]
fn test_project_exists_false() {
    let tmp = TempDir::new().unwrap();
    assert!(!storage::project_exists(tmp.path()));
    assert!(storage::load(tmp.path()).is_err());
}

#[test]
fn test_load_repairs_stale_allocator() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(storage::project_dir(root)).unwrap();
    fs::write(
        storage::project_file(root),
        r#"{"tags":{"rows":{"5":{"id":5,"name":"Cute"}},"nextId":1}}"#,
    )
    .unwrap();

    let graph = storage::load(root).unwrap();
    assert_eq!(graph.next_id(EntityKind::Tag), 6);
    assert_eq!(graph.next_id(EntityKind::Scene), 1);
}

#[test]
fn test_load_rejects_dangling_reference() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(storage::project_dir(root)).unwrap();
    fs::write(
        storage::project_file(root),
        r#"{"library":{"rows":{"1":{"id":1,"url":"https://x","tags":[3]}},"nextId":2}}"#,
    )
    .unwrap();

    let err = storage::load(root).unwrap_err();
    assert!(format!("{:#}", err).contains("references missing tag 3"));
}

#[test]
fn test_load_rejects_malformed_json() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(storage::project_dir(root)).unwrap();
    fs::write(storage::project_file(root), "{ not json").unwrap();
    assert!(storage::load(root).is_err());
}

#[test]
fn test_document_file_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("exports").join("intro.json");
    let graph = build_graph();
    let config = StoreConfig::default();
    let doc = ops::export_scene(&graph, 1, &config).unwrap();

    storage::write_document(&path, &doc, config.storage.pretty).unwrap();
    let read = storage::read_document(&path).unwrap();
    assert_eq!(read, doc);

    let (restored, _) = ops::restore_backup(&read, &config).unwrap();
    assert_eq!(restored.scenes.get(1).unwrap(), graph.scenes.get(1).unwrap());
}

#[test]
fn test_document_uses_camel_case() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("lib.json");
    let graph = build_graph();
    let config = StoreConfig::default();
    let doc = ops::export_library(&graph, &config).unwrap();
    storage::write_document(&path, &doc, false).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"exportedAt\""));
    assert!(text.contains("\"library\""));
    assert!(!text.contains("disabledClips"));
}

#[test]
fn test_save_replaces_project_without_leftovers() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    storage::save(root, &EntityGraph::new(), false).unwrap();
    storage::save(root, &build_graph(), false).unwrap();

    let loaded = storage::load(root).unwrap();
    assert_eq!(loaded, build_graph());
    let names: Vec<_> = fs::read_dir(storage::project_dir(root))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["project.json".to_string()]);
}

#[test]
fn test_backup_file_of_long_chain_restores() {
    let tmp = TempDir::new().unwrap();
    let mut graph = EntityGraph::new();
    for id in 1..=300 {
        graph
            .scenes
            .set(Scene {
                id,
                name: format!("scene {}", id),
                next_scene: (id < 300).then_some(id + 1),
                ..Scene::default()
            })
            .unwrap();
    }
    let config = StoreConfig::default();
    let path = tmp.path().join("backup.json");
    storage::write_document(&path, &ops::backup(&graph, &config).unwrap(), true).unwrap();

    let doc = storage::read_document(&path).unwrap();
    let (restored, _) = ops::restore_backup(&doc, &config).unwrap();
    assert_eq!(restored, graph);
}
