//! Integration tests for scenelib-cli functionality.
//! Tests the underlying library functions that the CLI commands invoke.

use scenelib_core::config::StoreConfig;
use scenelib_core::graph::EntityGraph;
use scenelib_core::kind::{EntityKind, Id, TargetRef};
use scenelib_core::merge::MergePolicy;
use scenelib_core::model::*;
use scenelib_core::validate::validate;
use scenelib_core::{ops, storage};

fn make_tag(id: Id, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
        phrase: None,
    }
}

fn make_project() -> EntityGraph {
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
            ..Scene::default()
        })
        .unwrap();
    graph
        .scene_groups
        .set(SceneGroup {
            id: 1,
            name: "All".into(),
            members: vec![TargetRef::Scene(1)],
        })
        .unwrap();
    graph
}

#[test]
fn test_storage_load_nonexistent() {
    let tmpdir = tempfile::tempdir().unwrap();
    let result = storage::load(tmpdir.path());
    assert!(result.is_err(), "loading from empty dir should fail");
}

#[test]
fn test_init_creates_empty_project() {
    let tmpdir = tempfile::tempdir().unwrap();
    storage::save(tmpdir.path(), &EntityGraph::new(), true).unwrap();
    assert!(storage::project_exists(tmpdir.path()));

    let loaded = storage::load(tmpdir.path()).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.next_id(EntityKind::Scene), 1);
}

#[test]
fn test_export_then_import_into_other_project() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default();

    storage::save(src_dir.path(), &make_project(), true).unwrap();
    let mut other = EntityGraph::new();
    other.tags.set(make_tag(1, "Unrelated")).unwrap();
    storage::save(dst_dir.path(), &other, true).unwrap();

    // export-scene 1 -o intro.json
    let graph = storage::load(src_dir.path()).unwrap();
    let doc = ops::export_scene(&graph, 1, &config).unwrap();
    let file = src_dir.path().join("intro.json");
    storage::write_document(&file, &doc, true).unwrap();

    // import intro.json --policy exact
    let mut target = storage::load(dst_dir.path()).unwrap();
    let doc = storage::read_document(&file).unwrap();
    let mapping = ops::import_document(&mut target, &doc, MergePolicy::ExactEquality, &config)
        .unwrap();
    storage::save(dst_dir.path(), &target, true).unwrap();

    let reloaded = storage::load(dst_dir.path()).unwrap();
    assert_eq!(mapping.get(EntityKind::Tag, 1), Some(2));
    assert_eq!(reloaded.tags.get(2).unwrap().name, "Cute");
    assert_eq!(reloaded.library.get(1).unwrap().tags, vec![2]);
    assert_eq!(reloaded.scenes.get(1).unwrap().name, "Intro");
    assert!(validate(&reloaded).is_empty());
}

#[test]
fn test_backup_and_restore() {
    let tmpdir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default();
    let graph = make_project();
    let file = tmpdir.path().join("backup.json");

    let doc = ops::backup(&graph, &config).unwrap();
    storage::write_document(&file, &doc, false).unwrap();

    let (restored, mapping) = ops::restore_backup(&storage::read_document(&file).unwrap(), &config)
        .unwrap();
    assert_eq!(restored, graph);
    assert_eq!(mapping.len(), 4);
}

#[test]
fn test_delete_clears_references() {
    let mut graph = make_project();
    let referrers = graph.referrers(EntityKind::Scene, 1);
    assert_eq!(referrers, vec![(EntityKind::SceneGroup, 1)]);

    graph.delete_cascade(EntityKind::Scene, 1).unwrap();
    assert!(graph.scene_groups.get(1).unwrap().members.is_empty());
    assert!(validate(&graph).is_empty());
}

#[test]
fn test_validate_reports_unchecked_problems() {
    let tmpdir = tempfile::tempdir().unwrap();
    let root = tmpdir.path();
    std::fs::create_dir_all(storage::project_dir(root)).unwrap();
    std::fs::write(
        storage::project_file(root),
        r#"{"scenes":{"rows":{"1":{"id":1,"name":"a","nextScene":5}},"nextId":2}}"#,
    )
    .unwrap();

    assert!(storage::load(root).is_err());
    let graph = storage::load_unchecked(root).unwrap();
    let violations = validate(&graph);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].to_string(), "scene 1: references missing scene 5");
}

#[test]
fn test_cli_arguments_parse() {
    assert_eq!("grid".parse::<EntityKind>(), Ok(EntityKind::SceneGrid));
    assert_eq!("key".parse::<MergePolicy>(), Ok(MergePolicy::BusinessKey));
    assert_eq!(format!("{:<8}|", EntityKind::Tag), "tag     |");
}
