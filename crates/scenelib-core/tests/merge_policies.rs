use scenelib_core::config::StoreConfig;
use scenelib_core::document::{
    AudioDoc, CaptionScriptDoc, ClipDoc, Document, LibrarySourceDoc, Nested, PlaylistDoc,
    SceneDoc,
};
use scenelib_core::error::StoreError;
use scenelib_core::graph::EntityGraph;
use scenelib_core::kind::{EntityKind, Id, TargetRef};
use scenelib_core::merge::{MergeEngine, MergePolicy, merge};
use scenelib_core::model::*;
use scenelib_core::ops;
use scenelib_core::schema;
use scenelib_core::validate::validate;

fn make_tag(id: Id, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
        phrase: None,
    }
}

fn make_source(id: Id, url: &str, tags: Vec<Id>) -> LibrarySource {
    LibrarySource {
        id,
        url: url.to_string(),
        tags,
        ..LibrarySource::default()
    }
}

fn make_source_doc(id: Id, url: &str, tags: Vec<Tag>) -> LibrarySourceDoc {
    LibrarySourceDoc {
        id,
        url: url.to_string(),
        tags,
        ..LibrarySourceDoc::default()
    }
}

fn make_clip_doc(id: Id, start: f64, end: f64) -> ClipDoc {
    ClipDoc {
        id,
        start,
        end,
        ..ClipDoc::default()
    }
}

/// `Tag{1,"Cute"}` and `LibrarySource{1,"https://x",tags:[1]}`.
fn base_graph() -> EntityGraph {
    let mut graph = EntityGraph::new();
    graph.tags.set(make_tag(1, "Cute")).unwrap();
    graph.library.set(make_source(1, "https://x", vec![1])).unwrap();
    graph
}

fn scene_graph() -> EntityGraph {
    let mut graph = base_graph();
    graph
        .scenes
        .set(Scene {
            id: 1,
            name: "Intro".into(),
            sources: vec![1],
            overlays: vec![1],
            next_scene: Some(2),
            ..Scene::default()
        })
        .unwrap();
    graph
        .scenes
        .set(Scene {
            id: 2,
            name: "Loop".into(),
            next_scene: Some(1),
            ..Scene::default()
        })
        .unwrap();
    graph
        .overlays
        .set(Overlay {
            id: 1,
            target: Some(TargetRef::Scene(2)),
            opacity: 30,
        })
        .unwrap();
    graph
}

#[test]
fn test_business_key_matches_existing_rows() {
    let mut graph = base_graph();
    let before = graph.clone();
    let doc = Document {
        tags: vec![make_tag(1, "Cute")],
        library: vec![make_source_doc(1, "https://x", vec![make_tag(1, "Cute")])],
        ..Document::default()
    };

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::BusinessKey, &StoreConfig::default())
            .unwrap();

    assert_eq!(graph, before);
    assert_eq!(mapping.get(EntityKind::Tag, 1), Some(1));
    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(1));
    assert_eq!(mapping.len(), 2);
}

#[test]
fn test_business_key_inserts_unknown_url() {
    let mut graph = base_graph();
    let doc = Document {
        library: vec![make_source_doc(1, "https://y", vec![])],
        ..Document::default()
    };

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::BusinessKey, &StoreConfig::default())
            .unwrap();

    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(2));
    assert_eq!(graph.library.len(), 2);
    let inserted = graph.library.get(2).unwrap();
    assert_eq!(inserted.url, "https://y");
    assert!(inserted.tags.is_empty());
    assert_eq!(graph.tags.len(), 1);
}

#[test]
fn test_business_key_union_is_monotonic() {
    let mut graph = base_graph();
    graph
        .clips
        .set(Clip {
            id: 1,
            start: 0.0,
            end: 5.0,
            ..Clip::default()
        })
        .unwrap();
    graph
        .library
        .update(1, |source| {
            source.clips = vec![1];
            source.blacklist = vec!["https://x/a.gif".into()];
        })
        .unwrap();
    let before = graph.library.get(1).unwrap().clone();

    let mut incoming = make_source_doc(7, "https://x", vec![make_tag(3, "Funny")]);
    incoming.clips = vec![make_clip_doc(4, 0.0, 5.0), make_clip_doc(5, 5.0, 10.0)];
    incoming.blacklist = vec!["https://x/b.gif".into(), "https://x/a.gif".into()];
    let doc = Document {
        library: vec![incoming],
        ..Document::default()
    };

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::BusinessKey, &StoreConfig::default())
            .unwrap();

    let merged = graph.library.get(1).unwrap();
    assert_eq!(mapping.get(EntityKind::LibrarySource, 7), Some(1));
    // Existing tags win; the incoming tag is still added to the tag table.
    assert_eq!(merged.tags, before.tags);
    assert_eq!(mapping.get(EntityKind::Tag, 3), Some(2));
    // Clip at the same offsets lands on the existing clip.
    assert_eq!(mapping.get(EntityKind::Clip, 4), Some(1));
    assert_eq!(mapping.get(EntityKind::Clip, 5), Some(2));
    assert_eq!(merged.clips, vec![1, 2]);
    assert_eq!(
        merged.blacklist,
        vec!["https://x/a.gif".to_string(), "https://x/b.gif".to_string()]
    );
    for clip in &before.clips {
        assert!(merged.clips.contains(clip));
    }
    assert!(validate(&graph).is_empty());
}

#[test]
fn test_business_key_adopts_tags_when_missing() {
    let mut graph = EntityGraph::new();
    graph.library.set(make_source(1, "https://x", vec![])).unwrap();
    let doc = Document {
        library: vec![make_source_doc(1, "https://x", vec![make_tag(1, "Cute")])],
        ..Document::default()
    };

    ops::import_document(&mut graph, &doc, MergePolicy::BusinessKey, &StoreConfig::default())
        .unwrap();
    assert_eq!(graph.library.get(1).unwrap().tags, vec![1]);
    assert_eq!(graph.tags.get(1).unwrap().name, "Cute");
}

#[test]
fn test_clip_keys_are_scoped_to_their_source() {
    let mut graph = base_graph();
    graph
        .clips
        .set(Clip {
            id: 1,
            start: 0.0,
            end: 5.0,
            ..Clip::default()
        })
        .unwrap();
    graph.library.update(1, |s| s.clips = vec![1]).unwrap();

    // A new source with a clip at the same offsets gets its own clip.
    let mut other = make_source_doc(1, "https://z", vec![]);
    other.clips = vec![make_clip_doc(1, 0.0, 5.0)];
    let doc = Document {
        library: vec![other],
        ..Document::default()
    };
    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::BusinessKey, &StoreConfig::default())
            .unwrap();

    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(2));
    assert_eq!(mapping.get(EntityKind::Clip, 1), Some(2));
    assert_eq!(graph.library.get(2).unwrap().clips, vec![2]);
    assert_eq!(graph.library.get(1).unwrap().clips, vec![1]);
}

#[test]
fn test_business_key_matches_audio_and_script_by_url() {
    let mut graph = base_graph();
    graph
        .audios
        .set(Audio {
            id: 1,
            url: "file:///music/a.mp3".into(),
            name: "A".into(),
            ..Audio::default()
        })
        .unwrap();
    graph
        .scripts
        .set(CaptionScript {
            id: 1,
            url: "file:///scripts/s.txt".into(),
            name: "S".into(),
            ..CaptionScript::default()
        })
        .unwrap();
    let audio = AudioDoc {
        id: 4,
        url: "file:///music/a.mp3".into(),
        name: "A (remaster)".into(),
        ..AudioDoc::default()
    };
    let doc = Document {
        audios: vec![audio.clone()],
        scripts: vec![CaptionScriptDoc {
            id: 2,
            url: "file:///scripts/s.txt".into(),
            name: "Other name".into(),
            stop_at_end: true,
            ..CaptionScriptDoc::default()
        }],
        playlists: vec![PlaylistDoc {
            id: 1,
            name: "Mix".into(),
            audios: vec![audio],
            ..PlaylistDoc::default()
        }],
        ..Document::default()
    };

    let mapping = ops::import_document(
        &mut graph,
        &doc,
        MergePolicy::BusinessKey,
        &StoreConfig::default(),
    )
    .unwrap();
    assert_eq!(mapping.get(EntityKind::Audio, 4), Some(1));
    assert_eq!(mapping.get(EntityKind::CaptionScript, 2), Some(1));
    assert_eq!(graph.audios.len(), 1);
    assert_eq!(graph.scripts.len(), 1);
    // Existing rows win on payload.
    assert_eq!(graph.audios.get(1).unwrap().name, "A");
    assert_eq!(graph.scripts.get(1).unwrap().name, "S");
    // The new playlist points at the existing audio.
    let playlist_id = mapping.get(EntityKind::Playlist, 1).unwrap();
    assert_eq!(graph.playlists.get(playlist_id).unwrap().audios, vec![1]);
    assert!(validate(&graph).is_empty());
}

#[test]
fn test_exact_equality_keeps_audio_with_same_url() {
    let mut graph = base_graph();
    graph
        .audios
        .set(Audio {
            id: 1,
            url: "file:///music/a.mp3".into(),
            name: "A".into(),
            ..Audio::default()
        })
        .unwrap();
    let doc = Document {
        audios: vec![AudioDoc {
            id: 1,
            url: "file:///music/a.mp3".into(),
            name: "A (remaster)".into(),
            ..AudioDoc::default()
        }],
        ..Document::default()
    };
    let mapping = ops::import_document(
        &mut graph,
        &doc,
        MergePolicy::ExactEquality,
        &StoreConfig::default(),
    )
    .unwrap();
    assert_eq!(mapping.get(EntityKind::Audio, 1), Some(2));
    assert_eq!(graph.audios.len(), 2);
}

#[test]
fn test_self_merge_leaves_graph_unchanged() {
    let mut graph = scene_graph();
    let before = graph.clone();
    let config = StoreConfig::default();
    let doc = ops::export_scene(&graph, 1, &config).unwrap();

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::ExactEquality, &config).unwrap();

    assert_eq!(graph, before);
    for (_, from, to) in mapping.iter() {
        assert_eq!(from, to);
    }
}

#[test]
fn test_exact_equality_inserts_changed_scene() {
    let mut graph = scene_graph();
    let config = StoreConfig::default();
    let mut doc = ops::export_scene(&graph, 1, &config).unwrap();
    doc.scenes[0].name = "Intro (edited)".into();

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::ExactEquality, &config).unwrap();

    // Scene 1 differs, so it is inserted as scene 3. Scene 2 and the overlay
    // point back at scene 1 and are therefore copied too.
    assert_eq!(mapping.get(EntityKind::Scene, 1), Some(3));
    assert_eq!(mapping.get(EntityKind::Scene, 2), Some(4));
    assert_eq!(mapping.get(EntityKind::Overlay, 1), Some(2));
    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(1));
    assert_eq!(mapping.get(EntityKind::Tag, 1), Some(1));

    let copy = graph.scenes.get(3).unwrap();
    assert_eq!(copy.name, "Intro (edited)");
    assert_eq!(copy.next_scene, Some(4));
    assert_eq!(copy.overlays, vec![2]);
    assert_eq!(graph.scenes.get(4).unwrap().next_scene, Some(3));
    assert_eq!(graph.scenes.get(1).unwrap().name, "Intro");
    assert!(validate(&graph).is_empty());
}

#[test]
fn test_exact_equality_does_not_dedup_by_url() {
    // Scene import under exact equality keeps a same-url source with
    // different content as a separate row.
    let mut graph = scene_graph();
    let mut other = scene_graph();
    other.library.update(1, |s| s.marked = true).unwrap();
    let config = StoreConfig::default();
    let doc = ops::export_scene(&other, 1, &config).unwrap();

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::ExactEquality, &config).unwrap();
    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(2));
    assert_eq!(graph.library.len(), 2);
    assert_eq!(graph.library.get(2).unwrap().url, "https://x");
}

#[test]
fn test_ids_stay_unique_after_shift() {
    let mut graph = scene_graph();
    let mut foreign = EntityGraph::new();
    foreign.tags.set(make_tag(1, "Other")).unwrap();
    foreign.tags.set(make_tag(2, "Cute")).unwrap();
    foreign.library.set(make_source(1, "https://q", vec![1, 2])).unwrap();
    let config = StoreConfig::default();
    let doc = ops::export_library(&foreign, &config).unwrap();

    let mapping =
        ops::import_document(&mut graph, &doc, MergePolicy::ExactEquality, &config).unwrap();

    // First shifted id equals the destination's next id before the merge.
    assert_eq!(mapping.get(EntityKind::Tag, 1), Some(2));
    assert_eq!(mapping.get(EntityKind::Tag, 2), Some(3));
    assert_eq!(mapping.get(EntityKind::LibrarySource, 1), Some(2));
    assert_eq!(graph.library.get(2).unwrap().tags, vec![2, 3]);
    assert_eq!(graph.tags.len(), 3);
    assert_eq!(graph.tags.next_id(), 4);
    assert!(validate(&graph).is_empty());
}

#[test]
fn test_dangling_reference_rejects_merge() {
    let mut graph = base_graph();
    let before = graph.clone();
    let mut source = EntityGraph::new();
    source.library.set(make_source(1, "https://y", vec![9])).unwrap();

    let err = merge(&mut graph, &source, MergePolicy::ExactEquality).unwrap_err();
    assert_eq!(
        err,
        StoreError::DanglingReference {
            kind: EntityKind::LibrarySource,
            id: 1,
            target_kind: EntityKind::Tag,
            target_id: 9,
        }
    );
    assert_eq!(graph, before);
}

#[test]
fn test_dangling_back_reference_in_document() {
    let mut graph = scene_graph();
    let before = graph.clone();
    let doc = Document {
        scenes: vec![SceneDoc {
            id: 1,
            name: "Broken".into(),
            next_scene: Some(Nested::Ref(42)),
            ..SceneDoc::default()
        }],
        ..Document::default()
    };

    let err = ops::import_document(
        &mut graph,
        &doc,
        MergePolicy::ExactEquality,
        &StoreConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        StoreError::DanglingReference {
            target_kind: EntityKind::Scene,
            target_id: 42,
            ..
        }
    ));
    assert_eq!(graph, before);
}

#[test]
fn test_engine_reports_policy() {
    let engine = MergeEngine::new(MergePolicy::BusinessKey);
    assert_eq!(engine.policy(), MergePolicy::BusinessKey);
    assert_eq!(MergeEngine::default().policy(), MergePolicy::ExactEquality);
}

#[test]
fn test_merge_empty_source_is_noop() {
    let mut graph = scene_graph();
    let before = graph.clone();
    let mapping = merge(&mut graph, &EntityGraph::new(), MergePolicy::BusinessKey).unwrap();
    assert!(mapping.is_empty());
    assert_eq!(graph, before);
}

#[test]
fn test_import_rejects_max_id() {
    let mut graph = base_graph();
    let before = graph.clone();
    let doc = schema::document_from_json(r#"{"tags":[{"id":18446744073709551615,"name":"x"}]}"#)
        .unwrap();
    let err = ops::import_document(
        &mut graph,
        &doc,
        MergePolicy::ExactEquality,
        &StoreConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::IdOutOfRange {
            kind: EntityKind::Tag,
            id: Id::MAX
        }
    );
    assert_eq!(graph, before);
}
