//! Version history scenarios through the public store API.

use std::path::Path;

use quill_context::{MAX_VERSIONS, RevertError, VersionHistoryStore};
use quill_engine::{ArtifactId, VersionLabel};

#[test]
fn twenty_one_records_keep_the_latest_twenty() {
    let mut store = VersionHistoryStore::new();
    let artifact = ArtifactId::new("/project/lib.rs");

    for n in 1..=21 {
        store.record_version(&artifact, format!("body {n}"), format!("v{n}"));
        assert!(store.len(&artifact) <= MAX_VERSIONS);
        if n == 20 {
            assert_eq!(store.len(&artifact), 20);
        }
    }

    let list = store.list(&artifact);
    assert_eq!(list.len(), 20);
    assert_eq!(list[0].label, VersionLabel::from("v2"));
    assert!(list.iter().all(|summary| summary.label != VersionLabel::from("v1")));
    let current = store.current(&artifact).unwrap();
    assert_eq!(current.label(), &VersionLabel::from("v21"));
    assert_eq!(current.content(), "body 21");
}

#[test]
fn out_of_range_revert_changes_nothing() {
    let mut store = VersionHistoryStore::new();
    let artifact = ArtifactId::new("/project/lib.rs");
    store.record_version(&artifact, "a", VersionLabel::Original);
    store.record_version(&artifact, "b", VersionLabel::AiEdit);
    let before = store.list(&artifact);

    for index in [2, 3, usize::MAX] {
        assert_eq!(
            store.revert(&artifact, index),
            Err(RevertError::OutOfRange { index, len: 2 })
        );
    }
    assert_eq!(store.list(&artifact), before);
    assert_eq!(store.current_index(&artifact), Some(1));
}

#[test]
fn revert_returns_recorded_bytes_exactly() {
    let mut store = VersionHistoryStore::new();
    let artifact = ArtifactId::from_path(Path::new("/project/./src/../lib.rs"));
    assert_eq!(artifact, ArtifactId::new("/project/lib.rs"));

    let original = "line one\r\n\ttabbed ünïcode\n\n";
    store.record_version(&artifact, original, VersionLabel::Original);
    store.record_version(&artifact, "replaced", VersionLabel::AiEdit);
    store.record_version(&artifact, "saved", VersionLabel::ManualSave);

    assert_eq!(store.revert(&artifact, 0).unwrap(), original);
    assert_eq!(store.current_index(&artifact), Some(0));

    // Recording after a revert appends and becomes current.
    store.record_version(&artifact, "after revert", VersionLabel::ManualSave);
    assert_eq!(store.len(&artifact), 4);
    assert_eq!(store.current_index(&artifact), Some(3));
}
