use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use super::*;
use crate::testing::{ids, sample, samples};

fn id_set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn backends() -> Vec<(&'static str, Arc<dyn PendingStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonFileStore::open(dir.path().join("pending.json")).unwrap();
    vec![
        ("memory", Arc::new(MemoryStore::new()), None),
        ("file", Arc::new(file), Some(dir)),
    ]
}

#[test]
fn enqueue_preserves_arrival_order() {
    for (name, store, _dir) in backends() {
        for s in samples(0..5) {
            store.enqueue(s);
        }
        assert_eq!(
            ids(&store.peek_all()),
            vec!["s-0", "s-1", "s-2", "s-3", "s-4"],
            "{name}"
        );
        assert_eq!(store.count(), 5, "{name}");
    }
}

#[test]
fn peek_all_does_not_mutate() {
    for (name, store, _dir) in backends() {
        store.enqueue(sample(1));
        let _ = store.peek_all();
        let _ = store.peek_all();
        assert_eq!(store.count(), 1, "{name}");
    }
}

#[test]
fn remove_by_ids_ignores_unknown_and_repeated_ids() {
    for (name, store, _dir) in backends() {
        for s in samples(0..4) {
            store.enqueue(s);
        }
        store.remove_by_ids(&id_set(&["s-1", "missing"]));
        store.remove_by_ids(&id_set(&["s-1", "s-2"]));
        store.remove_by_ids(&id_set(&["s-2"]));
        assert_eq!(ids(&store.peek_all()), vec!["s-0", "s-3"], "{name}");
    }
}

#[test]
fn removal_from_old_snapshot_keeps_newer_entries() {
    for (name, store, _dir) in backends() {
        store.enqueue(sample(0));
        store.enqueue(sample(1));
        let snapshot = store.peek_all();

        // Capture side keeps producing between the snapshot and the removal.
        store.enqueue(sample(2));

        let delivered: HashSet<String> = snapshot.into_iter().map(|s| s.id).collect();
        store.remove_by_ids(&delivered);
        assert_eq!(ids(&store.peek_all()), vec!["s-2"], "{name}");
    }
}

#[test]
fn clear_empties_store() {
    for (name, store, _dir) in backends() {
        for s in samples(0..3) {
            store.enqueue(s);
        }
        store.clear();
        assert_eq!(store.count(), 0, "{name}");
        assert!(store.peek_all().is_empty(), "{name}");
    }
}

#[test]
fn concurrent_enqueue_and_remove_lose_nothing() {
    for (name, store, _dir) in backends() {
        for s in samples(0..20) {
            store.enqueue(s);
        }
        let snapshot: HashSet<String> = store.peek_all().into_iter().map(|s| s.id).collect();

        let producer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for s in samples(20..40) {
                    store.enqueue(s);
                }
            })
        };
        store.remove_by_ids(&snapshot);
        producer.join().unwrap();

        let mut remaining = ids(&store.peek_all());
        remaining.sort();
        let mut expected = ids(&samples(20..40));
        expected.sort();
        assert_eq!(remaining, expected, "{name}");
    }
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    {
        let store = JsonFileStore::open(&path).unwrap();
        store.enqueue(sample(7));
        store.enqueue(sample(8));
        store.remove_by_ids(&id_set(&["s-7"]));
    }
    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(ids(&reopened.peek_all()), vec!["s-8"]);
}

#[test]
fn file_store_writes_a_single_camel_case_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.enqueue(sample(1));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let list = raw.as_array().expect("top-level array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], "s-1");
    assert!(list[0].get("trackedAt").is_some());
}

#[test]
fn file_store_treats_corrupt_file_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    std::fs::write(&path, "{not json").unwrap();

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.count(), 0);

    store.enqueue(sample(3));
    assert_eq!(ids(&store.peek_all()), vec!["s-3"]);
}

#[test]
fn file_store_creates_missing_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/deeper/pending.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.enqueue(sample(1));
    assert!(path.exists());
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn open_selects_backend() {
    let store = open(&StoreBackend::Memory).unwrap();
    store.enqueue(sample(1));
    assert_eq!(store.count(), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let store = open(&StoreBackend::File(path.clone())).unwrap();
    store.enqueue(sample(2));
    assert!(path.exists());
}

#[cfg(unix)]
#[test]
fn file_store_keeps_backlog_when_file_is_unreadable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.enqueue(sample(1));
    store.enqueue(sample(2));

    let set_mode = |mode| std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode));
    set_mode(0o000).unwrap();
    if std::fs::read(&path).is_ok() {
        // Permission bits don't apply to this user (e.g. root).
        set_mode(0o600).unwrap();
        return;
    }

    store.enqueue(sample(3));
    store.clear();
    assert_eq!(store.count(), 0, "unreadable file reads as empty");

    set_mode(0o600).unwrap();
    assert_eq!(ids(&store.peek_all()), vec!["s-1", "s-2"]);
}

#[test]
fn file_store_skips_writes_when_read_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.json");
    let store = JsonFileStore::open(&path).unwrap();
    store.enqueue(sample(1));

    // A directory in place of the file fails every read with something other than NotFound.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    store.enqueue(sample(2));
    assert_eq!(store.count(), 0);
    assert!(
        !dir.path().join("pending.json.tmp").exists(),
        "no rewrite attempted from a failed read"
    );
    assert!(path.is_dir());
    assert!(JsonFileStore::open(&path).is_err());
}
