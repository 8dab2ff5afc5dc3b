use std::fs;

use bingo_stats::config::CREDENTIAL_KEY;
use bingo_stats::local_store::{
    FileStore, KeyValueStore, load_cached_stats, read_credential, store_cached_stats,
};
use bingo_stats::stats::CachedStats;

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");

    let store = FileStore::open(&path);
    store.set(CREDENTIAL_KEY, "  tok-1 ").unwrap();
    store_cached_stats(
        &store,
        "u1",
        &CachedStats {
            games_played: 8,
            games_won: 2,
            ..CachedStats::default()
        },
    )
    .unwrap();

    let reopened = FileStore::open(&path);
    assert_eq!(read_credential(&reopened).as_deref(), Some("tok-1"));
    let cached = load_cached_stats(&reopened, "u1").unwrap().unwrap();
    assert_eq!(cached.games_played, 8);
    assert_eq!(cached.games_won, 2);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn set_replaces_only_its_own_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("store.json"));
    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.set("a", "3").unwrap();

    assert_eq!(store.get("a").unwrap().as_deref(), Some("3"));
    assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
}

#[test]
fn corrupt_file_reads_as_empty_and_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    fs::write(&path, "{not json").unwrap();

    let store = FileStore::open(&path);
    assert_eq!(store.get(CREDENTIAL_KEY).unwrap(), None);
    assert_eq!(load_cached_stats(&store, "u1").unwrap(), None);

    store.set("k", "v").unwrap();
    assert_eq!(FileStore::open(&path).get("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn other_store_versions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    fs::write(&path, r#"{"version": 99, "entries": {"k": "v"}}"#).unwrap();

    let store = FileStore::open(&path);
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("absent.json"));
    assert_eq!(read_credential(&store), None);
    assert_eq!(load_cached_stats(&store, "u1").unwrap(), None);
}
