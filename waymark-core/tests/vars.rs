use std::collections::BTreeMap;

use serde_json::json;
use waymark_core::VariableStore;

#[test]
fn append_to_absent_variable_creates_list() {
    let store = VariableStore::new();
    store.append("names", json!("ada"));
    assert_eq!(store.get("names"), Some(json!(["ada"])));
}

#[test]
fn append_to_existing_list_pushes() {
    let store = VariableStore::new();
    store.set("names", json!(["ada"]));
    store.append("names", json!("grace"));
    assert_eq!(store.get("names"), Some(json!(["ada", "grace"])));
}

#[test]
fn append_to_scalar_wraps_it_first() {
    let store = VariableStore::new();
    store.set("names", json!("ada"));
    store.append("names", json!("grace"));
    assert_eq!(store.get("names"), Some(json!(["ada", "grace"])));
}

#[test]
fn set_overwrites() {
    let store = VariableStore::new();
    store.set("x", json!(1));
    store.set("x", json!(2));
    assert_eq!(store.get("x"), Some(json!(2)));
}

#[test]
fn snapshot_is_point_in_time() {
    let store = VariableStore::new();
    store.set("x", json!(1));
    let snap = store.snapshot();
    store.set("x", json!(2));
    assert_eq!(snap.get("x"), Some(&json!(1)));
    assert_eq!(store.get("x"), Some(json!(2)));
}

#[test]
fn restore_replaces_contents() {
    let store = VariableStore::new();
    store.set("old", json!(true));
    let mut fresh = BTreeMap::new();
    fresh.insert("new".to_string(), json!(7));
    store.restore(fresh);
    assert_eq!(store.get("old"), None);
    assert_eq!(store.get("new"), Some(json!(7)));
    assert_eq!(store.len(), 1);
}

#[test]
fn clones_share_the_same_map() {
    let store = VariableStore::new();
    let alias = store.clone();
    alias.set("x", json!("shared"));
    assert_eq!(store.get("x"), Some(json!("shared")));
}

#[test]
fn concurrent_appends_lose_nothing() {
    let store = VariableStore::new();
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    store.append("all", json!(t * 50 + i));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let all = store.get("all").unwrap();
    let items = all.as_array().unwrap();
    assert_eq!(items.len(), 400);
    // Every value shows up exactly once, in whatever interleaving occurred.
    let mut seen: Vec<i64> = items.iter().map(|v| v.as_i64().unwrap()).collect();
    seen.sort_unstable();
    let expected: Vec<i64> = (0..400).collect();
    assert_eq!(seen, expected);
}
