//! Unit Tests for the Flag Store

use linkseq::flags::FlagStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

#[test]
fn test_overwrite_and_snapshot() {
    let store = FlagStore::new();
    store.set("a", true);
    store.set("b", false);
    store.set("a", false);

    let all = store.get_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all.get("a"), Some(&false));
    assert!(store.has("b"));
    assert!(!store.get("b"));

    store.clear_all();
    assert!(store.is_empty());
}

#[test]
fn test_load_from_config_table() {
    let table: HashMap<String, toml::Value> = toml::from_str(
        r#"
        ready = true
        armed = false
        retries = 3
        label = "x"
        "#,
    )
    .unwrap();

    let store = FlagStore::new();
    assert_eq!(store.load_from(&table), 2);
    assert!(store.get("ready"));
    assert!(store.has("armed"));
    assert!(!store.has("retries"));
    assert!(!store.has("label"));
}

#[test]
fn test_concurrent_writers_on_distinct_flags() {
    let store = Arc::new(FlagStore::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    store.set(&format!("t{}_{}", t, i), i % 2 == 0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 800);
    assert!(store.get("t3_42"));
    assert!(!store.get("t3_43"));
}
