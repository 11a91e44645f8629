// tests/lab_cache.rs
//
// Cache behavior: single-instance invariant, TTL and LRU eviction,
// invalidation, and config-drift rebuilds.

use std::sync::Arc;
use std::time::Duration;

use reprolab::{LabCache, LabRole};
use uuid::Uuid;

#[test]
fn same_key_returns_the_same_instance() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = LabCache::new(tmp.path(), 8, Duration::from_secs(900));
    let id = Uuid::new_v4();

    let first = cache.get(id, LabRole::Admin).expect("first get");
    let second = cache.get(id, LabRole::Admin).expect("second get");
    assert!(Arc::ptr_eq(&first, &second));

    // A different role under the same workspace is a different entry.
    let viewer = cache.get(id, LabRole::Viewer).expect("viewer get");
    assert!(!Arc::ptr_eq(&first, &viewer));
    assert_eq!(cache.len(), 2);
}

#[test]
fn ttl_eviction_rebuilds_idle_entries() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = LabCache::new(tmp.path(), 8, Duration::from_millis(50));
    let id = Uuid::new_v4();

    let first = cache.get(id, LabRole::Admin).expect("first get");
    std::thread::sleep(Duration::from_millis(80));

    // The idle entry is gone by the time the next get touches the cache,
    // and a fresh instance is constructed.
    let second = cache.get(id, LabRole::Admin).expect("second get");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn lru_bound_evicts_oldest_entry() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = LabCache::new(tmp.path(), 2, Duration::from_secs(900));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();

    let first_a = cache.get(a, LabRole::Admin).expect("a");
    std::thread::sleep(Duration::from_millis(5));
    cache.get(b, LabRole::Admin).expect("b");
    std::thread::sleep(Duration::from_millis(5));
    cache.get(c, LabRole::Admin).expect("c");
    assert_eq!(cache.len(), 2);

    // `a` was least recently used, so the next get rebuilds it.
    let second_a = cache.get(a, LabRole::Admin).expect("a again");
    assert!(!Arc::ptr_eq(&first_a, &second_a));
}

#[test]
fn invalidate_drops_every_role() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = LabCache::new(tmp.path(), 8, Duration::from_secs(900));
    let id = Uuid::new_v4();

    let admin_before = cache.get(id, LabRole::Admin).expect("admin");
    cache.get(id, LabRole::Viewer).expect("viewer");
    assert_eq!(cache.len(), 2);

    cache.invalidate(id);
    assert!(cache.is_empty());

    let admin_after = cache.get(id, LabRole::Admin).expect("admin again");
    assert!(!Arc::ptr_eq(&admin_before, &admin_after));
}

#[test]
fn config_drift_forces_a_rebuild() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = LabCache::new(tmp.path(), 8, Duration::from_secs(900));
    let id = Uuid::new_v4();

    let before = cache.get(id, LabRole::Admin).expect("first get");

    // An out-of-band edit bumps the config document's mtime.
    std::thread::sleep(Duration::from_millis(30));
    let config_path = {
        let lab = before.lock().expect("lock");
        lab.layout().config_path()
    };
    let raw = std::fs::read_to_string(&config_path).expect("read config");
    std::fs::write(&config_path, raw).expect("rewrite config");

    let after = cache.get(id, LabRole::Admin).expect("second get");
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn concurrent_gets_share_one_lab() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cache = Arc::new(LabCache::new(tmp.path(), 8, Duration::from_secs(900)));
    let id = Uuid::new_v4();

    // Warm the entry so every thread hits the cached path.
    let warm = cache.get(id, LabRole::Admin).expect("warm");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || {
            cache.get(id, LabRole::Admin).expect("get")
        }));
    }
    for handle in handles {
        let lab = handle.join().expect("join");
        assert!(Arc::ptr_eq(&warm, &lab));
    }
    assert_eq!(cache.len(), 1);
}
