use super::*;

impl CacheWeight for String {
    fn weight(&self) -> u32 {
        self.len() as u32
    }
}

#[test]
fn test_key_format() {
    assert_eq!(
        HotCache::<String>::key("t1", Some("a1"), "recall", 0xabcd),
        "t1|a1|recall|000000000000abcd"
    );
    assert_eq!(
        HotCache::<String>::key("t1", None, "stats", 1),
        "t1|*|stats|0000000000000001"
    );
}

#[test]
fn test_put_get_bumps_hits() {
    let cache: HotCache<String> = HotCache::new();
    let key = HotCache::<String>::key("t1", Some("a1"), "recall", 7);
    cache.put(key.clone(), "payload".to_string(), TtlClass::Recall);

    assert_eq!(cache.get(&key).as_deref(), Some("payload"));
    assert_eq!(cache.get(&key).as_deref(), Some("payload"));

    let entry = cache.get_entry(&key).unwrap();
    assert_eq!(entry.hits(), 2);

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 0);
}

#[test]
fn test_miss_counts() {
    let cache: HotCache<String> = HotCache::new();
    assert!(cache.get("t1|a1|recall|0").is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_invalidate_tenant_is_prefix_scoped() {
    let cache: HotCache<String> = HotCache::new();
    let k1 = HotCache::<String>::key("t1", Some("a1"), "recall", 1);
    let k2 = HotCache::<String>::key("t1", None, "recall", 2);
    let k3 = HotCache::<String>::key("t2", Some("a1"), "recall", 3);
    cache.put(k1.clone(), "one".to_string(), TtlClass::Recall);
    cache.put(k2.clone(), "two".to_string(), TtlClass::Recall);
    cache.put(k3.clone(), "three".to_string(), TtlClass::Recall);

    cache.invalidate_tenant("t1");
    cache.gc();

    assert!(cache.get(&k1).is_none());
    assert!(cache.get(&k2).is_none());
    assert_eq!(cache.get(&k3).as_deref(), Some("three"));
}

#[test]
fn test_tenant_prefix_does_not_cross_boundaries() {
    // "t1" must not invalidate "t10".
    let cache: HotCache<String> = HotCache::new();
    let k10 = HotCache::<String>::key("t10", Some("a1"), "recall", 1);
    cache.put(k10.clone(), "kept".to_string(), TtlClass::Recall);

    cache.invalidate_tenant("t1");
    cache.gc();

    assert_eq!(cache.get(&k10).as_deref(), Some("kept"));
}

#[test]
fn test_ttl_classes() {
    assert_eq!(TtlClass::Lookup.ttl(), Duration::from_secs(30));
    assert_eq!(TtlClass::Recall.ttl(), Duration::from_secs(120));
    assert_eq!(TtlClass::Context.ttl(), Duration::from_secs(5));
}

#[test]
fn test_capacity_bound_evicts() {
    let cache: HotCache<String> = HotCache::with_capacity(64);
    for i in 0..100 {
        let key = HotCache::<String>::key("t1", Some("a1"), "recall", i);
        cache.put(key, "0123456789012345".to_string(), TtlClass::Recall);
    }
    cache.gc();
    // 100 entries of weight 16 cannot fit a 64-unit bound.
    assert!(cache.len() < 100);
}

#[test]
fn test_clear() {
    let cache: HotCache<String> = HotCache::new();
    cache.put(
        HotCache::<String>::key("t1", Some("a1"), "recall", 0),
        "x".to_string(),
        TtlClass::Recall,
    );
    cache.clear();
    cache.gc();
    assert!(cache.is_empty());
}
