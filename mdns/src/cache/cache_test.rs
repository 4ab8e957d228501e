use super::*;

fn learned(url: &str, last_octet: u8, ttl: u32, kind: RecordKind) -> MdnsRecord {
    let mut record = MdnsRecord::new(
        url,
        vec![10, 0, 0, last_octet],
        DnsType::A,
        ttl,
        kind,
    )
    .unwrap();
    record.current_ttl = ttl;
    record
}

#[test]
fn test_add_and_find() {
    let mut cache = Cache::new();
    cache.add(learned("peer.local", 7, 120, RecordKind::Shared));

    let name = Name::new("peer.local").unwrap();
    assert_eq!(cache.find_name_type(&name, DnsType::A).len(), 1);
    assert!(cache.find_name_type(&name, DnsType::Txt).is_empty());

    // ANY matches every type under the name.
    assert_eq!(cache.find_name_type(&name, DnsType::All).len(), 1);
}

#[test]
fn test_zero_ttl_never_cached() {
    let mut cache = Cache::new();
    cache.add(learned("gone.local", 1, 0, RecordKind::Shared));
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_cache_flush_evicts_stale_entries() {
    let mut cache = Cache::new();
    // Two learned records under the same name and type.
    cache.add(learned("moved.local", 1, 120, RecordKind::Shared));
    cache.add(learned("moved.local", 2, 120, RecordKind::Shared));
    assert_eq!(cache.len(), 2);

    // A cache-flush record replaces both of them.
    cache.add(learned("moved.local", 3, 120, RecordKind::Unique));
    let name = Name::new("moved.local").unwrap();
    let records = cache.find_name_type(&name, DnsType::A);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rdata(), &[10, 0, 0, 3]);
}

#[test]
fn test_cache_flush_leaves_other_types() {
    let mut cache = Cache::new();
    cache.add(learned("multi.local", 1, 120, RecordKind::Shared));
    cache.add(
        MdnsRecord::txt("multi.local", &["x=y"], 120, RecordKind::Shared).unwrap(),
    );

    cache.add(learned("multi.local", 9, 120, RecordKind::Unique));

    let name = Name::new("multi.local").unwrap();
    assert_eq!(cache.find_name_type(&name, DnsType::A).len(), 1);
    assert_eq!(cache.find_name_type(&name, DnsType::Txt).len(), 1);
}

#[test]
fn test_identical_record_refreshes_ttl() {
    let mut cache = Cache::new();
    cache.add(learned("stable.local", 4, 120, RecordKind::Shared));

    // Age the entry a little.
    for _ in 0..50 {
        cache.tick();
    }
    let name = Name::new("stable.local").unwrap();
    assert_eq!(cache.find_name_type(&name, DnsType::A)[0].current_ttl, 70);

    // The same record arriving again restores the full TTL without
    // duplicating the entry.
    cache.add(learned("stable.local", 4, 120, RecordKind::Shared));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.find_name_type(&name, DnsType::A)[0].current_ttl, 120);
}

#[test]
fn test_zero_ttl_expires_existing_entry_next_tick() {
    let mut cache = Cache::new();
    cache.add(learned("leaving.local", 4, 120, RecordKind::Shared));

    // A goodbye announcement (TTL 0) drops the entry on the next tick.
    cache.add(learned("leaving.local", 4, 0, RecordKind::Shared));
    assert_eq!(cache.len(), 1);

    cache.tick();
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_tick_evicts_expired_entries() {
    let mut cache = Cache::new();
    cache.add(learned("brief.local", 4, 2, RecordKind::Shared));
    cache.add(learned("lasting.local", 5, 120, RecordKind::Shared));

    cache.tick();
    assert_eq!(cache.len(), 2);
    cache.tick();
    assert_eq!(cache.len(), 1);
    assert!(
        cache
            .find_name_type(&Name::new("brief.local").unwrap(), DnsType::A)
            .is_empty()
    );
}
