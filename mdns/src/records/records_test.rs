use super::*;

fn a(url: &str, last_octet: u8) -> MdnsRecord {
    MdnsRecord::a(url, Ipv4Addr::new(10, 0, 0, last_octet), 120).unwrap()
}

fn shared_txt(url: &str) -> MdnsRecord {
    MdnsRecord::txt(url, &["key=value"], 120, RecordKind::Shared).unwrap()
}

#[test]
fn test_record_requires_name() {
    assert_eq!(
        MdnsRecord::a("", Ipv4Addr::LOCALHOST, 120).unwrap_err(),
        Error::ErrNameEmpty
    );
}

#[test]
fn test_shared_records_probed_on_add() {
    let mut store = RecordStore::new();
    let claim_id = store.add(vec![shared_txt("svc.local")], false);
    assert!(claim_id > 0);

    let records = store.find_name(&Name::new("svc.local").unwrap());
    assert_eq!(records.len(), 1);
    assert!(records[0].probed);
    assert!(!records[0].probing);
    assert!(!records[0].claimed);
}

#[test]
fn test_unique_records_start_unprobed() {
    let mut store = RecordStore::new();
    store.add(vec![a("host.local", 5)], false);

    let records = store.find_name(&Name::new("host.local").unwrap());
    assert!(!records[0].probed);
}

#[test]
fn test_duplicate_identity_is_noop() {
    let mut store = RecordStore::new();
    store.add(vec![a("host.local", 5)], false);
    store.add(vec![a("host.local", 5)], false);
    assert_eq!(store.len(), 1);

    // Same name and type but different rdata is a distinct record.
    store.add(vec![a("host.local", 6)], false);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_claim_sessions_increase() {
    let mut store = RecordStore::new();
    let first = store.add(vec![a("one.local", 1)], false);
    let second = store.add(vec![a("two.local", 2)], false);
    assert!(second > first);
}

#[test]
fn test_reclaim_keeps_session() {
    let mut store = RecordStore::new();
    let claim_id = store.add(vec![a("host.local", 5)], false);

    let mut renamed = store.take_name_unique(&Name::new("host.local").unwrap());
    assert_eq!(renamed.len(), 1);
    let renamed_record = renamed
        .remove(0)
        .clone_with_name(&Name::new("host-2.local").unwrap());
    let reclaim_id = store.add(vec![renamed_record], true);
    assert_eq!(reclaim_id, claim_id);

    let records = store.find_name(&Name::new("host-2.local").unwrap());
    assert_eq!(records[0].claim_id, claim_id);
    assert!(!records[0].probed);
}

#[test]
fn test_take_to_probe_marks_probing() {
    let mut store = RecordStore::new();
    store.add(vec![a("host.local", 5), shared_txt("svc.local")], false);

    let to_probe = store.take_to_probe();
    // Only the unique record needs probing.
    assert_eq!(to_probe.len(), 1);
    assert_eq!(to_probe[0].name.data, "host.local.");

    // A second pass finds nothing: the record is already in flight.
    assert!(store.take_to_probe().is_empty());
}

#[test]
fn test_mark_probed_captures_hostname() {
    let mut store = RecordStore::new();
    let record = a("machine.local", 9).mark_hostname();
    store.add(vec![record], false);

    let in_flight = store.take_to_probe();
    let hostname = store.mark_probed(&in_flight);
    assert_eq!(hostname.as_deref(), Some("machine.local"));

    let records = store.find_name(&Name::new("machine.local").unwrap());
    assert!(records[0].probed);
    assert!(!records[0].probing);
}

#[test]
fn test_mark_claimed_completes_session_once() {
    let mut store = RecordStore::new();
    let claim_id = store.add(vec![a("host.local", 5), a("host.local", 6)], false);

    let in_flight = store.take_to_probe();
    store.mark_probed(&in_flight);

    // Claiming only half the session completes nothing.
    let completed = store.mark_claimed(&in_flight[..1]);
    assert!(completed.is_empty());

    let completed = store.mark_claimed(&in_flight[1..]);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, claim_id);
    assert_eq!(completed[0].1.len(), 2);

    // Re-marking already-claimed records must not re-complete the session.
    assert!(store.mark_claimed(&in_flight).is_empty());
}

#[test]
fn test_rename_appends_suffix() {
    let store = RecordStore::new();
    let name = Name::new("web.local").unwrap();
    assert_eq!(store.rename_candidate(&name).unwrap().data, "web-2.local.");
}

#[test]
fn test_rename_increments_existing_suffix() {
    let store = RecordStore::new();
    let name = Name::new("web-2.local").unwrap();
    assert_eq!(store.rename_candidate(&name).unwrap().data, "web-3.local.");

    let name = Name::new("web-9.local").unwrap();
    assert_eq!(store.rename_candidate(&name).unwrap().data, "web-10.local.");
}

#[test]
fn test_rename_skips_live_names() {
    let mut store = RecordStore::new();
    store.add(vec![a("web-2.local", 2), a("web-3.local", 3)], false);

    // web-2 and web-3 still exist in the store, so the next free suffix
    // is -4.
    let name = Name::new("web.local").unwrap();
    assert_eq!(store.rename_candidate(&name).unwrap().data, "web-4.local.");
}

#[test]
fn test_rename_ignores_non_numeric_suffix() {
    let store = RecordStore::new();
    let name = Name::new("my-printer.local").unwrap();
    assert_eq!(
        store.rename_candidate(&name).unwrap().data,
        "my-printer-2.local."
    );
}

#[test]
fn test_take_name_unique_leaves_shared() {
    let mut store = RecordStore::new();
    store.add(vec![a("mixed.local", 5)], false);
    store.add(vec![shared_txt("mixed.local")], false);

    let name = Name::new("mixed.local").unwrap();
    let taken = store.take_name_unique(&name);
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].kind, RecordKind::Unique);

    let left = store.find_name(&name);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].kind, RecordKind::Shared);
}

#[test]
fn test_name_matching_is_case_insensitive() {
    let mut store = RecordStore::new();
    store.add(vec![a("Host.Local", 5)], false);
    assert!(store.has_name(&Name::new("host.local").unwrap()));
    assert_eq!(
        store
            .find_name_type(&Name::new("HOST.LOCAL").unwrap(), DnsType::A)
            .len(),
        1
    );
}

#[test]
fn test_lexi_ordering_uses_rdata_bytes() {
    let mine = a("host.local", 5);
    let peer = a("host.local", 9);
    assert!(!mine.lexi_later_than(&peer));
    assert!(peer.lexi_later_than(&mine));

    // Equal records are not later than each other.
    let twin = a("host.local", 5);
    assert!(!mine.lexi_later_than(&twin));
}

#[test]
fn test_unique_types_for_skips_shared() {
    let mut store = RecordStore::new();
    store.add(
        vec![
            a("host.local", 5),
            MdnsRecord::txt("host.local", &["a=1"], 120, RecordKind::Unique).unwrap(),
            shared_txt("other.local"),
        ],
        false,
    );

    let mut types = store.unique_types_for(&Name::new("host.local").unwrap());
    types.sort_unstable();
    assert_eq!(types, vec![DnsType::A as u16, DnsType::Txt as u16]);
}
