//! Integration tests for the mDNS engine.
//!
//! Two engines are wired back-to-back in memory: every multicast or unicast
//! packet one queues is delivered to the other, and time is advanced along
//! the engines' own deadlines. No sockets are involved.

use bytes::BytesMut;
use mdns::{DnsType, Mdns, MdnsConfig, MdnsEvent, MdnsRecord};
use sansio::Protocol;
use shared::{TaggedBytesMut, TransportContext, TransportProtocol};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn addr(last_octet: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, last_octet)), 5353)
}

fn deliver(packet: &TaggedBytesMut, to: &mut Mdns, from: SocketAddr, now: Instant) {
    let msg = TaggedBytesMut {
        now,
        transport: TransportContext {
            local_addr: addr(0),
            peer_addr: from,
            transport_protocol: TransportProtocol::UDP,
            ecn: None,
        },
        message: BytesMut::from(&packet.message[..]),
    };
    let _ = to.handle_read(msg);
}

// Advances simulated time to the earliest pending deadline of either
// engine, fires it on both, and exchanges every queued packet until the
// wire is quiet.
fn step(a: &mut Mdns, b: &mut Mdns, a_addr: SocketAddr, b_addr: SocketAddr) -> bool {
    let deadline = match (a.poll_timeout(), b.poll_timeout()) {
        (Some(x), Some(y)) => x.min(y),
        (Some(x), None) => x,
        (None, Some(y)) => y,
        (None, None) => return false,
    };
    let _ = a.handle_timeout(deadline);
    let _ = b.handle_timeout(deadline);

    loop {
        let mut quiet = true;
        while let Some(packet) = a.poll_write() {
            deliver(&packet, b, a_addr, deadline);
            quiet = false;
        }
        while let Some(packet) = b.poll_write() {
            deliver(&packet, a, b_addr, deadline);
            quiet = false;
        }
        if quiet {
            return true;
        }
    }
}

fn next_claim_completed(engine: &mut Mdns) -> Option<(u64, Vec<MdnsRecord>)> {
    while let Some(event) = engine.poll_event() {
        if let MdnsEvent::ClaimCompleted(claim_id, records) = event {
            return Some((claim_id, records));
        }
    }
    None
}

#[test]
fn test_claim_and_resolve_between_hosts() {
    let a_addr = addr(10);
    let b_addr = addr(20);

    let mut host_a = Mdns::new(
        MdnsConfig::default()
            .with_bind_address(Ipv4Addr::new(192, 168, 0, 10))
            .with_hostname("alpha.local".to_string()),
    )
    .unwrap();
    let mut host_b =
        Mdns::new(MdnsConfig::default().with_bind_address(Ipv4Addr::new(192, 168, 0, 20))).unwrap();

    // Let A probe and announce its hostname; B overhears everything.
    let mut claimed = None;
    for _ in 0..30 {
        step(&mut host_a, &mut host_b, a_addr, b_addr);
        if let Some(done) = next_claim_completed(&mut host_a) {
            claimed = Some(done);
            break;
        }
    }
    let (_, records) = claimed.expect("host A claims its hostname");
    assert_eq!(records[0].url(), "alpha.local");
    assert_eq!(host_a.hostname(), Some("alpha.local"));

    // B cached A's announcements, so the lookup resolves without a single
    // packet on the wire.
    let query_id = host_b.get_record("alpha.local", DnsType::A).unwrap();
    match host_b.poll_event() {
        Some(MdnsEvent::RecordsResolved(resolved_id, records)) => {
            assert_eq!(resolved_id, query_id);
            assert_eq!(records[0].rdata(), &[192, 168, 0, 10]);
        }
        other => panic!("expected a cache hit, got {other:?}"),
    }
    assert!(host_b.poll_write().is_none());
}

#[test]
fn test_query_answered_over_the_wire() {
    let a_addr = addr(10);
    let b_addr = addr(20);

    let mut server = Mdns::new(
        MdnsConfig::default()
            .with_bind_address(Ipv4Addr::new(192, 168, 0, 10))
            .with_hostname("server.local".to_string()),
    )
    .unwrap();
    let mut client =
        Mdns::new(MdnsConfig::default().with_bind_address(Ipv4Addr::new(192, 168, 0, 20))).unwrap();

    // Drive the server alone until its hostname is claimed, so the client
    // hears nothing and has an empty cache.
    let mut sink =
        Mdns::new(MdnsConfig::default().with_bind_address(Ipv4Addr::new(192, 168, 0, 99))).unwrap();
    for _ in 0..30 {
        step(&mut server, &mut sink, a_addr, addr(99));
        if next_claim_completed(&mut server).is_some() {
            break;
        }
    }

    // The client queries over the wire and the server answers.
    let query_id = client.get_record("server.local", DnsType::A).unwrap();
    let mut resolved = None;
    for _ in 0..10 {
        step(&mut client, &mut server, b_addr, a_addr);
        while let Some(event) = client.poll_event() {
            if let MdnsEvent::RecordsResolved(resolved_id, records) = event {
                resolved = Some((resolved_id, records));
            }
        }
        if resolved.is_some() {
            break;
        }
    }

    let (resolved_id, records) = resolved.expect("query must be answered");
    assert_eq!(resolved_id, query_id);
    assert_eq!(records[0].rdata(), &[192, 168, 0, 10]);
}

#[test]
fn test_late_joiner_conflict_renames() {
    let a_addr = addr(10);
    let b_addr = addr(20);

    // A claims and finishes first.
    let mut first = Mdns::new(
        MdnsConfig::default()
            .with_bind_address(Ipv4Addr::new(192, 168, 0, 10))
            .with_hostname("dup.local".to_string()),
    )
    .unwrap();
    let mut second =
        Mdns::new(MdnsConfig::default().with_bind_address(Ipv4Addr::new(192, 168, 0, 20))).unwrap();

    let mut done = false;
    for _ in 0..30 {
        step(&mut first, &mut second, a_addr, b_addr);
        if next_claim_completed(&mut first).is_some() {
            done = true;
            break;
        }
    }
    assert!(done);

    // B now tries to claim the same name with different data. A answers
    // its probes authoritatively, so B renames and completes under
    // dup-2.local.
    let claim_id = second.try_claim_hostname("dup.local").unwrap();
    let mut renamed = None;
    for _ in 0..60 {
        step(&mut first, &mut second, a_addr, b_addr);
        if let Some((completed_id, records)) = next_claim_completed(&mut second) {
            renamed = Some((completed_id, records));
            break;
        }
    }

    let (completed_id, records) = renamed.expect("late joiner must complete after renaming");
    assert_eq!(completed_id, claim_id);
    assert_eq!(records[0].url(), "dup-2.local");
    assert_eq!(second.hostname(), Some("dup-2.local"));

    // The first host keeps its name.
    assert_eq!(first.hostname(), Some("dup.local"));
}
