//! # mdns
//!
//! A sans-I/O implementation of a Multicast DNS (RFC 6762) responder and
//! resolver.
//!
//! The crate provides [`Mdns`], a protocol engine that implements the
//! [`sansio::Protocol`] trait so it can be driven by any I/O framework
//! (tokio, async-std, smol, or synchronous I/O). It covers the
//! peer-coordinated parts of mDNS:
//!
//! - **Claiming**: unique records are verified by probing (with
//!   simultaneous-probe tiebreaking) and then announced with the
//!   cache-flush bit set; shared records are announced directly.
//! - **Conflict resolution**: a competing claim renames the affected
//!   records (`web.local` → `web-2.local`) and restarts their claim without
//!   losing the caller's session.
//! - **Responding**: inbound questions are answered from the record store
//!   with known-answer suppression, QU/QM handling, DNS-SD service
//!   metadata and NSEC negative answers.
//! - **Resolving**: cache-first lookups with duplicate-query suppression
//!   and per-lookup timeout reporting.
//!
//! ## Sans-I/O Design
//!
//! The engine performs no I/O and owns no sockets, timers or threads. The
//! caller:
//!
//! 1. Reads packets from the network and calls `handle_read()`
//! 2. Sends packets returned by `poll_write()` to the address in their
//!    transport context (the multicast group, or a unicast peer)
//! 3. Calls `handle_timeout()` when `poll_timeout()` expires
//! 4. Processes completion events from `poll_event()`
//!
//! ## Quick Start
//!
//! ```rust
//! use mdns::{Mdns, MdnsConfig};
//! use sansio::Protocol;
//! use std::net::Ipv4Addr;
//!
//! // Claim a hostname for this machine.
//! let config = MdnsConfig::default()
//!     .with_bind_address(Ipv4Addr::new(192, 168, 1, 100))
//!     .with_hostname("myhost.local".to_string());
//! let mut engine = Mdns::new(config).unwrap();
//!
//! // The first probe packet is scheduled within 250 ms.
//! assert!(engine.poll_timeout().is_some());
//! ```
//!
//! ## Event Loop Pattern
//!
//! ```text
//! loop {
//!     while let Some(packet) = engine.poll_write() {
//!         socket.send_to(&packet.message, packet.transport.peer_addr);
//!     }
//!     select! {
//!         packet = socket.recv_from() => { engine.handle_read(packet); }
//!         _ = sleep_until(engine.poll_timeout()) => {
//!             engine.handle_timeout(Instant::now());
//!         }
//!     }
//!     while let Some(event) = engine.poll_event() {
//!         // MdnsEvent::ClaimCompleted, RecordsResolved, ...
//!     }
//! }
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod cookie;
pub(crate) mod message;
pub(crate) mod proto;
pub(crate) mod records;
pub(crate) mod socket;

pub use config::MdnsConfig;
pub use message::name::Name;
pub use message::{DNSCLASS_INET, DnsClass, DnsType};
pub use proto::{
    MDNS_DEST_ADDR, MDNS_MULTICAST_IPV4, MDNS_PORT, Mdns, MdnsEvent, QueryId, SERVICE_META_NAME,
};
pub use records::{ClaimId, MdnsRecord, RecordKind};
pub use socket::MulticastSocket;
