//! Sans-I/O mDNS responder/resolver engine.
//!
//! [`Mdns`] owns three tables: the records this host claims authority over,
//! the cache of records learned from peers, and the cookies tracking
//! in-flight exchanges (probes, announcements, queries). It performs no I/O;
//! the caller:
//!
//! 1. Feeds received UDP packets to `handle_read()`
//! 2. Sends packets returned by `poll_write()` (the destination - multicast
//!    group or unicast peer - is in `transport.peer_addr`)
//! 3. Calls `handle_timeout()` when the deadline from `poll_timeout()`
//!    expires
//! 4. Consumes completion events from `poll_event()`
//!
//! # Claim lifecycle
//!
//! Unique records pass through probing before they are relied upon: three
//! probe queries 250 ms apart (the first delayed by a random 0-250 ms),
//! carrying the candidate records as authority records. A competing probe
//! observed on the wire is settled by lexicographic tiebreak; a lost
//! tiebreak defers probing by one second. A genuine conflict renames the
//! records (`web.local` becomes `web-2.local`) and restarts the claim under
//! the same session. Verified records are then announced with the
//! cache-flush bit set, at doubling intervals starting at one second. Shared
//! records skip probing entirely.
//!
//! ```rust
//! use mdns::{Mdns, MdnsConfig, MdnsRecord};
//! use std::net::Ipv4Addr;
//!
//! let mut mdns = Mdns::new(
//!     MdnsConfig::default().with_bind_address(Ipv4Addr::new(192, 168, 1, 10)),
//! )
//! .unwrap();
//!
//! let record = MdnsRecord::a("web.local", Ipv4Addr::new(192, 168, 1, 10), 120).unwrap();
//! let claim_id = mdns.claim(vec![record]).unwrap();
//!
//! // Drive poll_write()/handle_timeout() from the event loop; once the
//! // probe and announce exchanges finish, poll_event() yields
//! // MdnsEvent::ClaimCompleted(claim_id, records).
//! # let _ = claim_id;
//! ```

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use shared::error::{Error, Result};
use shared::{TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol};

use crate::cache::Cache;
use crate::config::*;
use crate::cookie::{Cookie, CookieId, CookieKind, CookieOrigin, CookieQuestion, CookieStatus};
use crate::message::header::Header;
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::nsec::NsecResource;
use crate::message::resource::ResourceBody;
use crate::message::{DNSCLASS_INET, DnsType, Message, RCode};
use crate::records::{ClaimId, MdnsRecord, RecordKind, RecordStore};

/// The mDNS multicast group address (224.0.0.251).
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The standard mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// mDNS multicast destination address (224.0.0.251:5353).
pub const MDNS_DEST_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(MDNS_MULTICAST_IPV4), MDNS_PORT);

/// Service enumeration meta-name (RFC 6763 §9).
pub const SERVICE_META_NAME: &str = "_services._dns-sd._udp.local";

/// Unique identifier for tracking get_record lookups.
pub type QueryId = u64;

/// Events emitted by the engine.
///
/// Poll for events with `poll_event()` after calling `handle_read()` or
/// `handle_timeout()`. Every exchange resolves into exactly one of these:
/// nothing is left unanswered.
#[derive(Debug)]
pub enum MdnsEvent {
    /// Every record of the claim session has been probed, announced and
    /// marked claimed. Carries the session's full record set; after a
    /// conflict rename the records show the new names.
    ClaimCompleted(ClaimId, Vec<MdnsRecord>),

    /// A probe or announce exchange for this claim session died without
    /// completing (no packets could be exchanged for its whole lifetime).
    ClaimFailed(ClaimId),

    /// Records resolved for a [`Mdns::get_record`] call, from the cache or
    /// from the wire.
    RecordsResolved(QueryId, Vec<MdnsRecord>),

    /// A [`Mdns::get_record`] call saw no answer before its timeout lapsed.
    QueryTimeout(QueryId),
}

/// Sans-I/O mDNS responder/resolver.
///
/// See the [module documentation](self) for the event-loop contract.
pub struct Mdns {
    config: MdnsConfig,

    /// Records this host claims authority over.
    store: RecordStore,

    /// Records learned from peers.
    cache: Cache,

    /// In-flight exchanges.
    cookies: Vec<Cookie>,

    /// Hostname, set once the hostname record passes probing.
    hostname: Option<String>,

    next_query_id: QueryId,
    next_cookie_id: CookieId,

    /// Outgoing packet queue.
    write_outs: VecDeque<TaggedBytesMut>,

    /// Event queue.
    event_outs: VecDeque<MdnsEvent>,

    /// Next housekeeping tick.
    next_tick: Option<Instant>,

    closed: bool,
}

impl Mdns {
    /// Creates an engine from the given configuration. When the
    /// configuration carries a hostname the engine immediately starts
    /// claiming it (a unique A record of the bind address).
    pub fn new(config: MdnsConfig) -> Result<Self> {
        let hostname = config.hostname.clone();
        let mut mdns = Self {
            config,
            store: RecordStore::new(),
            cache: Cache::new(),
            cookies: Vec::new(),
            hostname: None,
            next_query_id: 1,
            next_cookie_id: 1,
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
            next_tick: Some(Instant::now() + TICK_INTERVAL),
            closed: false,
        };
        if let Some(hostname) = hostname {
            mdns.try_claim_hostname(&hostname)?;
        }
        Ok(mdns)
    }

    /// The hostname this engine has successfully claimed, if any. After a
    /// conflict rename this reports the renamed hostname.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Claims a unique A record with this host's address under the given
    /// name and tracks it as the hostname record. The name is only visible
    /// through [`hostname`](Self::hostname) once the record is verified.
    pub fn try_claim_hostname(&mut self, url: &str) -> Result<ClaimId> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if url.is_empty() {
            return Err(Error::ErrHostnameEmpty);
        }
        let record = MdnsRecord::a(url, self.config.bind_address, self.config.record_ttl)?
            .mark_hostname();
        self.claim(vec![record])
    }

    /// Claims a set of records as one session. Unique records are probed
    /// first; shared records go straight to announcing. One
    /// [`MdnsEvent::ClaimCompleted`] fires when the whole session is
    /// claimed.
    pub fn claim(&mut self, records: Vec<MdnsRecord>) -> Result<ClaimId> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if records.is_empty() {
            return Err(Error::ErrEmptyRecordSet);
        }

        let now = Instant::now();
        let claim_id = self.store.add(records, false);
        self.probe(now);
        self.announce(now);
        Ok(claim_id)
    }

    // Conflict-driven re-registration: the records keep their original
    // claim sessions.
    fn reclaim(&mut self, records: Vec<MdnsRecord>, now: Instant) {
        if records.is_empty() {
            return;
        }
        self.store.add(records, true);
        self.probe(now);
        self.announce(now);
    }

    /// Looks a record up by name and type. Cache hits resolve immediately
    /// (the event is queued before this returns); otherwise a one-shot query
    /// goes out after a 20-140 ms delay and the answer - or a timeout - is
    /// reported with the returned id.
    pub fn get_record(&mut self, url: &str, typ: DnsType) -> Result<QueryId> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if url.is_empty() {
            return Err(Error::ErrNameEmpty);
        }
        let name = Name::new(url)?;

        let query_id = self.next_query_id;
        self.next_query_id += 1;

        let hits = self.cache.find_name_type(&name, typ);
        if !hits.is_empty() {
            log::trace!("cache hit for {name}");
            self.event_outs
                .push_back(MdnsEvent::RecordsResolved(query_id, hits));
            return Ok(query_id);
        }

        log::trace!("cache miss for {name}, querying");
        self.start_query(name, typ, CookieOrigin::Query(query_id), Instant::now());
        Ok(query_id)
    }

    /// Cancels a pending lookup. No event will be emitted for it.
    pub fn cancel_query(&mut self, query_id: QueryId) {
        self.cookies
            .retain(|c| c.origin != CookieOrigin::Query(query_id));
    }

    /// Number of lookups still waiting for an answer.
    pub fn pending_query_count(&self) -> usize {
        self.cookies
            .iter()
            .filter(|c| matches!(c.origin, CookieOrigin::Query(_)))
            .count()
    }

    fn alloc_cookie_id(&mut self) -> CookieId {
        let id = self.next_cookie_id;
        self.next_cookie_id += 1;
        id
    }

    fn cookie_index(&self, id: CookieId) -> Option<usize> {
        self.cookies.iter().position(|c| c.id == id)
    }

    fn remove_cookie(&mut self, id: CookieId) {
        self.cookies.retain(|c| c.id != id);
    }

    // MARK: probing & announcing

    // Starts one probe exchange for every unique record that still needs
    // verification: one ANY-question per distinct name, the candidate
    // records attached as authorities, first transmission after a random
    // 0-250 ms delay (RFC 6762 §8.1).
    fn probe(&mut self, now: Instant) {
        let to_probe = self.store.take_to_probe();
        if to_probe.is_empty() {
            return;
        }

        let mut questions: Vec<CookieQuestion> = vec![];
        for record in &to_probe {
            if !questions.iter().any(|q| q.name.equal_fold(&record.name)) {
                questions.push(CookieQuestion {
                    name: record.name.clone(),
                    typ: DnsType::All,
                    unicast_response: self.config.probe_unicast,
                });
            }
        }

        let delay = Duration::from_millis(rand::random::<u64>() % PROBE_JITTER_MS);
        let cookie = Cookie {
            id: self.alloc_cookie_id(),
            kind: CookieKind::Probe,
            status: CookieStatus::Inactive,
            origin: CookieOrigin::Claim,
            questions,
            answers: to_probe,
            count: PROBE_COUNT,
            initial_count: PROBE_COUNT,
            timeout: self.config.cookie_timeout,
            next_send: Some(now + delay),
        };
        log::debug!("probing {} question(s)", cookie.questions.len());
        self.cookies.push(cookie);
    }

    // Starts announcing every record that has been verified but not yet
    // claimed. The first announcement goes out immediately.
    fn announce(&mut self, now: Instant) {
        let probed = self.store.probed_not_claimed();
        if probed.is_empty() {
            return;
        }

        let count = self.config.announce_count;
        let cookie = Cookie {
            id: self.alloc_cookie_id(),
            kind: CookieKind::Announce,
            status: CookieStatus::Inactive,
            origin: CookieOrigin::Claim,
            questions: vec![],
            answers: probed,
            count,
            initial_count: count,
            timeout: self.config.cookie_timeout,
            next_send: None,
        };
        let id = cookie.id;
        self.cookies.push(cookie);
        self.send_announcement(id, now);
    }

    fn send_probe(&mut self, id: CookieId, now: Instant) {
        let Some(idx) = self.cookie_index(id) else {
            return;
        };
        if self.cookies[idx].kind != CookieKind::Probe {
            return;
        }

        self.cookies[idx].status = CookieStatus::Active;
        if self.cookies[idx].count > 0 {
            self.cookies[idx].count -= 1;
            self.cookies[idx].timeout = self.config.cookie_timeout;
            self.cookies[idx].next_send = Some(now + PROBE_INTERVAL);

            match build_probe_packet(&self.cookies[idx]) {
                Ok(bytes) => {
                    log::trace!("sent probe for {} name(s)", self.cookies[idx].questions.len());
                    self.queue_multicast(bytes, now);
                }
                Err(err) => log::error!("failed to pack probe packet: {err}"),
            }
        } else {
            // Three probes went unchallenged: the records are verified.
            // Flip the cookie over to announcing.
            let records = self.cookies[idx].answers.clone();
            if let Some(hostname) = self.store.mark_probed(&records) {
                log::info!("hostname verified: {hostname}");
                self.hostname = Some(hostname);
            }

            let cookie = &mut self.cookies[idx];
            cookie.kind = CookieKind::Announce;
            cookie.count = self.config.announce_count;
            cookie.initial_count = self.config.announce_count;
            cookie.questions.clear();
            cookie.next_send = None;
            self.send_announcement(id, now);
        }
    }

    fn send_announcement(&mut self, id: CookieId, now: Instant) {
        let Some(idx) = self.cookie_index(id) else {
            return;
        };
        if self.cookies[idx].kind != CookieKind::Announce || self.cookies[idx].count == 0 {
            return;
        }

        self.cookies[idx].status = CookieStatus::Active;
        self.cookies[idx].count -= 1;
        self.cookies[idx].timeout = self.config.cookie_timeout;

        // Announcements go through the full response path so they carry the
        // same additional records (NSEC, service metadata) as answers.
        let answers = self.cookies[idx].answers.clone();
        self.send_response(answers, None, now);

        let Some(idx) = self.cookie_index(id) else {
            return;
        };
        if self.cookies[idx].count == 0 {
            self.cookies[idx].status = CookieStatus::Inactive;
            let records = self.cookies[idx].answers.clone();
            self.remove_cookie(id);

            for (claim_id, session) in self.store.mark_claimed(&records) {
                log::debug!("claim session {claim_id} completed");
                self.event_outs
                    .push_back(MdnsEvent::ClaimCompleted(claim_id, session));
            }
        } else {
            // Interval doubles with every announcement, starting at one
            // second (RFC 6762 §8.3).
            let cookie = &mut self.cookies[idx];
            let k = (cookie.initial_count - cookie.count - 1) as u32;
            cookie.next_send = Some(now + ANNOUNCE_INTERVAL * 2u32.pow(k));
        }
    }

    fn send_query(&mut self, id: CookieId, now: Instant) {
        let Some(idx) = self.cookie_index(id) else {
            return;
        };
        if self.cookies[idx].kind != CookieKind::Query {
            return;
        }

        if self.cookies[idx].status == CookieStatus::Cancelled {
            // Another host already has an identical question in flight;
            // its answer will be multicast anyway.
            log::trace!("duplicate query suppressed");
            self.remove_cookie(id);
            return;
        }

        self.cookies[idx].status = CookieStatus::Active;
        self.cookies[idx].count = self.cookies[idx].count.saturating_sub(1);
        self.cookies[idx].next_send = None;

        match build_query_packet(&self.cookies[idx]) {
            Ok(bytes) => self.queue_multicast(bytes, now),
            Err(err) => log::error!("failed to pack query packet: {err}"),
        }
    }

    fn start_query(&mut self, name: Name, typ: DnsType, origin: CookieOrigin, now: Instant) {
        let delay =
            Duration::from_millis(QUERY_JITTER_MIN_MS + rand::random::<u64>() % QUERY_JITTER_SPREAD_MS);
        let cookie = Cookie {
            id: self.alloc_cookie_id(),
            kind: CookieKind::Query,
            status: CookieStatus::Inactive,
            origin,
            questions: vec![CookieQuestion {
                name,
                typ,
                unicast_response: false,
            }],
            answers: vec![],
            count: 1,
            initial_count: 1,
            timeout: self.config.cookie_timeout,
            next_send: Some(now + delay),
        };
        self.cookies.push(cookie);
    }

    // MARK: inbound packets

    fn process_message(&mut self, msg: &TaggedBytesMut) {
        let mut m = Message::default();
        if let Err(err) = m.unpack(&msg.message) {
            // Malformed packets are a fact of life on a multicast segment;
            // drop them without surfacing an error (RFC 6762 §18.3).
            log::debug!("dropping undecodable mDNS packet: {err}");
            return;
        }

        // Non-zero opcodes and response codes must be silently ignored
        // (RFC 6762 §18.3, §18.11).
        if m.header.op_code != 0 || m.header.rcode != RCode::Success {
            log::debug!("dropping mDNS packet with non-zero opcode/rcode");
            return;
        }

        let peer = msg.transport.peer_addr;
        if !m.questions.is_empty() {
            if !m.authorities.is_empty() {
                // A query carrying authority records is a competing probe.
                self.handle_probe_packet(&m, peer, msg.now);
            } else {
                self.handle_query_packet(&m, peer, msg.now);
            }
        } else if !m.answers.is_empty() {
            self.handle_response_packet(&m, msg.now);
        }
    }

    // A plain query: gather answers, strip the ones the querier already
    // knows, respond.
    fn handle_query_packet(&mut self, m: &Message, peer: SocketAddr, now: Instant) {
        let mut answers = self.answers_for_questions(&m.questions);

        // Known-answer suppression (RFC 6762 §7.1): the peer listed what it
        // already has; drop byte-identical records from our reply.
        for res in &m.answers {
            if let Some(known) = MdnsRecord::from_resource(res) {
                answers.retain(|r| {
                    !(r.typ == known.typ
                        && r.rdata == known.rdata
                        && r.name.equal_fold(&known.name))
                });
            }
        }

        if answers.is_empty() {
            log::trace!("no records to answer with");
            return;
        }
        self.send_response(answers, Some(peer), now);
    }

    // A competing probe: answer what we can authoritatively, and run
    // simultaneous-probe tiebreaking against our own in-flight probes.
    fn handle_probe_packet(&mut self, m: &Message, peer: SocketAddr, now: Instant) {
        let answers = self.answers_for_questions(&m.questions);

        for res in &m.authorities {
            if let Some(peer_record) = MdnsRecord::from_resource(res) {
                self.apply_tiebreak(&peer_record, now);
            }
        }

        if !answers.is_empty() {
            self.send_response(answers, Some(peer), now);
        }
    }

    fn handle_response_packet(&mut self, m: &Message, now: Instant) {
        for res in &m.answers {
            if let Some(record) = MdnsRecord::from_resource(res) {
                self.handle_single_answer(record, now);
            }
        }
    }

    // Gathers candidate answers for a question set: verified records
    // matching name (and type, unless ANY), flagged for unicast reply when
    // the question requests it.
    fn answers_for_questions(&mut self, questions: &[Question]) -> Vec<MdnsRecord> {
        let mut answers: Vec<MdnsRecord> = vec![];
        for question in questions {
            log::trace!("question received for {}", question.name);

            // Somebody else is asking the same thing we were about to ask:
            // our own pending query becomes redundant.
            let mut duplicate = false;
            for cookie in &mut self.cookies {
                if cookie.kind == CookieKind::Query && cookie.contains_name(&question.name) {
                    cookie.status = CookieStatus::Cancelled;
                    duplicate = true;
                }
            }
            if duplicate {
                continue;
            }

            let matches = if question.typ == DnsType::All {
                self.store.find_name(&question.name)
            } else {
                self.store.find_name_type(&question.name, question.typ)
            };

            let unicast_requested = question.class.msb_set();
            for mut record in matches {
                // Only verified records may be answered.
                if !record.probed {
                    continue;
                }
                if unicast_requested {
                    record.send_unicast = true;
                }
                if !answers.iter().any(|a| a.key() == record.key()) {
                    answers.push(record);
                }
            }
        }
        answers
    }

    // Simultaneous Probe Tiebreaking (RFC 6762 §8.2): when a peer probes a
    // name we are also probing, the lexicographically later record keeps
    // probing and the other host defers for one second.
    fn apply_tiebreak(&mut self, peer_record: &MdnsRecord, now: Instant) {
        let Some(idx) = self.cookies.iter().position(|c| {
            c.kind == CookieKind::Probe
                && c.status == CookieStatus::Active
                && c.contains_name(&peer_record.name)
        }) else {
            return;
        };

        self.cookies[idx].status = CookieStatus::Inactive;

        let mine = self
            .store
            .find_name_type(&peer_record.name, peer_record.typ)
            .into_iter()
            .find(|r| r.probing);
        let Some(mine) = mine else {
            // The peer probes a type we don't carry under this name; not a
            // tiebreak we participate in.
            self.cookies[idx].status = CookieStatus::Active;
            return;
        };

        if mine.lexi_later_than(peer_record) {
            log::debug!("tiebreak for {} won, probing continues", peer_record.name);
            self.cookies[idx].status = CookieStatus::Active;
        } else {
            log::debug!("tiebreak for {} lost, deferring probe", peer_record.name);
            let cookie = &mut self.cookies[idx];
            cookie.count = PROBE_COUNT;
            cookie.timeout = self.config.cookie_timeout;
            cookie.next_send = Some(now + PROBE_DEFER_INTERVAL);
        }
    }

    fn handle_single_answer(&mut self, record: MdnsRecord, now: Instant) {
        log::trace!("answer received for {}", record.name);

        let cookie_idx = self.cookies.iter().position(|c| {
            matches!(c.kind, CookieKind::Probe | CookieKind::Query)
                && c.contains_name(&record.name)
        });

        if let Some(idx) = cookie_idx {
            match self.cookies[idx].kind {
                CookieKind::Probe if self.cookies[idx].status == CookieStatus::Active => {
                    // An authoritative answer for a name we are still
                    // probing: the name is taken.
                    self.resolve_cookie_conflict(idx, &record.name, now);
                }
                CookieKind::Query => {
                    let wanted = {
                        let q = &self.cookies[idx].questions[0];
                        q.typ == DnsType::All || q.typ == record.typ
                    };
                    if wanted {
                        let id = self.cookies[idx].id;
                        if let CookieOrigin::Query(query_id) = self.cookies[idx].origin {
                            self.event_outs
                                .push_back(MdnsEvent::RecordsResolved(query_id, vec![record.clone()]));
                        }
                        self.remove_cookie(id);
                    }
                }
                _ => {}
            }
        } else {
            // Unsolicited answer. A peer advertising different rdata under a
            // name and type we have verified is a passive conflict; our own
            // data echoed back is not.
            let owned = self.store.find_name_type(&record.name, record.typ);
            let echoes_ours = owned.iter().any(|r| r.rdata == record.rdata);
            let conflict = !echoes_ours
                && owned
                    .iter()
                    .any(|r| r.kind == RecordKind::Unique && !r.probing && r.probed);
            if conflict {
                log::info!("passive conflict for {}", record.name);
                self.resolve_record_conflict(&record.name, now);
            }
        }

        self.cache.add(record);
    }

    // MARK: conflict resolution

    // Conflict during an active probe: pull the name out of the cookie,
    // rename, re-enter the pipeline as a reclaim.
    fn resolve_cookie_conflict(&mut self, idx: usize, conflict_name: &Name, now: Instant) {
        log::info!("probe conflict for {conflict_name}");

        let id = self.cookies[idx].id;
        {
            let cookie = &mut self.cookies[idx];
            cookie.questions.retain(|q| !q.name.equal_fold(conflict_name));
            cookie.answers.retain(|r| !r.name.equal_fold(conflict_name));
            if cookie.questions.is_empty() {
                self.remove_cookie(id);
            }
        }

        self.resolve_record_conflict(conflict_name, now);
    }

    // Renames every unique record under the conflicting name and restarts
    // their claim lifecycle under the original claim sessions.
    fn resolve_record_conflict(&mut self, conflict_name: &Name, now: Instant) {
        let new_name = match self.store.rename_candidate(conflict_name) {
            Ok(name) => name,
            Err(err) => {
                // No usable name can be derived; give the records up rather
                // than fight an unwinnable conflict.
                log::warn!("cannot derive a new name for {conflict_name}: {err}");
                self.store.del_name(conflict_name);
                return;
            }
        };

        let old_records = self.store.take_name_unique(conflict_name);
        if old_records.is_empty() {
            return;
        }

        log::info!("renaming {conflict_name} -> {new_name}");
        let renamed: Vec<MdnsRecord> = old_records
            .iter()
            .map(|r| r.clone_with_name(&new_name))
            .collect();
        self.reclaim(renamed, now);
    }

    // MARK: response assembly

    // Assembles and queues a response: gathers auxiliary records (service
    // metadata, NSEC negative answers), splits the answers into unicast and
    // multicast destinations and transmits each.
    fn send_response(&mut self, answers: Vec<MdnsRecord>, peer: Option<SocketAddr>, now: Instant) {
        if answers.is_empty() {
            return;
        }

        let mut answers = answers;
        let mut additionals: Vec<MdnsRecord> = vec![];

        // For every SRV answer, attach the service discovery metadata.
        let srv_answers: Vec<MdnsRecord> = answers
            .iter()
            .filter(|r| r.typ == DnsType::Srv)
            .cloned()
            .collect();
        for srv in &srv_answers {
            self.gather_service_meta(srv, &mut answers, &mut additionals);
        }

        // Every unique record in the response gets an NSEC additional
        // listing the other types registered under its name.
        let unique_names: Vec<Name> = answers
            .iter()
            .chain(additionals.iter())
            .filter(|r| r.kind == RecordKind::Unique)
            .map(|r| r.name.clone())
            .collect();
        for name in &unique_names {
            self.add_nsec(name, &mut additionals);
        }

        let (unicast, multicast): (Vec<MdnsRecord>, Vec<MdnsRecord>) = answers
            .into_iter()
            .partition(|r| r.send_unicast && peer.is_some());

        if !unicast.is_empty()
            && let Some(peer) = peer
        {
            match build_response_packet(&unicast, &additionals) {
                Ok(bytes) => self.queue_unicast(bytes, peer, now),
                Err(err) => log::error!("failed to pack unicast response: {err}"),
            }
        }

        if !multicast.is_empty() {
            match build_response_packet(&multicast, &additionals) {
                Ok(bytes) => self.queue_multicast(bytes, now),
                Err(err) => log::error!("failed to pack multicast response: {err}"),
            }
        }
    }

    // A service answer carries more than the SRV record: the hostname
    // address records as additionals, plus the service PTR and the
    // `_services._dns-sd._udp.local` enumeration PTR as answers. The
    // synthesised PTRs are shared records, pre-verified and pre-claimed, and
    // adopted into the store so later queries hit them directly.
    fn gather_service_meta(
        &mut self,
        srv: &MdnsRecord,
        answers: &mut Vec<MdnsRecord>,
        additionals: &mut Vec<MdnsRecord>,
    ) {
        for host in self.store.hostname_records() {
            push_unique(additionals, host);
        }

        let instance = srv.name.url();
        let Some((_, service)) = instance.split_once('.') else {
            return;
        };
        if service.is_empty() {
            return;
        }

        let ptr = MdnsRecord::ptr(service, &instance, srv.ttl, RecordKind::Shared);
        let meta = MdnsRecord::ptr(SERVICE_META_NAME, service, srv.ttl, RecordKind::Shared);
        let (Ok(mut ptr), Ok(mut meta)) = (ptr, meta) else {
            log::warn!("could not build service metadata for {instance}");
            return;
        };
        for record in [&mut ptr, &mut meta] {
            record.probed = true;
            record.claimed = true;
        }

        push_unique(answers, meta.clone());
        push_unique(answers, ptr.clone());
        self.store.adopt(ptr);
        self.store.adopt(meta);
    }

    // Attaches an NSEC record listing the unique types registered under
    // name, reusing an NSEC already gathered for the same name.
    fn add_nsec(&mut self, name: &Name, additionals: &mut Vec<MdnsRecord>) {
        if additionals
            .iter()
            .any(|r| r.typ == DnsType::Nsec && r.name.equal_fold(name))
        {
            return;
        }

        let types = self.store.unique_types_for(name);
        if types.is_empty() {
            return;
        }

        let body = NsecResource {
            next_domain: name.clone(),
            types,
        };
        let rdata = match body.pack(Vec::new(), &mut None, 0) {
            Ok(rdata) => rdata,
            Err(err) => {
                log::warn!("could not build NSEC bitmap for {name}: {err}");
                return;
            }
        };

        match MdnsRecord::new(
            &name.url(),
            rdata,
            DnsType::Nsec,
            self.config.service_ttl,
            RecordKind::Unique,
        ) {
            Ok(nsec) => additionals.push(nsec),
            Err(err) => log::warn!("could not build NSEC record for {name}: {err}"),
        }
    }

    // MARK: tick driver

    fn drive(&mut self, now: Instant) {
        // Transmissions first, in deadline order; each send either advances
        // its cookie's deadline or removes the cookie.
        loop {
            let due = self
                .cookies
                .iter()
                .filter(|c| matches!(c.next_send, Some(t) if t <= now))
                .min_by_key(|c| c.next_send)
                .map(|c| (c.id, c.kind));
            let Some((id, kind)) = due else {
                break;
            };
            match kind {
                CookieKind::Probe => self.send_probe(id, now),
                CookieKind::Announce => self.send_announcement(id, now),
                CookieKind::Query => self.send_query(id, now),
            }
        }

        // Then the housekeeping tick: cache aging, cookie timeout aging.
        while let Some(tick) = self.next_tick
            && tick <= now
        {
            self.tick(now);
            self.next_tick = Some(tick + TICK_INTERVAL);
        }
    }

    fn tick(&mut self, now: Instant) {
        for (name, typ) in self.cache.tick() {
            // Reconfirm an entry nearing expiry; nobody is waiting on the
            // result, the answer just refreshes the cache.
            self.start_query(name, typ, CookieOrigin::Refresh, now);
        }

        let mut expired: Vec<CookieId> = vec![];
        for cookie in &mut self.cookies {
            cookie.timeout = cookie.timeout.saturating_sub(1);
            if cookie.timeout == 0 {
                expired.push(cookie.id);
            }
        }

        for id in expired {
            let Some(idx) = self.cookie_index(id) else {
                continue;
            };
            let cookie = self.cookies.remove(idx);
            log::debug!("exchange timed out");
            match cookie.origin {
                CookieOrigin::Query(query_id) => {
                    self.event_outs.push_back(MdnsEvent::QueryTimeout(query_id));
                }
                CookieOrigin::Refresh => {}
                CookieOrigin::Claim => {
                    // Unstick the records so a later claim can retry, then
                    // fail every session the cookie carried.
                    self.store.clear_probing(&cookie.answers);
                    let mut claim_ids: Vec<ClaimId> = vec![];
                    for record in &cookie.answers {
                        if record.claim_id != 0 && !claim_ids.contains(&record.claim_id) {
                            claim_ids.push(record.claim_id);
                        }
                    }
                    for claim_id in claim_ids {
                        self.event_outs.push_back(MdnsEvent::ClaimFailed(claim_id));
                    }
                }
            }
        }
    }

    // MARK: transmit queue

    fn queue_multicast(&mut self, bytes: Vec<u8>, now: Instant) {
        self.write_outs.push_back(TransportMessage {
            now,
            transport: TransportContext {
                local_addr: SocketAddr::new(IpAddr::V4(self.config.bind_address), MDNS_PORT),
                peer_addr: MDNS_DEST_ADDR,
                transport_protocol: TransportProtocol::UDP,
                ecn: None,
            },
            message: BytesMut::from(&bytes[..]),
        });
    }

    fn queue_unicast(&mut self, bytes: Vec<u8>, peer: SocketAddr, now: Instant) {
        self.write_outs.push_back(TransportMessage {
            now,
            transport: TransportContext {
                local_addr: SocketAddr::new(IpAddr::V4(self.config.bind_address), MDNS_PORT),
                peer_addr: peer,
                transport_protocol: TransportProtocol::UDP,
                ecn: None,
            },
            message: BytesMut::from(&bytes[..]),
        });
    }
}

// Probes are queries: questions plus the candidate records as authorities,
// with the cache-flush bit cleared since nothing is verified yet.
fn build_probe_packet(cookie: &Cookie) -> Result<Vec<u8>> {
    let mut msg = Message::default();
    for q in &cookie.questions {
        let class = if q.unicast_response {
            DNSCLASS_INET.with_msb()
        } else {
            DNSCLASS_INET
        };
        msg.questions.push(Question {
            name: q.name.clone(),
            typ: q.typ,
            class,
        });
    }
    for record in &cookie.answers {
        msg.authorities.push(record.to_resource(false));
    }
    msg.pack()
}

fn build_query_packet(cookie: &Cookie) -> Result<Vec<u8>> {
    let mut msg = Message::default();
    for q in &cookie.questions {
        let class = if q.unicast_response {
            DNSCLASS_INET.with_msb()
        } else {
            DNSCLASS_INET
        };
        msg.questions.push(Question {
            name: q.name.clone(),
            typ: q.typ,
            class,
        });
    }
    msg.pack()
}

// Responses are authoritative; the RD bit stays cleared and the id stays 0
// (RFC 6762 §18.1, §18.6). Unique records carry the cache-flush bit.
fn build_response_packet(answers: &[MdnsRecord], additionals: &[MdnsRecord]) -> Result<Vec<u8>> {
    let mut msg = Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        ..Default::default()
    };
    for record in answers {
        msg.answers
            .push(record.to_resource(record.kind == RecordKind::Unique));
    }
    for record in additionals {
        msg.additionals
            .push(record.to_resource(record.kind == RecordKind::Unique));
    }
    msg.pack()
}

fn push_unique(records: &mut Vec<MdnsRecord>, record: MdnsRecord) {
    if !records.iter().any(|r| r.key() == record.key()) {
        records.push(record);
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for Mdns {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = MdnsEvent;
    type Error = Error;
    type Time = Instant;

    /// Processes an incoming mDNS packet: questions are answered from the
    /// record store, competing probes are tiebroken, answers are matched
    /// against in-flight exchanges and cached.
    ///
    /// Malformed packets are dropped silently; only a closed engine returns
    /// an error.
    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.process_message(&msg);
        Ok(())
    }

    /// mDNS doesn't produce read outputs; answers surface as events.
    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    /// Writes are initiated through [`Mdns::claim`] and
    /// [`Mdns::get_record`] instead of this interface.
    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    /// Returns the next packet to transmit. The destination (multicast
    /// group or unicast peer) is in `transport.peer_addr`.
    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    /// External events are not used.
    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    /// Returns the next completion event.
    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    /// Advances every exchange whose transmission deadline has passed and
    /// runs the housekeeping tick (cache TTL aging, cookie timeouts) when
    /// due.
    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.drive(now);
        Ok(())
    }

    /// The earliest deadline among scheduled transmissions and the
    /// housekeeping tick.
    fn poll_timeout(&mut self) -> Option<Self::Time> {
        let mut timeout = self.next_tick;
        for cookie in &self.cookies {
            if let Some(deadline) = cookie.next_send
                && timeout.is_none_or(|t| deadline < t)
            {
                timeout = Some(deadline);
            }
        }
        timeout
    }

    /// Tears the engine down: every table, queue and deadline is cleared,
    /// which also cancels every scheduled transmission at once.
    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.store.clear();
        self.cache.clear();
        self.cookies.clear();
        self.write_outs.clear();
        self.event_outs.clear();
        self.next_tick = None;
        self.hostname = None;
        Ok(())
    }
}
