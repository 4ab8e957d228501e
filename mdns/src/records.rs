#[cfg(test)]
mod records_test;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::message::name::Name;
use crate::message::resource::opaque::OpaqueResource;
use crate::message::resource::ptr::PtrResource;
use crate::message::resource::srv::SrvResource;
use crate::message::resource::txt::TxtResource;
use crate::message::resource::{Resource, ResourceBody, ResourceHeader};
use crate::message::{DNSCLASS_INET, DnsClass, DnsType};
use shared::error::*;

/// Identifier shared by all records submitted in one claim call. The claim
/// session completes as a unit: the completion event fires once every record
/// carrying the same id has been claimed.
pub type ClaimId = u64;

/// Whether a record's name is defended as unique on the link or shared
/// between hosts (RFC 6762 §2: unique vs. shared resource record sets).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// The record set must be verified by probing before use and carries the
    /// cache-flush bit when answered.
    Unique,
    /// Multiple hosts may legitimately publish records under this name; no
    /// probing, no cache-flush.
    Shared,
}

/// A resource record owned by or learned by the engine.
///
/// `rdata` always holds canonical (uncompressed) wire bytes, so byte
/// comparison doubles as record identity and as the tiebreak order.
#[derive(Debug, Clone)]
pub struct MdnsRecord {
    pub(crate) name: Name,
    pub(crate) typ: DnsType,
    pub(crate) class: DnsClass,
    pub(crate) ttl: u32,
    pub(crate) rdata: Vec<u8>,
    pub(crate) current_ttl: u32,
    pub(crate) kind: RecordKind,
    pub(crate) probing: bool,
    pub(crate) probed: bool,
    pub(crate) claimed: bool,
    pub(crate) send_unicast: bool,
    pub(crate) hostname: bool,
    pub(crate) claim_id: ClaimId,
}

impl MdnsRecord {
    /// Creates a record from raw rdata bytes. If the rdata embeds DNS names
    /// they must be in uncompressed wire format.
    pub fn new(url: &str, rdata: Vec<u8>, typ: DnsType, ttl: u32, kind: RecordKind) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::ErrNameEmpty);
        }
        let name = Name::new(url)?;
        Ok(Self {
            name,
            typ,
            class: DNSCLASS_INET,
            ttl,
            rdata,
            current_ttl: ttl,
            kind,
            probing: false,
            probed: false,
            claimed: false,
            send_unicast: false,
            hostname: false,
            claim_id: 0,
        })
    }

    /// A unique A record for an IPv4 address.
    pub fn a(url: &str, addr: Ipv4Addr, ttl: u32) -> Result<Self> {
        Self::new(url, addr.octets().to_vec(), DnsType::A, ttl, RecordKind::Unique)
    }

    /// A PTR record pointing at target.
    pub fn ptr(url: &str, target: &str, ttl: u32, kind: RecordKind) -> Result<Self> {
        let body = PtrResource {
            ptr: Name::new(target)?,
        };
        let rdata = body.pack(Vec::new(), &mut None, 0)?;
        Self::new(url, rdata, DnsType::Ptr, ttl, kind)
    }

    /// A unique SRV record advertising a service instance.
    pub fn srv(
        url: &str,
        priority: u16,
        weight: u16,
        port: u16,
        target: &str,
        ttl: u32,
    ) -> Result<Self> {
        let body = SrvResource {
            priority,
            weight,
            port,
            target: Name::new(target)?,
        };
        let rdata = body.pack(Vec::new(), &mut None, 0)?;
        Self::new(url, rdata, DnsType::Srv, ttl, RecordKind::Unique)
    }

    /// A TXT record from a list of character strings.
    pub fn txt(url: &str, entries: &[&str], ttl: u32, kind: RecordKind) -> Result<Self> {
        let body = TxtResource {
            txt: entries.iter().map(|s| (*s).to_owned()).collect(),
        };
        let rdata = body.pack(Vec::new(), &mut None, 0)?;
        Self::new(url, rdata, DnsType::Txt, ttl, kind)
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The record name in URL form (no trailing dot).
    pub fn url(&self) -> String {
        self.name.url()
    }

    pub fn typ(&self) -> DnsType {
        self.typ
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn rdata(&self) -> &[u8] {
        &self.rdata
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_probed(&self) -> bool {
        self.probed
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn claim_id(&self) -> ClaimId {
        self.claim_id
    }

    pub(crate) fn mark_hostname(mut self) -> Self {
        self.hostname = true;
        self
    }

    pub(crate) fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.data.to_ascii_lowercase(),
            typ: self.typ as u16,
            rdata: self.rdata.clone(),
        }
    }

    // A copy under a new name restarts the claim lifecycle but stays in the
    // same claim session.
    pub(crate) fn clone_with_name(&self, name: &Name) -> Self {
        let mut copy = self.clone();
        copy.name = name.clone();
        copy.probing = false;
        copy.probed = false;
        copy.claimed = false;
        copy
    }

    // RFC 6762 §8.2: the lexicographically later record wins a simultaneous
    // probe. Compare class (sans cache-flush bit), then type, then raw rdata
    // bytes, case-sensitively.
    pub(crate) fn lexi_later_than(&self, peer: &MdnsRecord) -> bool {
        (self.class.0, self.typ as u16, &self.rdata) > (peer.class.0, peer.typ as u16, &peer.rdata)
    }

    // Converts an owned record into a wire resource. The cache-flush bit is
    // applied here and only here.
    pub(crate) fn to_resource(&self, cache_flush: bool) -> Resource {
        let class = if cache_flush {
            self.class.with_msb()
        } else {
            self.class
        };
        Resource {
            header: ResourceHeader {
                name: self.name.clone(),
                typ: self.typ,
                class,
                ttl: self.ttl,
                length: 0,
            },
            body: Some(Box::new(OpaqueResource {
                typ: self.typ,
                data: self.rdata.clone(),
            })),
        }
    }

    // Converts a received resource into an engine record, re-serialising the
    // body so rdata is canonical (uncompressed). The wire class MSB becomes
    // the record kind: a cache-flush answer is by definition a unique record.
    pub(crate) fn from_resource(res: &Resource) -> Option<Self> {
        if res.header.typ == DnsType::Unsupported {
            return None;
        }
        let body = res.body.as_ref()?;
        let rdata = body.pack(Vec::new(), &mut None, 0).ok()?;
        let kind = if res.header.class.msb_set() {
            RecordKind::Unique
        } else {
            RecordKind::Shared
        };
        Some(Self {
            name: res.header.name.clone(),
            typ: res.header.typ,
            class: res.header.class.without_msb(),
            ttl: res.header.ttl,
            rdata,
            current_ttl: res.header.ttl,
            kind,
            probing: false,
            probed: false,
            claimed: false,
            send_unicast: false,
            hostname: false,
            claim_id: 0,
        })
    }
}

// Full record identity: case-folded name, type and raw rdata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RecordKey {
    pub(crate) name: String,
    pub(crate) typ: u16,
    pub(crate) rdata: Vec<u8>,
}

/// The set of records this host wants authority over, keyed by full record
/// identity. Group operations scan by name or by name and type.
#[derive(Default)]
pub(crate) struct RecordStore {
    records: BTreeMap<RecordKey, MdnsRecord>,
    next_claim_id: ClaimId,
}

impl RecordStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // add inserts records under a single claim session. Duplicate identities
    // are no-ops. A reclaim keeps each record's existing session id so a
    // rename completes the original claim.
    pub(crate) fn add(&mut self, records: Vec<MdnsRecord>, reclaim: bool) -> ClaimId {
        let claim_id = if reclaim {
            records.first().map(|r| r.claim_id).unwrap_or(0)
        } else {
            self.next_claim_id += 1;
            self.next_claim_id
        };

        for mut record in records {
            // Shared records skip the probing step entirely.
            if record.kind == RecordKind::Shared {
                record.probed = true;
            }
            if !reclaim {
                record.claim_id = claim_id;
            }
            self.records.entry(record.key()).or_insert(record);
        }
        claim_id
    }

    // adopt inserts a synthesised record (service PTR, DNS-SD meta) outside
    // any claim session.
    pub(crate) fn adopt(&mut self, record: MdnsRecord) {
        self.records.entry(record.key()).or_insert(record);
    }

    pub(crate) fn find_name(&self, name: &Name) -> Vec<MdnsRecord> {
        self.records
            .values()
            .filter(|r| r.name.equal_fold(name))
            .cloned()
            .collect()
    }

    pub(crate) fn find_name_type(&self, name: &Name, typ: DnsType) -> Vec<MdnsRecord> {
        self.records
            .values()
            .filter(|r| r.typ == typ && r.name.equal_fold(name))
            .cloned()
            .collect()
    }

    pub(crate) fn has_name(&self, name: &Name) -> bool {
        self.records.values().any(|r| r.name.equal_fold(name))
    }

    // take_name_unique removes and returns the unique records under a name.
    // Shared records never participate in conflict resolution and stay put.
    pub(crate) fn take_name_unique(&mut self, name: &Name) -> Vec<MdnsRecord> {
        let keys: Vec<RecordKey> = self
            .records
            .values()
            .filter(|r| r.kind == RecordKind::Unique && r.name.equal_fold(name))
            .map(|r| r.key())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.records.remove(&k))
            .collect()
    }

    pub(crate) fn del_name(&mut self, name: &Name) {
        self.records.retain(|_, r| !r.name.equal_fold(name));
    }

    // take_to_probe returns copies of every unique record that still needs
    // probing and flips those records into the probing state.
    pub(crate) fn take_to_probe(&mut self) -> Vec<MdnsRecord> {
        let mut out = vec![];
        for record in self.records.values_mut() {
            if record.kind == RecordKind::Unique && !record.probed && !record.probing {
                record.probing = true;
                out.push(record.clone());
            }
        }
        out
    }

    pub(crate) fn probed_not_claimed(&self) -> Vec<MdnsRecord> {
        self.records
            .values()
            .filter(|r| r.probed && !r.claimed)
            .cloned()
            .collect()
    }

    // mark_probed moves the given records from probing to probed and returns
    // the hostname captured from the first hostname-flagged record.
    pub(crate) fn mark_probed(&mut self, records: &[MdnsRecord]) -> Option<String> {
        let mut hostname = None;
        for record in records {
            if let Some(found) = self.records.get_mut(&record.key()) {
                found.probing = false;
                found.probed = true;
                if found.hostname && hostname.is_none() {
                    hostname = Some(found.name.url());
                }
            }
        }
        hostname
    }

    // clear_probing unsticks records whose probe exchange died, so a later
    // claim can retry them.
    pub(crate) fn clear_probing(&mut self, records: &[MdnsRecord]) {
        for record in records {
            if let Some(found) = self.records.get_mut(&record.key()) {
                found.probing = false;
            }
        }
    }

    // mark_claimed sets the claimed flag on the given records and returns
    // every claim session that completed because of it, with the session's
    // full record set.
    pub(crate) fn mark_claimed(&mut self, records: &[MdnsRecord]) -> Vec<(ClaimId, Vec<MdnsRecord>)> {
        let mut candidates: Vec<ClaimId> = vec![];
        for record in records {
            if let Some(found) = self.records.get_mut(&record.key()) {
                let fresh = !found.claimed;
                found.claimed = true;
                if fresh && found.claim_id != 0 && !candidates.contains(&found.claim_id) {
                    candidates.push(found.claim_id);
                }
            }
        }

        let mut completed = vec![];
        for claim_id in candidates {
            let session: Vec<MdnsRecord> = self
                .records
                .values()
                .filter(|r| r.claim_id == claim_id)
                .cloned()
                .collect();
            if session.iter().all(|r| r.claimed) {
                completed.push((claim_id, session));
            }
        }
        completed
    }

    // Hostname address records, once verified, travel as additionals with
    // every service answer.
    pub(crate) fn hostname_records(&self) -> Vec<MdnsRecord> {
        self.records
            .values()
            .filter(|r| r.hostname && r.probed)
            .cloned()
            .collect()
    }

    // Unique record types registered under a name, for NSEC bitmaps.
    pub(crate) fn unique_types_for(&self, name: &Name) -> Vec<u16> {
        let mut types: Vec<u16> = vec![];
        for record in self.records.values() {
            if record.kind == RecordKind::Unique && record.name.equal_fold(name) {
                let t = record.typ as u16;
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        types
    }

    // rename_candidate derives the next non-conflicting name: bump a
    // trailing -<digits> suffix on the first label or start at -2, skipping
    // any candidate that still has live records in the store.
    pub(crate) fn rename_candidate(&self, name: &Name) -> Result<Name> {
        let url = name.url();
        let (first, rest) = match url.split_once('.') {
            Some((first, rest)) => (first, rest),
            None => (url.as_str(), ""),
        };

        let (base, mut n) = match split_conflict_suffix(first) {
            Some((base, n)) => (base, n + 1),
            None => (first, 2),
        };

        loop {
            let candidate_first = format!("{base}-{n}");
            if candidate_first.len() > 63 {
                return Err(Error::ErrSegTooLong);
            }
            let candidate_url = if rest.is_empty() {
                candidate_first
            } else {
                format!("{candidate_first}.{rest}")
            };
            let candidate = Name::new(&candidate_url)?;
            if !self.has_name(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

// Splits "web-2" into ("web", 2). Suffixes longer than 5 digits or with
// leading non-digits don't count.
fn split_conflict_suffix(label: &str) -> Option<(&str, u32)> {
    let pos = label.rfind('-')?;
    let digits = &label[pos + 1..];
    if digits.is_empty() || digits.len() > 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&label[..pos], digits.parse().ok()?))
}
