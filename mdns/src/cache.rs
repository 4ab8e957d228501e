#[cfg(test)]
mod cache_test;

use std::collections::BTreeMap;

use crate::message::DnsType;
use crate::message::name::Name;
use crate::records::{MdnsRecord, RecordKey, RecordKind};

/// Records learned from peers, aged once per second.
///
/// Entries are keyed by full record identity. An entry whose `current_ttl`
/// reaches zero is evicted; a record arriving with the cache-flush bit set
/// first evicts everything under the same name and type.
#[derive(Default)]
pub(crate) struct Cache {
    entries: BTreeMap<RecordKey, MdnsRecord>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, record: MdnsRecord) {
        // An identical entry only has its TTL refreshed. TTL 0 announces the
        // record's death: keep it for one more tick so late queries see the
        // eviction, then let aging remove it.
        if let Some(found) = self.entries.get_mut(&record.key()) {
            if record.ttl > 0 {
                found.ttl = record.ttl;
                found.current_ttl = record.ttl;
            } else {
                found.ttl = 1;
                found.current_ttl = 1;
            }
            return;
        }

        // The cache-flush bit replaces every record of the same name and
        // type before the fresh entry goes in.
        if record.kind == RecordKind::Unique {
            log::trace!("cache flush for {} {}", record.name, record.typ);
            self.entries
                .retain(|_, r| !(r.typ == record.typ && r.name.equal_fold(&record.name)));
        }

        // A fresh record with TTL 0 is never cached.
        if record.ttl == 0 {
            return;
        }

        let mut record = record;
        record.current_ttl = record.ttl;
        self.entries.insert(record.key(), record);
    }

    pub(crate) fn find_name_type(&self, name: &Name, typ: DnsType) -> Vec<MdnsRecord> {
        self.entries
            .values()
            .filter(|r| (typ == DnsType::All || r.typ == typ) && r.name.equal_fold(name))
            .cloned()
            .collect()
    }

    // tick ages every entry by one second, evicts the expired ones and
    // returns the (name, type) pairs due for a refresh query.
    pub(crate) fn tick(&mut self) -> Vec<(Name, DnsType)> {
        let mut refresh = vec![];

        self.entries.retain(|_, record| {
            record.current_ttl -= 1;
            record.current_ttl > 0
        });

        #[cfg(feature = "continuous-refresh")]
        for record in self.entries.values() {
            if at_refresh_point(record.ttl, record.current_ttl) {
                refresh.push((record.name.clone(), record.typ));
            }
        }

        refresh
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

// Reconfirmation points at 80/85/90/95% of the original TTL, fuzzed by up to
// 2% so a segment full of caches doesn't re-query in lockstep.
#[cfg(feature = "continuous-refresh")]
fn at_refresh_point(original: u32, current: u32) -> bool {
    let rnd = rand::random::<u32>() % 3;
    let elapsed = original - current;
    [80u32, 85, 90, 95]
        .iter()
        .any(|p| elapsed == original * (p + rnd) / 100)
}
