use std::time::Instant;

use crate::message::DnsType;
use crate::message::name::Name;
use crate::proto::QueryId;
use crate::records::MdnsRecord;

pub(crate) type CookieId = u64;

// What an in-flight exchange is for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CookieKind {
    Probe,
    Announce,
    Query,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CookieStatus {
    Inactive,
    Active,
    Cancelled,
}

// Who gets told when the exchange completes or times out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CookieOrigin {
    // Probe/announce exchanges report per claim session, via the claim ids
    // carried by the answer records.
    Claim,
    // A get_record call waiting for an answer.
    Query(QueryId),
    // Internal cache reconfirmation; nobody to notify.
    Refresh,
}

// A question carried by a cookie. The unicast-response preference is kept as
// a flag here and only becomes the class MSB on the wire.
#[derive(Debug, Clone)]
pub(crate) struct CookieQuestion {
    pub(crate) name: Name,
    pub(crate) typ: DnsType,
    pub(crate) unicast_response: bool,
}

// One in-flight protocol exchange: a probe, an announcement or a query.
//
// The send schedule is a plain deadline. Rescheduling overwrites it and
// cancelling clears it, so a dead cookie can never fire a stale
// transmission. `timeout` counts housekeeping ticks; the tick driver deletes
// the cookie when it hits zero.
#[derive(Debug)]
pub(crate) struct Cookie {
    pub(crate) id: CookieId,
    pub(crate) kind: CookieKind,
    pub(crate) status: CookieStatus,
    pub(crate) origin: CookieOrigin,
    pub(crate) questions: Vec<CookieQuestion>,
    pub(crate) answers: Vec<MdnsRecord>,
    pub(crate) count: u8,
    pub(crate) initial_count: u8,
    pub(crate) timeout: u8,
    pub(crate) next_send: Option<Instant>,
}

impl Cookie {
    // A cookie is found again by any of its question names.
    pub(crate) fn contains_name(&self, name: &Name) -> bool {
        self.questions.iter().any(|q| q.name.equal_fold(name))
    }
}
