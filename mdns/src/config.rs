//! Configuration for the mDNS engine.
//!
//! ```rust
//! use mdns::MdnsConfig;
//! use std::net::Ipv4Addr;
//!
//! let config = MdnsConfig::default()
//!     .with_bind_address(Ipv4Addr::new(192, 168, 1, 10))
//!     .with_hostname("myhost.local".to_string());
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

/// Number of probe packets sent before a unique record set is considered
/// verified (RFC 6762 §8.1).
pub(crate) const PROBE_COUNT: u8 = 3;

/// Delay between consecutive probe transmissions.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound of the random delay before the first probe transmission.
pub(crate) const PROBE_JITTER_MS: u64 = 250;

/// How long a simultaneous-probe tiebreak loss defers the next probe
/// (RFC 6762 §8.2).
pub(crate) const PROBE_DEFER_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of unsolicited announcements (RFC 6762 §8.3 requires at
/// least two; one extra for robustness).
pub(crate) const DEFAULT_ANNOUNCE_COUNT: u8 = 3;

/// RFC 6762 §8.3 bounds: at least two announcements, at most eight.
pub(crate) const MIN_ANNOUNCE_COUNT: u8 = 2;
pub(crate) const MAX_ANNOUNCE_COUNT: u8 = 8;

/// Interval before the second announcement; doubles with every transmission
/// after that.
pub(crate) const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Bounds of the random delay before a one-shot query transmission.
pub(crate) const QUERY_JITTER_MIN_MS: u64 = 20;
pub(crate) const QUERY_JITTER_SPREAD_MS: u64 = 120;

/// Period of the housekeeping tick that ages the cache and the cookie
/// table.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default TTL of published records, in seconds.
pub(crate) const DEFAULT_RECORD_TTL: u32 = 120;

/// Default TTL of synthesised service metadata records (PTR/NSEC).
pub(crate) const DEFAULT_SERVICE_TTL: u32 = 120;

/// Default lifetime of an unanswered exchange, in housekeeping ticks.
pub(crate) const DEFAULT_COOKIE_TIMEOUT: u8 = 10;

/// Configuration for an mDNS engine.
///
/// # Fields
///
/// - `bind_address`: IPv4 address advertised in hostname records (required
///   for claiming a hostname)
/// - `hostname`: when set, the engine claims this name at construction
/// - `announce_count`: unsolicited announcements per claim (clamped to 2..=8)
/// - `probe_unicast`: send probe questions as QU-questions
/// - `record_ttl` / `service_ttl`: TTLs for published and synthesised records
/// - `cookie_timeout`: ticks before an unanswered exchange fails
#[derive(Clone, Debug)]
pub struct MdnsConfig {
    /// IPv4 address of this host, advertised in hostname A records.
    pub bind_address: Ipv4Addr,

    /// Hostname to claim at construction. Validated and probed like any
    /// other unique record; `Mdns::hostname` reports it only once claimed.
    pub hostname: Option<String>,

    /// How many unsolicited announcements to send per claim.
    pub announce_count: u8,

    /// Whether probe questions request unicast responses (QU-questions).
    pub probe_unicast: bool,

    /// TTL in seconds for records published by this host.
    pub record_ttl: u32,

    /// TTL in seconds for synthesised service metadata records.
    pub service_ttl: u32,

    /// Housekeeping ticks before an unanswered exchange reports failure.
    pub cookie_timeout: u8,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            hostname: None,
            announce_count: DEFAULT_ANNOUNCE_COUNT,
            probe_unicast: true,
            record_ttl: DEFAULT_RECORD_TTL,
            service_ttl: DEFAULT_SERVICE_TTL,
            cookie_timeout: DEFAULT_COOKIE_TIMEOUT,
        }
    }
}

impl MdnsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the IPv4 address advertised in hostname records.
    pub fn with_bind_address(mut self, addr: Ipv4Addr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the hostname the engine claims at construction.
    pub fn with_hostname(mut self, hostname: String) -> Self {
        self.hostname = Some(hostname);
        self
    }

    /// Set the number of unsolicited announcements per claim. Values outside
    /// 2..=8 are clamped (RFC 6762 §8.3).
    pub fn with_announce_count(mut self, count: u8) -> Self {
        self.announce_count = count.clamp(MIN_ANNOUNCE_COUNT, MAX_ANNOUNCE_COUNT);
        self
    }

    /// Choose whether probes are sent as QU-questions.
    pub fn with_probe_unicast(mut self, probe_unicast: bool) -> Self {
        self.probe_unicast = probe_unicast;
        self
    }

    /// Set the TTL of published records.
    pub fn with_record_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Set the lifetime of unanswered exchanges, in seconds.
    pub fn with_cookie_timeout(mut self, ticks: u8) -> Self {
        self.cookie_timeout = ticks;
        self
    }
}
