//! Shared types: timestamps, signed latencies and the events passed between tasks.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Signed span of time with nanosecond resolution.
///
/// Breakdown segments are derived from two unsynchronized clocks and can come
/// out negative, which `std::time::Duration` cannot represent. All arithmetic
/// saturates: homeservers are free to report absurd timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Latency(i64);

impl Latency {
    pub const ZERO: Latency = Latency(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Saturates at `i64::MAX` nanoseconds (about 292 years).
    pub fn from_duration(duration: Duration) -> Self {
        Self(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Rounds half away from zero to whole milliseconds.
    pub fn round_millis(self) -> i64 {
        let half = if self.0 < 0 { -500_000 } else { 500_000 };
        self.0.saturating_add(half) / 1_000_000
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for Latency {
    type Output = Latency;

    fn add(self, rhs: Latency) -> Latency {
        Latency(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Latency {
    fn add_assign(&mut self, rhs: Latency) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Latency {
    type Output = Latency;

    fn sub(self, rhs: Latency) -> Latency {
        Latency(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for Latency {
    type Output = Latency;

    fn mul(self, rhs: i64) -> Latency {
        Latency(self.0.saturating_mul(rhs))
    }
}

impl Div<i64> for Latency {
    type Output = Latency;

    fn div(self, rhs: i64) -> Latency {
        Latency(self.0.saturating_div(rhs))
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.round_millis())
    }
}

/// Wall-clock instant, nanoseconds since the Unix epoch.
///
/// Readings of the local clock also carry a monotonic reading. The difference
/// of two such readings comes from the monotonic clock, so a wall-clock step
/// between them does not skew it. Any other difference, such as against a
/// server-assigned timestamp, uses the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    unix_nanos: i64,
    monotonic: Option<Instant>,
}

impl Timestamp {
    /// Reads the local wall and monotonic clocks.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            unix_nanos: Latency::from_duration(since_epoch).as_nanos(),
            monotonic: Some(Instant::now()),
        }
    }

    /// A timestamp assigned by a homeserver; wall clock only.
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self {
            unix_nanos: millis.saturating_mul(1_000_000),
            monotonic: None,
        }
    }
}

impl Sub for Timestamp {
    type Output = Latency;

    fn sub(self, rhs: Timestamp) -> Latency {
        match (self.monotonic, rhs.monotonic) {
            (Some(later), Some(earlier)) => match later.checked_duration_since(earlier) {
                Some(elapsed) => Latency::from_duration(elapsed),
                None => Latency::ZERO - Latency::from_duration(earlier - later),
            },
            _ => Latency::from_nanos(self.unix_nanos.saturating_sub(rhs.unix_nanos)),
        }
    }
}

/// One round trip split into its causal segments.
///
/// `client_server + server_server + server_client == total` holds for every
/// record the correlator produces, whatever the signs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyRecord {
    pub total: Latency,
    pub client_server: Latency,
    pub server_server: Latency,
    pub server_client: Latency,
}

impl LatencyRecord {
    pub fn segments(&self) -> [Latency; 3] {
        [self.client_server, self.server_server, self.server_client]
    }
}

/// One of the two accounts taking part in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Participant {
    One,
    Two,
}

impl Participant {
    /// Direction of the messages this participant receives.
    pub fn inbound(self) -> Direction {
        match self {
            Participant::One => Direction::TwoToOne,
            Participant::Two => Direction::OneToTwo,
        }
    }
}

/// Propagation direction of a probe message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by participant one, so it always carries the first sample.
    OneToTwo,
    TwoToOne,
}

/// A message from the counterpart, as observed by one participant's listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub receiver: Participant,
    pub event_id: String,
    /// Local clock, captured as soon as the sync response arrived.
    pub received_at: Timestamp,
    /// Creation time recorded by the sender's homeserver.
    pub origin_ts: Timestamp,
    /// Server-reported relay delay (`unsigned.age`).
    pub age: Latency,
}

/// What the driver hands to the dashboard after each completed round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyUpdate {
    pub direction: Direction,
    pub record: LatencyRecord,
    pub breakdown_valid: bool,
}
