//! Correlation of sent probes with their echoes.
//!
//! Keeps the send time of every probe still in flight and, when the echo comes
//! back, splits the round trip into client -> server, server -> server and
//! server -> client segments.

use std::collections::HashMap;

use crate::types::{Latency, LatencyRecord, Timestamp};

/// Pending sends plus the breakdown validity latch.
///
/// Owned by the driver task alone, so none of this needs locking.
#[derive(Debug)]
pub struct Correlator {
    pending: HashMap<String, Timestamp>,
    breakdown_valid: bool,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Empty table, breakdown considered valid until proven otherwise.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            breakdown_valid: true,
        }
    }

    /// Remembers when `event_id` was sent. An id that is already pending keeps
    /// its original send time.
    pub fn record_send(&mut self, event_id: impl Into<String>, sent_at: Timestamp) {
        self.pending.entry(event_id.into()).or_insert(sent_at);
    }

    /// Matches an echo against the pending sends.
    ///
    /// # Arguments
    /// * `event_id` - id of the echoed event
    /// * `received_at` - local clock when the sync response carrying it arrived
    /// * `origin_ts` - creation time assigned by the sender's homeserver
    /// * `age` - relay delay reported by the receiver's homeserver
    ///
    /// # Returns
    /// The decomposed round trip, or `None` for orphans (ids this process never
    /// sent, or already matched). Orphans leave all state untouched.
    pub fn record_receive(
        &mut self,
        event_id: &str,
        received_at: Timestamp,
        origin_ts: Timestamp,
        age: Latency,
    ) -> Option<LatencyRecord> {
        let sent_at = self.pending.remove(event_id)?;

        let total = received_at - sent_at;
        let origin_server_client = received_at - origin_ts;

        let record = LatencyRecord {
            total,
            client_server: total - origin_server_client,
            server_server: age,
            server_client: origin_server_client - age,
        };

        // A single non-positive segment means the clocks cannot be trusted, for
        // either direction and for the rest of the run.
        if record.segments().iter().any(|segment| !segment.is_positive()) {
            self.breakdown_valid = false;
        }

        Some(record)
    }

    /// `false` once any segment of any round trip has come out non-positive.
    pub fn breakdown_valid(&self) -> bool {
        self.breakdown_valid
    }

    /// Sends still waiting for their echo.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: i64) -> Latency {
        Latency::from_millis(millis)
    }

    fn at(millis: i64) -> Timestamp {
        Timestamp::from_unix_millis(millis)
    }

    #[test]
    fn valid_round_trip_is_decomposed() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(1000));

        let record = correlator
            .record_receive("$a", at(1150), at(1010), ms(20))
            .expect("pending send");

        assert_eq!(record.total, ms(150));
        assert_eq!(record.client_server, ms(10));
        assert_eq!(record.server_server, ms(20));
        assert_eq!(record.server_client, ms(120));
        assert!(correlator.breakdown_valid());
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn non_positive_segment_drops_the_latch_for_good() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(1000));

        let record = correlator
            .record_receive("$a", at(1150), at(1145), ms(20))
            .expect("pending send");

        assert_eq!(record.client_server, ms(145));
        assert_eq!(record.server_client, ms(-15));
        assert!(!correlator.breakdown_valid());

        correlator.record_send("$b", at(1000));
        correlator.record_receive("$b", at(1150), at(1010), ms(20));
        assert!(!correlator.breakdown_valid());
    }

    #[test]
    fn zero_age_counts_as_invalid() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(0));
        correlator.record_receive("$a", at(100), at(50), Latency::ZERO);
        assert!(!correlator.breakdown_valid());
    }

    #[test]
    fn segments_always_add_up_to_total() {
        let mut correlator = Correlator::new();
        let cases = [
            (1000, 1150, 1010, 20),
            (1000, 1150, 1145, 20),
            (1000, 900, 2000, -50),
            (0, 3, 7, 400),
        ];
        for (i, (sent, received, origin, age)) in cases.into_iter().enumerate() {
            let id = format!("$event{i}");
            correlator.record_send(id.as_str(), at(sent));
            let record = correlator
                .record_receive(&id, at(received), at(origin), ms(age))
                .expect("pending send");
            assert_eq!(
                record.client_server + record.server_server + record.server_client,
                record.total
            );
        }
    }

    #[test]
    fn orphan_echo_changes_nothing() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(1000));

        // would flip the latch if it were matched
        let record = correlator.record_receive("$unknown", at(1150), at(1145), ms(20));

        assert_eq!(record, None);
        assert_eq!(correlator.pending_len(), 1);
        assert!(correlator.breakdown_valid());
    }

    #[test]
    fn echo_is_matched_only_once() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(1000));
        assert!(correlator
            .record_receive("$a", at(1150), at(1010), ms(20))
            .is_some());
        assert!(correlator
            .record_receive("$a", at(1160), at(1010), ms(20))
            .is_none());
    }

    #[test]
    fn duplicate_send_keeps_first_time() {
        let mut correlator = Correlator::new();
        correlator.record_send("$a", at(1000));
        correlator.record_send("$a", at(1100));
        assert_eq!(correlator.pending_len(), 1);

        let record = correlator
            .record_receive("$a", at(1150), at(1010), ms(20))
            .expect("pending send");
        assert_eq!(record.total, ms(150));
    }
}
