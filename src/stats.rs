//! Per-direction latency history.

use std::collections::VecDeque;

use crate::types::{Latency, LatencyRecord};

/// Number of records kept for the bar graph.
pub const HISTORY_SIZE: usize = 500;

/// Capped history for the graph plus an all-time sum for the average.
///
/// The two deliberately disagree once more than [`HISTORY_SIZE`] records have
/// been pushed: eviction from the history never touches the sum, so
/// [`LatencyWindow::mean`] is the mean over the whole run while the graph only
/// shows the most recent records.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    history: VecDeque<LatencyRecord>,
    sum: LatencyRecord,
    count: i64,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyWindow {
    /// Empty window; pre-allocates the full history.
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_SIZE),
            sum: LatencyRecord::default(),
            count: 0,
        }
    }

    /// Appends `record`, evicting the oldest one once the history is full.
    pub fn update(&mut self, record: LatencyRecord) {
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(record);

        self.sum.total += record.total;
        self.sum.client_server += record.client_server;
        self.sum.server_server += record.server_server;
        self.sum.server_client += record.server_client;
        self.count += 1;
    }

    /// Most recent record, `None` before the first update.
    pub fn last(&self) -> Option<LatencyRecord> {
        self.history.back().copied()
    }

    /// Per-field mean over every record ever pushed, truncated to whole
    /// nanoseconds. `None` before the first update.
    pub fn mean(&self) -> Option<LatencyRecord> {
        if self.count == 0 {
            return None;
        }
        let mean = |sum: Latency| sum / self.count;
        Some(LatencyRecord {
            total: mean(self.sum.total),
            client_server: mean(self.sum.client_server),
            server_server: mean(self.sum.server_server),
            server_client: mean(self.sum.server_client),
        })
    }

    /// Total number of records ever pushed, evicted ones included.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Oldest first, at most [`HISTORY_SIZE`] records.
    pub fn history(
        &self,
    ) -> impl DoubleEndedIterator<Item = &LatencyRecord> + ExactSizeIterator + '_ {
        self.history.iter()
    }
}
