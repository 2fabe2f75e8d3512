//! Bounded in-memory delivery history.

use std::collections::VecDeque;

use chrono::{Duration, Utc};
use parking_lot::RwLock;

use crate::types::{DeliveryLog, DeliveryStatus};

/// Hard cap on retained delivery records.
const MAX_LOGS: usize = 1000;

/// Append-only ring of the most recent delivery records.
///
/// Eviction is strictly oldest-first. Records are immutable once added.
pub struct LogStore {
    logs: RwLock<VecDeque<DeliveryLog>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(VecDeque::with_capacity(MAX_LOGS)),
        }
    }

    /// Append a record, evicting the oldest entries past the cap.
    pub fn add(&self, log: DeliveryLog) {
        let mut logs = self.logs.write();
        logs.push_back(log);
        while logs.len() > MAX_LOGS {
            logs.pop_front();
        }
    }

    /// The newest `limit` records in chronological order. A zero or
    /// oversized limit returns everything retained.
    pub fn get_recent(&self, limit: usize) -> Vec<DeliveryLog> {
        let logs = self.logs.read();
        let limit = if limit == 0 || limit > logs.len() {
            logs.len()
        } else {
            limit
        };
        logs.iter().skip(logs.len() - limit).cloned().collect()
    }

    /// Up to `limit` records for one channel, newest first.
    pub fn get_by_channel(&self, channel_id: &str, limit: usize) -> Vec<DeliveryLog> {
        let logs = self.logs.read();
        logs.iter()
            .rev()
            .filter(|log| log.channel_id == channel_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Up to `limit` records with the given status, newest first.
    pub fn get_by_status(&self, status: DeliveryStatus, limit: usize) -> Vec<DeliveryLog> {
        let logs = self.logs.read();
        logs.iter()
            .rev()
            .filter(|log| log.status == status)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop records older than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        let mut logs = self.logs.write();
        logs.retain(|log| log.created_at > cutoff);
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}
