//! Bounded in-memory history of successful measurements.

use super::runner::SpeedTestResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Oldest entries are evicted beyond this many
pub const MAX_HISTORY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub ping: Option<f64>,
    pub download: Option<f64>,
    pub upload: Option<f64>,
}

impl From<&SpeedTestResult> for SpeedTestHistoryEntry {
    fn from(result: &SpeedTestResult) -> Self {
        Self {
            timestamp: result.timestamp,
            ping: result.ping,
            download: result.download,
            upload: result.upload,
        }
    }
}

pub struct SpeedTestHistory {
    entries: RwLock<VecDeque<SpeedTestHistoryEntry>>,
    capacity: usize,
}

impl Default for SpeedTestHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl SpeedTestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(MAX_HISTORY))),
            capacity,
        }
    }

    /// Append a result; unsuccessful results are ignored
    ///
    /// # Returns
    ///
    /// * `bool` - Whether the result was recorded
    pub async fn add(&self, result: &SpeedTestResult) -> bool {
        if !result.success {
            return false;
        }

        let mut entries = self.entries.write().await;
        entries.push_back(SpeedTestHistoryEntry::from(result));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        log::debug!("Speedtest history now holds {} entries", entries.len());
        true
    }

    /// Copy of all entries, oldest first
    pub async fn list(&self) -> Vec<SpeedTestHistoryEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        log::info!("Cleared speedtest history");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
