use crate::url::visit_key;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Visit history for one normalized URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Normalized absolute URL (the map key)
    pub url: String,

    /// Number of recorded visits; never decreases within a session
    pub visit_count: u32,

    /// When the most recent visit was recorded
    pub last_visited_at: DateTime<Utc>,
}

/// Concurrency-safe per-URL visit counter with a revisit cap
///
/// Writers (visit recording) take the exclusive lock; readers (should-visit
/// checks, aggregates) take the shared lock. The map only holds counters, so
/// a poisoned lock is recovered rather than propagated.
#[derive(Debug)]
pub struct VisitTracker {
    max_visits: u32,
    records: RwLock<HashMap<String, UrlRecord>>,
}

impl VisitTracker {
    /// Creates a tracker allowing each URL to be visited `max_visits` times
    pub fn new(max_visits: u32) -> Self {
        Self {
            max_visits,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configured revisit cap
    pub fn max_visits(&self) -> u32 {
        self.max_visits
    }

    /// Returns true while the URL's visit count is below the cap
    pub fn should_visit(&self, url: &str) -> bool {
        let key = visit_key(url);
        self.read()
            .get(&key)
            .map_or(true, |r| r.visit_count < self.max_visits)
    }

    /// Increments the visit count, creating the record on first sighting
    ///
    /// # Returns
    ///
    /// The visit count after this visit
    pub fn record_visit(&self, url: &str) -> u32 {
        let key = visit_key(url);
        let mut records = self.write();
        Self::bump(&mut records, key)
    }

    /// Checks the cap and records a visit under a single exclusive lock
    ///
    /// Two workers racing on the same URL at `max_visits - 1` cannot both
    /// be admitted, which `should_visit` followed by `record_visit` allows.
    ///
    /// # Returns
    ///
    /// * `true` - The visit was recorded and the caller may proceed
    /// * `false` - The URL is already at its cap; nothing was recorded
    pub fn try_claim(&self, url: &str) -> bool {
        let key = visit_key(url);
        let mut records = self.write();
        if let Some(record) = records.get(&key) {
            if record.visit_count >= self.max_visits {
                return false;
            }
        }
        Self::bump(&mut records, key);
        true
    }

    /// Returns the number of recorded visits for a URL
    pub fn visit_count(&self, url: &str) -> u32 {
        let key = visit_key(url);
        self.read().get(&key).map_or(0, |r| r.visit_count)
    }

    /// Returns a snapshot of the record for a URL
    pub fn record(&self, url: &str) -> Option<UrlRecord> {
        let key = visit_key(url);
        self.read().get(&key).cloned()
    }

    /// Total visits across every URL
    pub fn total_visits(&self) -> u64 {
        self.read().values().map(|r| u64::from(r.visit_count)).sum()
    }

    /// Number of distinct URLs seen
    pub fn unique_url_count(&self) -> usize {
        self.read().len()
    }

    fn bump(records: &mut HashMap<String, UrlRecord>, key: String) -> u32 {
        let now = Utc::now();
        let record = records.entry(key).or_insert_with_key(|k| UrlRecord {
            url: k.clone(),
            visit_count: 0,
            last_visited_at: now,
        });
        record.visit_count = record.visit_count.saturating_add(1);
        record.last_visited_at = now;
        record.visit_count
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, UrlRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, UrlRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
