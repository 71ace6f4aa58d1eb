use crate::state::VisitTracker;

/// Breaks traversal cycles by counting how often a URL is encountered
///
/// A URL may be sighted `threshold` times; later sightings report a loop
/// and the caller stops following it. Sightings are counted independently
/// from visits, since a page is usually linked from many places.
#[derive(Debug)]
pub struct LoopDetector {
    sightings: VisitTracker,
}

impl LoopDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            sightings: VisitTracker::new(threshold),
        }
    }

    /// Returns true if the URL has already been seen `threshold` times
    pub fn check_loop(&self, url: &str) -> bool {
        !self.sightings.should_visit(url)
    }

    /// Records one sighting of the URL
    pub fn inc_visit(&self, url: &str) {
        self.sightings.record_visit(url);
    }

    /// Checks and records a sighting atomically
    ///
    /// # Returns
    ///
    /// * `true` - The URL is still under the threshold and the sighting was counted
    /// * `false` - The URL is looping; nothing was recorded
    pub fn observe(&self, url: &str) -> bool {
        self.sightings.try_claim(url)
    }

    /// Number of sightings recorded for a URL
    pub fn sightings(&self, url: &str) -> u32 {
        self.sightings.visit_count(url)
    }
}
