//! Crawl frontier
//!
//! URLs waiting to be fetched, ordered breadth-first: shallower tasks are
//! popped before deeper ones, and ties are broken by insertion order so
//! seeds are processed in the order given. Politeness (per-host spacing and
//! parallelism) lives in `state::DomainLimiter`, not here.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use url::Url;

/// A URL queued for fetching
#[derive(Debug, Clone)]
pub struct CrawlTask {
    /// The URL to fetch
    pub url: Url,

    /// Link distance from the seed that led here (seeds are 0)
    pub depth: u32,

    /// Insertion sequence number
    sequence: u64,
}

impl CrawlTask {
    pub fn new(url: Url, depth: u32) -> Self {
        Self {
            url,
            depth,
            sequence: 0,
        }
    }
}

// Lower depth, then lower sequence, pops first from the max-heap
impl Ord for CrawlTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for CrawlTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CrawlTask {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.sequence == other.sequence
    }
}

impl Eq for CrawlTask {}

/// Priority queue of discovered-but-unprocessed URLs
#[derive(Debug, Default)]
pub struct Frontier {
    queue: BinaryHeap<CrawlTask>,
    next_sequence: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task, stamping it with the next sequence number
    pub fn push(&mut self, mut task: CrawlTask) {
        task.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(task);
    }

    pub fn pop(&mut self) -> Option<CrawlTask> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(path: &str, depth: u32) -> CrawlTask {
        CrawlTask::new(
            Url::parse(&format!("https://libgen.li{}", path)).unwrap(),
            depth,
        )
    }

    #[test]
    fn test_new_frontier_is_empty() {
        let mut frontier = Frontier::new();
        assert!(frontier.is_empty());
        assert_eq!(frontier.len(), 0);
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_shallower_tasks_first() {
        let mut frontier = Frontier::new();
        frontier.push(task("/deep", 2));
        frontier.push(task("/seed", 0));
        frontier.push(task("/child", 1));

        assert_eq!(frontier.pop().unwrap().url.path(), "/seed");
        assert_eq!(frontier.pop().unwrap().url.path(), "/child");
        assert_eq!(frontier.pop().unwrap().url.path(), "/deep");
    }

    #[test]
    fn test_same_depth_is_fifo() {
        let mut frontier = Frontier::new();
        for path in ["/a", "/b", "/c"] {
            frontier.push(task(path, 1));
        }

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop())
            .map(|t| t.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/a", "/b", "/c"]);
    }
}
