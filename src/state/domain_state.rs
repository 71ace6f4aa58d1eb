use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Request bookkeeping for a single host
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests started against this host in the session
    pub request_count: u64,

    /// When the most recent request started
    pub last_request_time: Option<Instant>,
}

impl DomainState {
    /// Records that a request was started at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request may start
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min_delay).then(|| min_delay - elapsed)
    }
}

struct DomainSlot {
    permits: Arc<Semaphore>,
    state: AsyncMutex<DomainState>,
}

/// Held while a request to a host is in flight
///
/// Dropping it frees the host's parallelism slot.
pub struct DomainPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Per-host parallelism and request spacing
///
/// Each host gets `parallelism` concurrent slots, and request starts on one
/// host are spaced at least `delay` apart. Hosts never wait on each other.
pub struct DomainLimiter {
    parallelism: usize,
    delay: Duration,
    domains: Mutex<HashMap<String, Arc<DomainSlot>>>,
}

impl DomainLimiter {
    pub fn new(parallelism: usize, delay: Duration) -> Self {
        Self {
            parallelism: parallelism.max(1),
            delay,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for a slot on `domain` and for its spacing delay to elapse
    pub async fn acquire(&self, domain: &str) -> DomainPermit {
        let slot = self.slot(domain);

        // The semaphore is never closed, so acquisition only fails if it were
        let permit = Arc::clone(&slot.permits).acquire_owned().await.ok();

        let mut state = slot.state.lock().await;
        if let Some(wait) = state.time_until_next_request(self.delay, Instant::now()) {
            tracing::trace!("Delaying request to {} by {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }
        state.record_request(Instant::now());

        DomainPermit { _permit: permit }
    }

    /// Snapshot of a host's bookkeeping
    pub async fn state(&self, domain: &str) -> Option<DomainState> {
        let slot = {
            let domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
            domains.get(domain).cloned()
        }?;
        let state = slot.state.lock().await;
        Some(state.clone())
    }

    fn slot(&self, domain: &str) -> Arc<DomainSlot> {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(domains.entry(domain.to_string()).or_insert_with(|| {
            Arc::new(DomainSlot {
                permits: Arc::new(Semaphore::new(self.parallelism)),
                state: AsyncMutex::new(DomainState::default()),
            })
        }))
    }
}
