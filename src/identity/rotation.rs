use crate::config::Config;
use crate::identity::{
    ControlClient, ControlError, IdentityEpoch, PublicIpChecker, SharedIdentity,
    TransportSettings,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Replaces the network identity under a live crawl
///
/// Rotations are serialized; a caller that arrives while one is running
/// waits for it and then performs its own.
pub struct RotationController {
    identity: Arc<SharedIdentity>,
    control: ControlClient,
    settings: TransportSettings,
    settle_delay: Duration,
    ip_checker: Option<PublicIpChecker>,
    rotating: Mutex<()>,
    completed: AtomicU64,
}

impl RotationController {
    pub fn new(
        identity: Arc<SharedIdentity>,
        control: ControlClient,
        settings: TransportSettings,
        settle_delay: Duration,
    ) -> Self {
        Self {
            identity,
            control,
            settings,
            settle_delay,
            ip_checker: None,
            rotating: Mutex::new(()),
            completed: AtomicU64::new(0),
        }
    }

    /// `Err(ControlError::NotConfigured)` when no control address is set
    pub fn from_config(
        identity: Arc<SharedIdentity>,
        config: &Config,
    ) -> Result<Self, ControlError> {
        let control = ControlClient::from_config(&config.proxy).ok_or(ControlError::NotConfigured)?;
        Ok(Self::new(
            identity,
            control,
            TransportSettings::from_config(config),
            config.proxy.settle_delay(),
        ))
    }

    /// Logs the exit IP through the new crawl client after each rotation
    pub fn with_ip_checker(mut self, checker: PublicIpChecker) -> Self {
        self.ip_checker = Some(checker);
        self
    }

    pub fn identity(&self) -> &Arc<SharedIdentity> {
        &self.identity
    }

    /// Number of successful rotations so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Requests a new circuit and swaps in clients for it
    ///
    /// Returns the new epoch's generation. On any error the current epoch
    /// stays in place.
    pub async fn rotate(&self) -> Result<u64, ControlError> {
        let _serial = self.rotating.lock().await;

        tracing::info!("Requesting new identity from {}", self.control.address());
        self.control.signal_newnym().await?;
        tokio::time::sleep(self.settle_delay).await;

        // The SOCKS address is unchanged; only the circuit behind it is new
        let generation = self.identity.generation() + 1;
        let epoch =
            IdentityEpoch::build(generation, &self.settings).map_err(ControlError::ClientBuild)?;

        let previous = self.identity.swap(epoch);
        tracing::info!(
            "Identity rotated: generation {} -> {}",
            previous.generation(),
            generation
        );
        drop(previous);
        self.completed.fetch_add(1, Ordering::Relaxed);

        if let Some(checker) = &self.ip_checker {
            let client = self.identity.current().crawl_client().clone();
            if let Some(ip) = checker.current_ip(&client).await {
                tracing::info!("Exit IP after rotation: {}", ip);
            }
        }

        Ok(generation)
    }
}

/// Decides when a crawl should rotate its identity
///
/// Two independent triggers: a run of consecutive failures, and a fixed
/// number of requests. A threshold of 0 disables its trigger.
#[derive(Debug)]
pub struct RotationPolicy {
    after_failures: u32,
    after_requests: u32,
    consecutive_failures: AtomicU32,
    requests: AtomicU32,
}

impl RotationPolicy {
    pub fn new(after_failures: u32, after_requests: u32) -> Self {
        Self {
            after_failures,
            after_requests,
            consecutive_failures: AtomicU32::new(0),
            requests: AtomicU32::new(0),
        }
    }

    /// Counts a successful request; true when the request budget is spent
    pub fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.count_request()
    }

    /// Counts a failed request; true when either trigger fires
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let budget_spent = self.count_request();
        let failing = self.after_failures > 0 && failures >= self.after_failures;
        if failing {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
        failing || budget_spent
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn count_request(&self) -> bool {
        if self.after_requests == 0 {
            return false;
        }
        let requests = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if requests >= self.after_requests {
            self.requests.store(0, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}
