//! Network identity management
//!
//! An identity epoch is one generation of the anonymizing proxy's circuit
//! together with the HTTP clients bound to it. Crawl and download paths read
//! the current epoch through `SharedIdentity`; `RotationController` asks the
//! proxy for a new circuit and swaps in a freshly built epoch.
//!
//! Readers always receive a whole `Arc<IdentityEpoch>`, so they see either
//! the old pair of clients or the new one, never a mix.

mod control;
mod ip_check;
mod rotation;

pub use control::{ControlClient, ControlError, ControlStep};
pub use ip_check::{parse_ip_response, PublicIpChecker};
pub use rotation::{RotationController, RotationPolicy};

use crate::config::{Config, DownloadConfig};
use crate::download::RedirectSafety;
use reqwest::{redirect::Policy, Client, Proxy};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Maximum redirects followed by the crawl client
const CRAWL_MAX_REDIRECTS: usize = 10;

/// Everything needed to build the clients of an epoch
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// SOCKS5 listen address of the proxy, `None` for direct connections
    pub proxy_address: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub redirect: RedirectSafety,
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            proxy_address: config.proxy.socks_address.clone(),
            user_agent: config.crawler.user_agent.clone(),
            request_timeout: config.crawler.request_timeout(),
            connect_timeout: config.proxy.connect_timeout(),
            redirect: RedirectSafety::from_config(&config.download),
        }
    }

    /// Settings without a proxy, for local services and tests
    pub fn direct(download: &DownloadConfig) -> Self {
        let defaults = Config::default();
        Self {
            proxy_address: None,
            user_agent: defaults.crawler.user_agent.clone(),
            request_timeout: defaults.crawler.request_timeout(),
            connect_timeout: defaults.proxy.connect_timeout(),
            redirect: RedirectSafety::from_config(download),
        }
    }

    fn proxy(&self) -> Result<Option<Proxy>, reqwest::Error> {
        // socks5h resolves hostnames through the proxy, so DNS does not leak
        self.proxy_address
            .as_ref()
            .map(|address| Proxy::all(format!("socks5h://{}", address)))
            .transpose()
    }

    /// Client for page fetches: bounded redirects, compressed bodies
    fn build_crawl_client(&self) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(Policy::limited(CRAWL_MAX_REDIRECTS))
            .gzip(true)
            .brotli(true);
        if let Some(proxy) = self.proxy()? {
            builder = builder.proxy(proxy);
        }
        builder.build()
    }

    /// Client for artifact transfers
    ///
    /// No overall timeout (chunks carry their own) and no transparent
    /// decompression, so byte ranges address the stored representation.
    fn build_download_client(&self) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout)
            .redirect(self.redirect.policy())
            .no_gzip()
            .no_brotli();
        if let Some(proxy) = self.proxy()? {
            builder = builder.proxy(proxy);
        }
        builder.build()
    }
}

/// A client tagged with the epoch that built it
#[derive(Debug, Clone)]
pub struct EpochClient {
    pub generation: u64,
    pub client: Client,
}

/// One generation of network identity
#[derive(Debug)]
pub struct IdentityEpoch {
    generation: u64,
    crawl: EpochClient,
    download: EpochClient,
}

impl IdentityEpoch {
    /// Builds both clients for `generation`
    ///
    /// Construction finishes before the epoch is visible to anyone, so a
    /// failure here leaves the current epoch untouched.
    pub fn build(generation: u64, settings: &TransportSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            generation,
            crawl: EpochClient {
                generation,
                client: settings.build_crawl_client()?,
            },
            download: EpochClient {
                generation,
                client: settings.build_download_client()?,
            },
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn crawl_client(&self) -> &Client {
        &self.crawl.client
    }

    pub fn download_client(&self) -> &Client {
        &self.download.client
    }

    /// Both clients belong to this epoch
    pub fn is_consistent(&self) -> bool {
        self.crawl.generation == self.generation && self.download.generation == self.generation
    }
}

/// The current identity epoch, shared by every worker
///
/// The lock is held only to clone or replace the `Arc`, never across I/O.
#[derive(Debug)]
pub struct SharedIdentity {
    current: RwLock<Arc<IdentityEpoch>>,
}

impl SharedIdentity {
    pub fn new(epoch: IdentityEpoch) -> Self {
        Self {
            current: RwLock::new(Arc::new(epoch)),
        }
    }

    /// Builds generation 0 from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let settings = TransportSettings::from_config(config);
        Ok(Self::new(IdentityEpoch::build(0, &settings)?))
    }

    pub fn current(&self) -> Arc<IdentityEpoch> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.current().generation()
    }

    /// Installs `epoch` and returns the one it replaced
    ///
    /// Callers drop the returned epoch outside the lock; its connection
    /// pools close once the last in-flight request releases it.
    pub fn swap(&self, epoch: IdentityEpoch) -> Arc<IdentityEpoch> {
        let next = Arc::new(epoch);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}
