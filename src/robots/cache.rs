//! Per-origin robots.txt cache

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use tokio::sync::RwLock;
use url::Url;

/// How long fetched rules stay fresh
const ROBOTS_TTL_SECS: i64 = 3600;

/// Rules for one origin plus when they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotsRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::seconds(ROBOTS_TTL_SECS)
    }
}

/// Answers "may we fetch this URL" from cached robots.txt files
///
/// A robots.txt that cannot be fetched, or answers anything but 200,
/// allows everything.
#[derive(Debug)]
pub struct RobotsGate {
    user_agent: String,
    cache: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsGate {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Checks `url`, fetching its origin's robots.txt through `client` if needed
    pub async fn is_allowed(&self, client: &Client, url: &Url) -> bool {
        let rules = self.rules_for(client, url).await;
        rules.allows(url.as_str(), &self.user_agent)
    }

    pub async fn cached_origins(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn rules_for(&self, client: &Client, url: &Url) -> RobotsRules {
        let origin = url.origin().ascii_serialization();

        if let Some(cached) = self.cache.read().await.get(&origin) {
            if !cached.is_stale() {
                return cached.rules.clone();
            }
        }

        let rules = fetch_rules(client, &origin).await;
        self.cache
            .write()
            .await
            .insert(origin, CachedRobots::new(rules.clone()));
        rules
    }
}

async fn fetch_rules(client: &Client, origin: &str) -> RobotsRules {
    let robots_url = format!("{}/robots.txt", origin);

    match client.get(&robots_url).send().await {
        Ok(response) if response.status() == StatusCode::OK => match response.text().await {
            Ok(body) => RobotsRules::parse(&body),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", robots_url, e);
                RobotsRules::permissive()
            }
        },
        Ok(response) => {
            tracing::debug!(
                "No robots.txt at {} ({}), allowing crawl",
                robots_url,
                response.status()
            );
            RobotsRules::permissive()
        }
        Err(e) => {
            tracing::debug!("Error fetching {}: {}, allowing crawl", robots_url, e);
            RobotsRules::permissive()
        }
    }
}
