//! Crawl orchestration
//!
//! The orchestrator owns every piece of per-session state (visit counts,
//! loop sightings, host limits, the identity epoch) and hands clones of its
//! `Arc`s to a bounded pool of workers. Workers fetch pages, classify them,
//! and return newly admitted links and attachment downloads to the session
//! loop, which is the only place the frontier is touched.

use crate::config::Config;
use crate::crawler::fetcher::{fetch_page, FetchedPage, ResponseKind};
use crate::crawler::parser::{extract_links, ContentExtractor, HtmlTextExtractor};
use crate::crawler::scheduler::{CrawlTask, Frontier};
use crate::crawler::FetchError;
use crate::download::{DownloadError, DownloadManager, DownloadRequest};
use crate::identity::{
    ControlError, PublicIpChecker, RotationController, RotationPolicy, SharedIdentity,
};
use crate::relevance::{build_classifier, RelevanceClassifier, Verdict};
use crate::robots::RobotsGate;
use crate::state::{DomainLimiter, LoopDetector, VisitTracker};
use crate::storage::{
    ArtifactLedger, CrawlDocument, DocumentStore, SessionLog, SessionStatus, SqliteStorage,
};
use crate::url::{extract_domain, normalize_url, query_param, UrlValidator};
use crate::VeilError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// Counters reported at the end of a crawl session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub pages_fetched: u64,
    pub pages_failed: u64,
    pub pages_irrelevant: u64,
    pub documents_stored: u64,
    pub downloads_promoted: u64,
    pub downloads_failed: u64,
    pub rotations: u64,
    pub loops_broken: u64,
    pub urls_rejected: u64,
    pub total_visits: u64,
    pub unique_urls: usize,
}

#[derive(Debug, Default)]
struct StatsCounters {
    pages_fetched: AtomicU64,
    pages_failed: AtomicU64,
    pages_irrelevant: AtomicU64,
    documents_stored: AtomicU64,
    downloads_promoted: AtomicU64,
    downloads_failed: AtomicU64,
    rotations: AtomicU64,
    loops_broken: AtomicU64,
    urls_rejected: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// What a worker hands back to the session loop
#[derive(Debug, Default)]
struct PageOutcome {
    links: Vec<CrawlTask>,
    download: Option<DownloadRequest>,
}

/// Drives one crawl session
///
/// Cloning is cheap and every clone shares the same session state.
#[derive(Clone)]
pub struct CrawlOrchestrator {
    config: Arc<Config>,
    session_id: String,
    config_hash: Option<String>,
    validator: Arc<UrlValidator>,
    visits: Arc<VisitTracker>,
    loops: Arc<LoopDetector>,
    limiter: Arc<DomainLimiter>,
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    extractor: Arc<dyn ContentExtractor>,
    identity: Arc<SharedIdentity>,
    downloads: Arc<DownloadManager>,
    rotation: Option<Arc<RotationController>>,
    rotation_policy: Arc<RotationPolicy>,
    robots: Option<Arc<RobotsGate>>,
    ip_checker: Option<PublicIpChecker>,
    documents: Option<Arc<dyn DocumentStore>>,
    sessions: Option<Arc<dyn SessionLog>>,
    stats: Arc<StatsCounters>,
}

impl CrawlOrchestrator {
    /// Builds a session from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `storage` - Receives documents, artifacts and the session record;
    ///   `None` runs without persistence
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOrchestrator)` - Ready to `run`
    /// * `Err(VeilError)` - A client, host pattern or classifier could not be built
    pub async fn new(config: Config, storage: Option<Arc<SqliteStorage>>) -> Result<Self, VeilError> {
        let validator = UrlValidator::from_config(&config.filter)?;
        let identity = Arc::new(SharedIdentity::from_config(&config)?);

        let classifier = match &config.relevance {
            Some(relevance) => {
                // The embedding service is local; it is never reached through the proxy
                let http = reqwest::Client::builder()
                    .timeout(config.crawler.request_timeout())
                    .build()?;
                let classifier = build_classifier(relevance, http).await?;
                tracing::info!("Relevance strategy: {}", classifier.name());
                Some(classifier)
            }
            None => None,
        };

        let ip_checker = (!config.crawler.ip_check_services.is_empty())
            .then(|| PublicIpChecker::new(config.crawler.ip_check_services.clone()));

        let rotation = match RotationController::from_config(Arc::clone(&identity), &config) {
            Ok(controller) => {
                let controller = match &ip_checker {
                    Some(checker) => controller.with_ip_checker(checker.clone()),
                    None => controller,
                };
                Some(Arc::new(controller))
            }
            Err(ControlError::NotConfigured) => {
                tracing::info!("No control address configured, identity rotation disabled");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut downloads = DownloadManager::new(Arc::clone(&identity), config.download.clone());
        let mut documents: Option<Arc<dyn DocumentStore>> = None;
        let mut sessions: Option<Arc<dyn SessionLog>> = None;
        if let Some(storage) = storage {
            downloads = downloads.with_ledger(Arc::clone(&storage) as Arc<dyn ArtifactLedger>);
            documents = Some(Arc::clone(&storage) as Arc<dyn DocumentStore>);
            sessions = Some(storage as Arc<dyn SessionLog>);
        }

        let crawler = &config.crawler;
        let robots = crawler
            .respect_robots
            .then(|| Arc::new(RobotsGate::new(crawler.user_agent.clone())));

        Ok(Self {
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            config_hash: None,
            validator: Arc::new(validator),
            visits: Arc::new(VisitTracker::new(crawler.max_url_visits)),
            loops: Arc::new(LoopDetector::new(crawler.loop_threshold)),
            limiter: Arc::new(DomainLimiter::new(
                crawler.per_domain_parallelism,
                crawler.request_delay(),
            )),
            classifier,
            extractor: Arc::new(HtmlTextExtractor),
            identity,
            downloads: Arc::new(downloads),
            rotation,
            rotation_policy: Arc::new(RotationPolicy::new(
                crawler.rotate_after_failures,
                crawler.rotate_after_requests,
            )),
            robots,
            ip_checker,
            documents,
            sessions,
            stats: Arc::new(StatsCounters::default()),
            config: Arc::new(config),
        })
    }

    /// Hash of the configuration file, stored with the session record
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Replaces the default HTML text extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> &Arc<SharedIdentity> {
        &self.identity
    }

    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.downloads
    }

    /// Crawls from `seeds` until the frontier drains or `cancel` fires
    ///
    /// Seeds are queued at depth 0 without consulting the URL validator;
    /// every discovered link must pass it. Downloads started during the
    /// session are awaited before returning, and on cancellation they stop
    /// at their last committed offset.
    pub async fn run(
        &self,
        seeds: &[String],
        cancel: CancellationToken,
    ) -> Result<SessionStats, VeilError> {
        let span = tracing::info_span!(
            "crawl_session",
            session_id = %self.session_id,
            exit_ip = tracing::field::Empty
        );
        self.run_session(seeds, cancel).instrument(span).await
    }

    async fn run_session(
        &self,
        seeds: &[String],
        cancel: CancellationToken,
    ) -> Result<SessionStats, VeilError> {
        if let Some(sessions) = &self.sessions {
            sessions.start_session(&self.session_id, self.config_hash.as_deref().unwrap_or(""))?;
        }
        tracing::info!(
            "Starting crawl session with {} seeds (identity generation {})",
            seeds.len(),
            self.identity.generation()
        );

        if let Some(checker) = &self.ip_checker {
            let client = self.identity.current().crawl_client().clone();
            if let Some(ip) = checker.current_ip(&client).await {
                tracing::Span::current().record("exit_ip", ip.as_str());
                tracing::info!("Exit IP: {}", ip);
            }
        }

        let mut frontier = Frontier::new();
        for seed in seeds {
            match normalize_url(seed) {
                Ok(url) => frontier.push(CrawlTask::new(url, 0)),
                Err(e) => tracing::warn!("Skipping seed {}: {}", seed, e),
            }
        }

        let parallelism = self.config.crawler.parallelism.max(1);
        let mut workers: JoinSet<PageOutcome> = JoinSet::new();
        let mut downloads: JoinSet<()> = JoinSet::new();
        let start_time = Instant::now();
        let mut pages_processed: u64 = 0;

        loop {
            while workers.len() < parallelism && !cancel.is_cancelled() {
                let Some(task) = frontier.pop() else {
                    break;
                };
                let this = self.clone();
                let cancel = cancel.clone();
                workers.spawn(
                    async move {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => PageOutcome::default(),
                            outcome = this.process_task(task) => outcome,
                        }
                    }
                    .in_current_span(),
                );
            }

            if workers.is_empty() {
                tracing::info!("Frontier is empty, crawl complete");
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Crawl cancelled with {} URLs in frontier", frontier.len());
                    break;
                }
                joined = workers.join_next() => joined,
            };

            let outcome = match joined {
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => {
                    tracing::error!("Crawl worker failed: {}", e);
                    continue;
                }
                None => continue,
            };

            for task in outcome.links {
                frontier.push(task);
            }
            if let Some(request) = outcome.download {
                let this = self.clone();
                let cancel = cancel.clone();
                downloads.spawn(
                    async move { this.run_download(request, &cancel).await }.in_current_span(),
                );
            }

            pages_processed += 1;
            if pages_processed % 10 == 0 {
                let rate = pages_processed as f64 / start_time.elapsed().as_secs_f64();
                tracing::info!(
                    "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                    pages_processed,
                    frontier.len(),
                    rate
                );
            }
        }

        workers.shutdown().await;
        if !downloads.is_empty() {
            tracing::info!("Waiting for {} downloads to finish", downloads.len());
        }
        while let Some(joined) = downloads.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Download task failed: {}", e);
            }
        }

        let stats = self.snapshot();
        let status = if cancel.is_cancelled() {
            SessionStatus::Cancelled
        } else {
            SessionStatus::Completed
        };
        if let Some(sessions) = &self.sessions {
            sessions.finish_session(&self.session_id, status)?;
        }

        tracing::info!(
            "Crawl {}: {} pages fetched ({} failed, {} irrelevant), {} documents stored, \
             {} downloads promoted ({} failed), {} rotations in {:?}",
            status.to_db_string(),
            stats.pages_fetched,
            stats.pages_failed,
            stats.pages_irrelevant,
            stats.documents_stored,
            stats.downloads_promoted,
            stats.downloads_failed,
            stats.rotations,
            start_time.elapsed()
        );

        Ok(stats)
    }

    /// Current counters
    pub fn snapshot(&self) -> SessionStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let s = &self.stats;
        SessionStats {
            pages_fetched: load(&s.pages_fetched),
            pages_failed: load(&s.pages_failed),
            pages_irrelevant: load(&s.pages_irrelevant),
            documents_stored: load(&s.documents_stored),
            downloads_promoted: load(&s.downloads_promoted),
            downloads_failed: load(&s.downloads_failed),
            rotations: load(&s.rotations),
            loops_broken: load(&s.loops_broken),
            urls_rejected: load(&s.urls_rejected),
            total_visits: self.visits.total_visits(),
            unique_urls: self.visits.unique_url_count(),
        }
    }

    /// Fetches and handles one frontier task
    async fn process_task(&self, task: CrawlTask) -> PageOutcome {
        let url = &task.url;
        if !self.visits.try_claim(url.as_str()) {
            tracing::trace!("Visit cap reached for {}", url);
            return PageOutcome::default();
        }
        let Some(domain) = extract_domain(url) else {
            return PageOutcome::default();
        };

        if let Some(robots) = &self.robots {
            let client = self.identity.current().crawl_client().clone();
            if !robots.is_allowed(&client, url).await {
                tracing::info!("URL {} disallowed by robots.txt", url);
                return PageOutcome::default();
            }
        }

        let page = {
            let _permit = self.limiter.acquire(&domain).await;
            self.fetch_with_retry(url).await
        };

        let page = match page {
            Ok(page) => {
                bump(&self.stats.pages_fetched);
                page
            }
            Err(e) => {
                bump(&self.stats.pages_failed);
                tracing::warn!("{}", e);
                return PageOutcome::default();
            }
        };

        match page.kind.clone() {
            ResponseKind::Attachment { filename } => PageOutcome {
                links: Vec::new(),
                download: self.download_request(url, filename),
            },
            ResponseKind::Html => PageOutcome {
                links: self.handle_html(&task, page).await,
                download: None,
            },
            ResponseKind::Other(content_type) => {
                tracing::debug!("Ignoring {} ({})", url, content_type);
                PageOutcome::default()
            }
        }
    }

    /// Fetches a page, retrying transient failures with a fixed delay
    ///
    /// Every attempt uses the then-current crawl client, so a rotation
    /// triggered by an earlier attempt takes effect on the next one.
    async fn fetch_with_retry(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let attempts = self.config.crawler.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let client = self.identity.current().crawl_client().clone();
            match fetch_page(&client, url).await {
                Ok(page) => {
                    if self.rotation_policy.record_success() {
                        self.rotate("request budget spent").await;
                    }
                    return Ok(page);
                }
                Err(e) if e.is_retryable() => {
                    if self.rotation_policy.record_failure() {
                        self.rotate("sustained failures").await;
                    }
                    if attempt >= attempts {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    tracing::info!(
                        "Retrying {} (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.config.crawler.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Extracts, classifies and stores an HTML page; returns admitted links
    async fn handle_html(&self, task: &CrawlTask, page: FetchedPage) -> Vec<CrawlTask> {
        let body = page.body.unwrap_or_default();
        let base = &page.final_url;

        let extracted = self.extractor.extract(&body, base);
        let links = extract_links(&body, base);
        drop(body);

        let content = match extracted {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("{}", e);
                bump(&self.stats.pages_irrelevant);
                return Vec::new();
            }
        };

        let text = content.classification_text();
        let Some(verdict) = self.classify(&task.url, &text).await else {
            return Vec::new();
        };
        if !verdict.is_relevant {
            tracing::debug!(
                "{} not relevant (score {:.3} < {:.3})",
                task.url,
                verdict.score,
                verdict.threshold
            );
            bump(&self.stats.pages_irrelevant);
            return Vec::new();
        }

        if let Some(documents) = &self.documents {
            let doc = CrawlDocument {
                url: task.url.to_string(),
                title: content.title.clone(),
                content: content.text,
                embedding: verdict.embedding,
                score: Some(verdict.score),
                fetched_at: Utc::now(),
            };
            match documents.insert_one(&doc) {
                Ok(()) => bump(&self.stats.documents_stored),
                Err(e) => tracing::error!("Failed to store {}: {}", task.url, e),
            }
        }

        self.admit_links(task.depth + 1, links)
    }

    /// Classifies `text`, retrying classifier errors
    ///
    /// Without a configured strategy every page is relevant. `None` means
    /// the classifier kept failing and the page is skipped.
    async fn classify(&self, url: &Url, text: &str) -> Option<Verdict> {
        let Some(classifier) = &self.classifier else {
            return Some(Verdict {
                is_relevant: true,
                score: 1.0,
                threshold: 0.0,
                embedding: None,
            });
        };

        let attempts = self.config.crawler.max_retries + 1;
        for attempt in 1..=attempts {
            match classifier.classify(text).await {
                Ok(verdict) => return Some(verdict),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Classifying {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.config.crawler.retry_delay()).await;
                }
                Err(e) => {
                    tracing::error!("Giving up on classifying {}: {}", url, e);
                }
            }
        }
        None
    }

    /// Applies loop detection, depth, validation and the visit cap to links
    fn admit_links(&self, depth: u32, links: Vec<String>) -> Vec<CrawlTask> {
        if depth > self.config.crawler.max_depth {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut admitted = Vec::new();

        for link in links {
            let url = match normalize_url(&link) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Failed to normalize URL {}: {}", link, e);
                    continue;
                }
            };
            if !seen.insert(url.to_string()) {
                continue;
            }

            if !self.loops.observe(url.as_str()) {
                tracing::debug!("Loop detected at {}, not following", url);
                bump(&self.stats.loops_broken);
                continue;
            }

            if let Err(reason) = self.validator.check(&url) {
                tracing::trace!("Rejected {}: {}", url, reason);
                bump(&self.stats.urls_rejected);
                continue;
            }

            if !self.visits.should_visit(url.as_str()) {
                continue;
            }

            admitted.push(CrawlTask::new(url, depth));
        }

        admitted
    }

    /// Turns an attachment response into a download request
    ///
    /// The request keeps the URL that was asked for, since it carries the
    /// checksum parameter even when the response came through a redirect.
    fn download_request(&self, url: &Url, filename: Option<String>) -> Option<DownloadRequest> {
        let download = &self.config.download;
        let checksum = query_param(url, &download.checksum_param).filter(|c| !c.is_empty());
        if download.require_checksum && checksum.is_none() {
            tracing::debug!(
                "Attachment at {} has no '{}' parameter, skipping",
                url,
                download.checksum_param
            );
            return None;
        }

        tracing::info!("Attachment found at {}", url);
        let mut request = DownloadRequest::new(url.clone());
        if let Some(filename) = filename {
            request = request.with_filename(filename);
        }
        if let Some(checksum) = checksum {
            request = request.with_checksum(checksum);
        }
        Some(request)
    }

    async fn run_download(&self, request: DownloadRequest, cancel: &CancellationToken) {
        match self.downloads.download(request, cancel).await {
            Ok(_) => {
                bump(&self.stats.downloads_promoted);
                if self.rotation_policy.record_success() {
                    self.rotate("request budget spent").await;
                }
            }
            Err(DownloadError::Cancelled) => {}
            Err(DownloadError::TargetBusy(path)) => {
                tracing::debug!("{} is already being downloaded", path.display());
            }
            Err(e) => {
                bump(&self.stats.downloads_failed);
                if e.is_retryable() && self.rotation_policy.record_failure() {
                    self.rotate("download failures").await;
                }
            }
        }
    }

    /// Rotates the identity; failures leave the current one in place
    async fn rotate(&self, reason: &str) {
        let Some(rotation) = &self.rotation else {
            return;
        };

        tracing::info!("Rotating identity: {}", reason);
        match rotation.rotate().await {
            Ok(_) => bump(&self.stats.rotations),
            Err(e) => {
                tracing::warn!("Identity rotation failed, keeping current identity: {}", e)
            }
        }
    }
}
