use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Veil-Fetch
///
/// Every section has defaults, so a file only needs to name what differs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub relevance: Option<RelevanceConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// How many times one normalized URL may be visited
    #[serde(rename = "max-url-visits")]
    pub max_url_visits: u32,

    /// Sightings of one URL before its links stop being followed
    #[serde(rename = "loop-threshold")]
    pub loop_threshold: u32,

    /// Number of concurrent crawl workers
    pub parallelism: usize,

    /// Concurrent requests allowed against a single host
    #[serde(rename = "per-domain-parallelism")]
    pub per_domain_parallelism: usize,

    /// Minimum time between request starts on the same host (milliseconds)
    #[serde(rename = "request-delay")]
    pub request_delay: u64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Page fetch retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Fixed delay between page fetch attempts (milliseconds)
    #[serde(rename = "retry-delay")]
    pub retry_delay: u64,

    /// Consecutive transient failures that trigger an identity rotation (0 disables)
    #[serde(rename = "rotate-after-failures")]
    pub rotate_after_failures: u32,

    /// Rotate the identity after this many page fetches (0 disables)
    #[serde(rename = "rotate-after-requests")]
    pub rotate_after_requests: u32,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whether to consult robots.txt before fetching pages
    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,

    /// Services queried to learn the current exit IP
    #[serde(rename = "ip-check-services")]
    pub ip_check_services: Vec<String>,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_url_visits: 1,
            loop_threshold: 3,
            parallelism: 10,
            per_domain_parallelism: 2,
            request_delay: 3_000,
            request_timeout: 30_000,
            max_retries: 3,
            retry_delay: 2_000,
            rotate_after_failures: 5,
            rotate_after_requests: 0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
            respect_robots: false,
            ip_check_services: vec![
                "https://httpbin.org/ip".to_string(),
                "https://api.ipify.org?format=text".to_string(),
                "https://icanhazip.com".to_string(),
            ],
        }
    }
}

/// URL allow-lists consulted by the validator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    #[serde(rename = "allowed-schemes")]
    pub allowed_schemes: Vec<String>,

    /// Exact paths such as `/get.php`
    #[serde(rename = "allowed-paths")]
    pub allowed_paths: Vec<String>,

    /// Query parameter names
    #[serde(rename = "allowed-params")]
    pub allowed_params: Vec<String>,

    /// Host patterns: exact, `*`-glob, or `re:<regex>`
    #[serde(rename = "allowed-hosts")]
    pub allowed_hosts: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            allowed_schemes: strings(&["https"]),
            allowed_paths: strings(&["/index.php", "/edition.php", "/ads.php", "/get.php"]),
            allowed_params: strings(&["req", "id", "md5", "downloadname", "key", "ext", "curtab"]),
            allowed_hosts: strings(&["libgen.li", r"re:^cdn\d*\.booksdl\.lc$"]),
        }
    }
}

/// Resumable download configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory that receives temporary and promoted files
    pub directory: String,

    /// Bytes requested per ranged GET
    #[serde(rename = "chunk-size")]
    pub chunk_size: u64,

    /// System-wide limit on simultaneous downloads
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Total attempts per chunk, the first included
    #[serde(rename = "chunk-retries")]
    pub chunk_retries: u32,

    /// Fixed delay between chunk attempts (milliseconds)
    #[serde(rename = "chunk-retry-delay")]
    pub chunk_retry_delay: u64,

    /// Timeout for one chunk request (milliseconds)
    #[serde(rename = "chunk-timeout")]
    pub chunk_timeout: u64,

    /// Longest filename kept after sanitization
    #[serde(rename = "max-filename-length")]
    pub max_filename_length: usize,

    /// Query parameter carrying the expected checksum
    #[serde(rename = "checksum-param")]
    pub checksum_param: String,

    /// Skip attachments whose URL carries no checksum
    #[serde(rename = "require-checksum")]
    pub require_checksum: bool,

    /// Reject redirects to anything but https
    #[serde(rename = "require-https-redirects")]
    pub require_https_redirects: bool,

    /// If non-empty, redirect targets must end with one of these host suffixes
    #[serde(rename = "redirect-host-suffixes")]
    pub redirect_host_suffixes: Vec<String>,

    /// Redirect hops followed before giving up
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl DownloadConfig {
    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: "./downloads".to_string(),
            chunk_size: 1024 * 1024,
            max_concurrent: 3,
            chunk_retries: 3,
            chunk_retry_delay: 2_000,
            chunk_timeout: 120_000,
            max_filename_length: 100,
            checksum_param: "md5".to_string(),
            require_checksum: true,
            require_https_redirects: true,
            redirect_host_suffixes: Vec::new(),
            max_redirects: 10,
        }
    }
}

/// Anonymizing proxy endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// SOCKS5 listener for data traffic; absent means direct connections
    #[serde(rename = "socks-address")]
    pub socks_address: Option<String>,

    /// Control-protocol endpoint; absent disables rotation
    #[serde(rename = "control-address")]
    pub control_address: Option<String>,

    /// Shared secret for the control endpoint (empty sends a bare AUTHENTICATE)
    #[serde(rename = "control-password")]
    pub control_password: String,

    /// Control connection dial timeout (milliseconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,

    /// Deadline for each control read (milliseconds)
    #[serde(rename = "exchange-timeout")]
    pub exchange_timeout: u64,

    /// Wait after a new identity is granted (milliseconds)
    #[serde(rename = "settle-delay")]
    pub settle_delay: u64,
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            socks_address: Some("127.0.0.1:9050".to_string()),
            control_address: Some("127.0.0.1:9051".to_string()),
            control_password: String::new(),
            connect_timeout: 10_000,
            exchange_timeout: 30_000,
            settle_delay: 5_000,
        }
    }
}

/// Relevance strategy selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RelevanceConfig {
    /// Comma-separated keywords matched case-insensitively
    Keyword { keywords: String },

    /// Cosine similarity against a query embedding
    Semantic {
        query: String,
        threshold: f32,
        #[serde(rename = "embedding-url")]
        embedding_url: String,
        #[serde(rename = "max-tokens", default = "default_max_tokens")]
        max_tokens: usize,
    },
}

fn default_max_tokens() -> usize {
    512
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./veil.db".to_string(),
        }
    }
}
