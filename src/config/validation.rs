use crate::config::types::{
    Config, CrawlerConfig, DownloadConfig, FilterConfig, OutputConfig, ProxyConfig,
    RelevanceConfig,
};
use crate::download::TEMP_SUFFIX;
use crate::url::HostPattern;
use crate::ConfigError;
use url::Url;

/// Longest file name most filesystems accept
const NAME_MAX: usize = 255;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_filter_config(&config.filter)?;
    validate_download_config(&config.download)?;
    validate_proxy_config(&config.proxy)?;
    if let Some(relevance) = &config.relevance {
        validate_relevance_config(relevance)?;
    }
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.parallelism < 1 || config.parallelism > 256 {
        return Err(ConfigError::Validation(format!(
            "parallelism must be between 1 and 256, got {}",
            config.parallelism
        )));
    }

    if config.per_domain_parallelism < 1 {
        return Err(ConfigError::Validation(format!(
            "per_domain_parallelism must be >= 1, got {}",
            config.per_domain_parallelism
        )));
    }

    if config.max_url_visits < 1 {
        return Err(ConfigError::Validation(
            "max_url_visits must be >= 1".to_string(),
        ));
    }

    if config.loop_threshold < 1 {
        return Err(ConfigError::Validation(
            "loop_threshold must be >= 1".to_string(),
        ));
    }

    if config.request_timeout < 1000 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1000ms, got {}ms",
            config.request_timeout
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for service in &config.ip_check_services {
        Url::parse(service).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid IP check service '{}': {}", service, e))
        })?;
    }

    Ok(())
}

/// Validates the URL allow-lists
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.allowed_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_schemes cannot be empty".to_string(),
        ));
    }

    for scheme in &config.allowed_schemes {
        if scheme != "https" && scheme != "http" {
            return Err(ConfigError::Validation(format!(
                "allowed_schemes may only contain 'http' or 'https', got '{}'",
                scheme
            )));
        }
    }

    for path in &config.allowed_paths {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "allowed path '{}' must start with '/'",
                path
            )));
        }
    }

    for pattern in &config.allowed_hosts {
        HostPattern::parse(pattern).map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
    }

    Ok(())
}

/// Validates download configuration
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "download directory cannot be empty".to_string(),
        ));
    }

    if config.chunk_size < 1024 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be >= 1024 bytes, got {}",
            config.chunk_size
        )));
    }

    if config.max_concurrent < 1 {
        return Err(ConfigError::Validation(
            "download max_concurrent must be >= 1".to_string(),
        ));
    }

    // The temp file appends its suffix to the final name
    let longest_name = NAME_MAX - TEMP_SUFFIX.len();
    if config.max_filename_length < 16 || config.max_filename_length > longest_name {
        return Err(ConfigError::Validation(format!(
            "max_filename_length must be between 16 and {}, got {}",
            longest_name, config.max_filename_length
        )));
    }

    if config.checksum_param.is_empty() {
        return Err(ConfigError::Validation(
            "checksum_param cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy endpoints
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(addr) = &config.socks_address {
        validate_socket_address("socks_address", addr)?;
    }
    if let Some(addr) = &config.control_address {
        validate_socket_address("control_address", addr)?;
    }

    if config.connect_timeout == 0 || config.exchange_timeout == 0 {
        return Err(ConfigError::Validation(
            "control connect and exchange timeouts must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates relevance strategy settings
fn validate_relevance_config(config: &RelevanceConfig) -> Result<(), ConfigError> {
    match config {
        RelevanceConfig::Keyword { keywords } => {
            if keywords.split(',').all(|k| k.trim().is_empty()) {
                return Err(ConfigError::Validation(
                    "keyword strategy needs at least one keyword".to_string(),
                ));
            }
        }
        RelevanceConfig::Semantic {
            query,
            threshold,
            embedding_url,
            max_tokens,
        } => {
            if query.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "semantic strategy needs a query".to_string(),
                ));
            }
            if !(-1.0..=1.0).contains(threshold) {
                return Err(ConfigError::Validation(format!(
                    "semantic threshold must be within [-1, 1], got {}",
                    threshold
                )));
            }
            if *max_tokens < 1 {
                return Err(ConfigError::Validation(
                    "max_tokens must be >= 1".to_string(),
                ));
            }
            Url::parse(embedding_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid embedding_url '{}': {}", embedding_url, e))
            })?;
        }
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Checks that an address has the form `host:port`
fn validate_socket_address(field: &str, addr: &str) -> Result<(), ConfigError> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
        ConfigError::Validation(format!("{} '{}' must be host:port", field, addr))
    })?;

    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must be host:port",
            field, addr
        )));
    }

    Ok(())
}
