//! Configuration management for vendorscope.
//!
//! Layered configuration: compiled-in defaults, then an optional TOML file,
//! then `VENDORSCOPE_*` environment variables, then command-line flags. It
//! centralizes timeout settings, retry policy, cache TTL, the per-source
//! rate-limit table and the enrichment API endpoints (overridable so tests
//! can point sources at a local mock server).

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::ratelimit::RateLimit;

/// Main configuration structure for vendorscope.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Network operation settings
    pub network: NetworkConfig,

    /// Profile cache settings
    pub cache: CacheConfig,

    /// Per-source rate-limit table
    pub rate_limits: RateLimitsConfig,

    /// Enrichment API endpoints
    pub endpoints: EndpointConfig,

    /// Risk scoring settings
    pub scoring: ScoringConfig,
}

/// Network-related configuration options
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for HTTP API calls (geolocation, threat intel, homepage)
    pub api_timeout: Duration,

    /// Timeout for individual DNS queries
    pub dns_timeout: Duration,

    /// Timeout for WHOIS TCP round trips
    pub whois_timeout: Duration,

    /// Maximum number of WHOIS referral hops after the IANA lookup
    pub max_whois_referrals: usize,

    /// Retry attempts for transient network failures
    pub retry_attempts: u32,

    /// Base delay for retry backoff
    pub retry_base_delay: Duration,

    /// Maximum concurrently enriched domains in a batch
    pub concurrency_limit: usize,

    /// Per-domain wall-clock deadline within a batch
    pub domain_deadline: Duration,

    /// User-Agent header sent to HTTP endpoints
    pub user_agent: String,
}

/// Profile cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether result caching is enabled
    pub enabled: bool,

    /// TTL for cached profiles
    pub ttl: Duration,
}

/// Per-source sliding-window limits.
///
/// Keys are rate-limit source names (`ip-api.com`, `iplocate.io`, `crtsh`,
/// `urlhaus`); sources without an entry are unlimited. A config file
/// overrides entries per key and keeps the rest of the built-in table.
#[derive(Debug, Clone)]
pub struct RateLimitsConfig {
    pub limits: HashMap<String, RateLimit>,
}

/// Enrichment API endpoints
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// iplocate.io lookup base (IP appended as a path segment)
    pub iplocate_url: String,

    /// Optional iplocate.io API key
    pub iplocate_api_key: Option<String>,

    /// ip-api.com JSON base (IP appended as a path segment)
    pub ip_api_url: String,

    /// crt.sh base (queried as `/?q=<domain>&output=json`)
    pub crtsh_url: String,

    /// URLhaus host API base (domain appended as a path segment)
    pub urlhaus_url: String,
}

/// Risk scoring configuration
#[derive(Debug, Clone, Default)]
pub struct ScoringConfig {
    /// Optional TOML file with scoring rules; built-in tables when absent
    pub rules_file: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(5),
            whois_timeout: Duration::from_secs(10),
            max_whois_referrals: 3,
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            concurrency_limit: 8,
            domain_deadline: Duration::from_secs(75),
            user_agent: concat!("vendorscope/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            "ip-api.com".to_string(),
            RateLimit::new(45, Duration::from_secs(60)),
        );
        limits.insert(
            "iplocate.io".to_string(),
            RateLimit::new(1000, Duration::from_secs(86_400)),
        );
        limits.insert(
            "crtsh".to_string(),
            RateLimit::new(10, Duration::from_secs(60)),
        );
        limits.insert(
            "urlhaus".to_string(),
            RateLimit::new(10, Duration::from_secs(60)),
        );
        Self { limits }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            iplocate_url: "https://iplocate.io/api/lookup".to_string(),
            iplocate_api_key: None,
            ip_api_url: "http://ip-api.com/json".to_string(),
            crtsh_url: "https://crt.sh".to_string(),
            urlhaus_url: "https://urlhaus-api.abuse.ch/v1/host".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            format: "TOML".to_string(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        file.apply(&mut config);
        Ok(config)
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `VENDORSCOPE_*` environment variables over the current values
    pub fn apply_env(&mut self) {
        if let Ok(timeout) = std::env::var("VENDORSCOPE_API_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse::<u64>()
        {
            self.network.api_timeout = Duration::from_secs(secs);
        }

        if let Ok(timeout) = std::env::var("VENDORSCOPE_DNS_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse::<u64>()
        {
            self.network.dns_timeout = Duration::from_secs(secs);
        }

        if let Ok(timeout) = std::env::var("VENDORSCOPE_WHOIS_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse::<u64>()
        {
            self.network.whois_timeout = Duration::from_secs(secs);
        }

        if let Ok(attempts) = std::env::var("VENDORSCOPE_RETRY_ATTEMPTS")
            && let Ok(n) = attempts.parse::<u32>()
        {
            self.network.retry_attempts = n;
        }

        if let Ok(limit) = std::env::var("VENDORSCOPE_CONCURRENCY")
            && let Ok(n) = limit.parse::<usize>()
        {
            self.network.concurrency_limit = n;
        }

        if let Ok(deadline) = std::env::var("VENDORSCOPE_DOMAIN_DEADLINE_SECS")
            && let Ok(secs) = deadline.parse::<u64>()
        {
            self.network.domain_deadline = Duration::from_secs(secs);
        }

        if let Ok(enabled) = std::env::var("VENDORSCOPE_CACHE_ENABLED") {
            self.cache.enabled = enabled.eq_ignore_ascii_case("true")
                || enabled.eq_ignore_ascii_case("1")
                || enabled.eq_ignore_ascii_case("yes");
        }

        if let Ok(hours) = std::env::var("VENDORSCOPE_CACHE_TTL_HOURS")
            && let Ok(h) = hours.parse::<u64>()
        {
            self.cache.ttl = Duration::from_secs(h * 3600);
        }

        if let Ok(key) = std::env::var("VENDORSCOPE_IPLOCATE_API_KEY")
            && !key.is_empty()
        {
            self.endpoints.iplocate_api_key = Some(key);
        }

        if let Ok(path) = std::env::var("VENDORSCOPE_SCORING_RULES")
            && !path.is_empty()
        {
            self.scoring.rules_file = Some(path);
        }
    }

    /// Merge with CLI arguments, giving CLI precedence
    pub fn merge_with_cli(&mut self, cli: &crate::cli::Cli) {
        if cli.no_cache {
            self.cache.enabled = false;
        }

        if let Some(hours) = cli.cache_ttl_hours {
            self.cache.ttl = Duration::from_secs(hours * 3600);
        }

        if let Some(limit) = cli.concurrency {
            self.network.concurrency_limit = limit;
        }

        if let Some(ref rules) = cli.scoring_rules {
            self.scoring.rules_file = Some(rules.clone());
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.api_timeout.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.api_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.network.dns_timeout.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.dns_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.network.whois_timeout.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.whois_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.network.concurrency_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.concurrency_limit".to_string(),
                value: "0".to_string(),
                reason: "At least one concurrent enrichment is required".to_string(),
            });
        }

        if self.network.domain_deadline.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.domain_deadline".to_string(),
                value: "0".to_string(),
                reason: "Deadline must be greater than 0".to_string(),
            });
        }

        if self.cache.enabled && self.cache.ttl.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl".to_string(),
                value: "0".to_string(),
                reason: "TTL must be greater than 0 when the cache is enabled".to_string(),
            });
        }

        for (field, url) in [
            ("endpoints.iplocate_url", &self.endpoints.iplocate_url),
            ("endpoints.ip_api_url", &self.endpoints.ip_api_url),
            ("endpoints.crtsh_url", &self.endpoints.crtsh_url),
            ("endpoints.urlhaus_url", &self.endpoints.urlhaus_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: url.clone(),
                    reason: "Endpoint must be an http(s) URL".to_string(),
                });
            }
        }

        Ok(())
    }
}

// Partial file-side model: every field optional so a config file only has
// to state what it changes.

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    network: FileNetworkConfig,
    #[serde(default)]
    cache: FileCacheConfig,
    #[serde(default)]
    rate_limits: HashMap<String, FileRateLimit>,
    #[serde(default)]
    endpoints: FileEndpointConfig,
    #[serde(default)]
    scoring: FileScoringConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileNetworkConfig {
    api_timeout_secs: Option<u64>,
    dns_timeout_secs: Option<u64>,
    whois_timeout_secs: Option<u64>,
    max_whois_referrals: Option<usize>,
    retry_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    concurrency_limit: Option<usize>,
    domain_deadline_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileCacheConfig {
    enabled: Option<bool>,
    ttl_hours: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileRateLimit {
    max_requests: usize,
    window_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct FileEndpointConfig {
    iplocate_url: Option<String>,
    iplocate_api_key: Option<String>,
    ip_api_url: Option<String>,
    crtsh_url: Option<String>,
    urlhaus_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileScoringConfig {
    rules_file: Option<String>,
}

impl FileConfig {
    fn apply(self, config: &mut Config) {
        let net = self.network;
        if let Some(secs) = net.api_timeout_secs {
            config.network.api_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = net.dns_timeout_secs {
            config.network.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = net.whois_timeout_secs {
            config.network.whois_timeout = Duration::from_secs(secs);
        }
        if let Some(depth) = net.max_whois_referrals {
            config.network.max_whois_referrals = depth;
        }
        if let Some(attempts) = net.retry_attempts {
            config.network.retry_attempts = attempts;
        }
        if let Some(ms) = net.retry_base_delay_ms {
            config.network.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(limit) = net.concurrency_limit {
            config.network.concurrency_limit = limit;
        }
        if let Some(secs) = net.domain_deadline_secs {
            config.network.domain_deadline = Duration::from_secs(secs);
        }
        if let Some(agent) = net.user_agent {
            config.network.user_agent = agent;
        }

        if let Some(enabled) = self.cache.enabled {
            config.cache.enabled = enabled;
        }
        if let Some(hours) = self.cache.ttl_hours {
            config.cache.ttl = Duration::from_secs(hours * 3600);
        }

        for (source, limit) in self.rate_limits {
            config.rate_limits.limits.insert(
                source,
                RateLimit::new(limit.max_requests, Duration::from_secs(limit.window_secs)),
            );
        }

        let ep = self.endpoints;
        if let Some(url) = ep.iplocate_url {
            config.endpoints.iplocate_url = url;
        }
        if let Some(key) = ep.iplocate_api_key {
            config.endpoints.iplocate_api_key = Some(key);
        }
        if let Some(url) = ep.ip_api_url {
            config.endpoints.ip_api_url = url;
        }
        if let Some(url) = ep.crtsh_url {
            config.endpoints.crtsh_url = url;
        }
        if let Some(url) = ep.urlhaus_url {
            config.endpoints.urlhaus_url = url;
        }

        if let Some(rules) = self.scoring.rules_file {
            config.scoring.rules_file = Some(rules);
        }
    }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse configuration format
    Parse { format: String, reason: String },

    /// Invalid configuration value
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Missing required configuration
    MissingRequired { field: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(f, "Invalid value '{}' for '{}': {}", value, field, reason)
            }
            ConfigError::MissingRequired { field } => {
                write!(f, "Missing required configuration field: {}", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileRead { source, .. } => Some(source),
            _ => None,
        }
    }
}
