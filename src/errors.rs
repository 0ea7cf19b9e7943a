//! Unified error handling for vendorscope.
//!
//! A `thiserror`-based model with:
//!   * Typed variants for the common failure domains (validation, network
//!     sources, response decoding, I/O)
//!   * A categorization layer (`ErrorCategory`) for structured reporting
//!   * Helper constructors
//!   * `From` conversions for common lower-level errors
//!
//! Design goals:
//!   * Keep end-user messages clear & actionable
//!   * Avoid leaking internal implementation details
//!   * Enable structured output to classify failures deterministically
//!
//! Categories are intentionally coarse:
//!   - Input: user / data validation issues (never retried)
//!   - Network: transient or remote-service problems
//!   - Parse: syntax / data-format decoding issues
//!   - Internal: logic bugs or unexpected states
//!
//! NOTE: Variants that wrap external errors retain sources to preserve
//!       backtraces (when RUST_BACKTRACE=1).

use std::io;

use thiserror::Error;

/// High-level classification for structured reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Network,
    Parse,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Network => "network",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Primary application error type.
#[derive(Error, Debug)]
pub enum VendorScopeError {
    // ------------------------ Input / Validation ----------------------------
    #[error("Invalid domain name '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Batch of {size} domains exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ---------------------------- Parsing -----------------------------------
    #[error("WHOIS response parse failed for query '{query}': {reason}")]
    WhoisParse { query: String, reason: String },

    #[error("Failed to decode {service} response: {reason}")]
    ResponseParse { service: String, reason: String },

    // ----------------------------- Network ----------------------------------
    #[error("Network error during {operation} for '{target}': {source}")]
    Network {
        operation: String,
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("DNS query timed out after {seconds}s: {query}")]
    DnsTimeout { query: String, seconds: u64 },

    #[error("DNS {record_type} lookup failed for {domain}: {reason}")]
    DnsResolution {
        domain: String,
        record_type: String,
        reason: String,
    },

    #[error("WHOIS query '{query}' to server '{server}' failed: {reason}")]
    WhoisQuery {
        server: String,
        query: String,
        reason: String,
    },

    #[error("{service} returned HTTP {status} for {url}")]
    HttpStatus {
        service: String,
        url: String,
        status: u16,
    },

    #[error("Enrichment source '{service}' failed for {domain}: {reason}")]
    SourceFailure {
        service: String,
        domain: String,
        reason: String,
    },

    #[error("Rate limit reached for {service}")]
    RateLimited { service: String },

    #[error("Enrichment deadline exceeded after {seconds}s for {domain}")]
    DomainDeadline { domain: String, seconds: u64 },

    // ----------------------------- I/O / FS ---------------------------------
    #[error("I/O error during {operation} on {path}: {source}")]
    Io {
        path: String,
        operation: String,
        #[source]
        source: io::Error,
    },

    // ---------------------------- Internal ----------------------------------
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VendorScopeError {
    /// Categorize the error for structured output.
    pub fn category(&self) -> ErrorCategory {
        use VendorScopeError::*;
        match self {
            InvalidDomain { .. }
            | InvalidInput { .. }
            | BatchTooLarge { .. }
            | Configuration { .. } => ErrorCategory::Input,

            WhoisParse { .. } | ResponseParse { .. } => ErrorCategory::Parse,

            Network { .. }
            | DnsTimeout { .. }
            | DnsResolution { .. }
            | WhoisQuery { .. }
            | HttpStatus { .. }
            | SourceFailure { .. }
            | RateLimited { .. }
            | DomainDeadline { .. } => ErrorCategory::Network,

            Io { .. } | Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Rate-limit denials are excluded: the window is still closed, and the
    /// limiter has already waited as long as it is allowed to. Deadline
    /// overruns are excluded because the time budget is already spent.
    pub fn is_retryable(&self) -> bool {
        match self {
            VendorScopeError::RateLimited { .. } | VendorScopeError::DomainDeadline { .. } => false,
            other => other.category() == ErrorCategory::Network,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, VendorScopeError::RateLimited { .. })
    }

    // ---------------------------- Constructors -----------------------------

    pub fn invalid_domain(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn batch_too_large(size: usize, limit: usize) -> Self {
        Self::BatchTooLarge { size, limit }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn whois_parse(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WhoisParse {
            query: query.into(),
            reason: reason.into(),
        }
    }

    pub fn response_parse(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResponseParse {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn network(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            operation: operation.into(),
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn dns_timeout(query: impl Into<String>, seconds: u64) -> Self {
        Self::DnsTimeout {
            query: query.into(),
            seconds,
        }
    }

    pub fn dns_resolution(
        domain: impl Into<String>,
        record_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DnsResolution {
            domain: domain.into(),
            record_type: record_type.into(),
            reason: reason.into(),
        }
    }

    pub fn whois_query(
        server: impl Into<String>,
        query: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::WhoisQuery {
            server: server.into(),
            query: query.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(service: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            service: service.into(),
            url: url.into(),
            status,
        }
    }

    pub fn source_failure(
        service: impl Into<String>,
        domain: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SourceFailure {
            service: service.into(),
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    pub fn rate_limited(service: impl Into<String>) -> Self {
        Self::RateLimited {
            service: service.into(),
        }
    }

    pub fn domain_deadline(domain: impl Into<String>, seconds: u64) -> Self {
        Self::DomainDeadline {
            domain: domain.into(),
            seconds,
        }
    }

    pub fn io(path: impl Into<String>, operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Public result alias.
pub type Result<T> = std::result::Result<T, VendorScopeError>;

/// Map standard IO errors into `Io` variant (generic context).
impl From<io::Error> for VendorScopeError {
    fn from(e: io::Error) -> Self {
        VendorScopeError::Io {
            path: "<unknown>".into(),
            operation: "unspecified".into(),
            source: e,
        }
    }
}

impl From<reqwest::Error> for VendorScopeError {
    fn from(e: reqwest::Error) -> Self {
        let target = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".into());
        VendorScopeError::Network {
            operation: "http request".into(),
            target,
            source: Box::new(e),
        }
    }
}

impl From<serde_json::Error> for VendorScopeError {
    fn from(e: serde_json::Error) -> Self {
        VendorScopeError::ResponseParse {
            service: "json".into(),
            reason: e.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for VendorScopeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        // Query string not available at this conversion point; callers should
        // wrap via `dns_timeout` / `domain_deadline` where context is known.
        VendorScopeError::DnsTimeout {
            query: "<unknown>".into(),
            seconds: 0,
        }
    }
}

/// Extension trait for enriching IO results with path + operation context.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| VendorScopeError::io(path.into(), operation.into(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping() {
        assert_eq!(
            VendorScopeError::invalid_domain("x", "too short").category(),
            ErrorCategory::Input
        );
        assert_eq!(
            VendorScopeError::dns_timeout("a", 5).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            VendorScopeError::whois_parse("example.com", "bad").category(),
            ErrorCategory::Parse
        );
        assert_eq!(
            VendorScopeError::rate_limited("crt.sh").category(),
            ErrorCategory::Network
        );
    }

    #[test]
    fn display_snippets() {
        let e = VendorScopeError::dns_resolution("example.com", "MX", "NXDOMAIN");
        let s = e.to_string();
        assert!(s.contains("example.com"));
        assert!(s.contains("MX"));
        let i = VendorScopeError::internal("boom");
        assert!(i.to_string().contains("Internal error"));
        let b = VendorScopeError::batch_too_large(150, 100);
        assert!(b.to_string().contains("150"));
        assert!(b.to_string().contains("100"));
    }

    #[test]
    fn retryable_excludes_rate_limits() {
        assert!(VendorScopeError::dns_timeout("example.com", 5).is_retryable());
        assert!(VendorScopeError::http_status("ip-api.com", "http://x", 503).is_retryable());
        assert!(!VendorScopeError::rate_limited("ip-api.com").is_retryable());
        assert!(!VendorScopeError::domain_deadline("example.com", 75).is_retryable());
        assert!(!VendorScopeError::invalid_domain("", "empty").is_retryable());
    }

    #[test]
    fn io_context() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let mapped = res.with_path("/tmp/file", "read");
        match mapped.err().unwrap() {
            VendorScopeError::Io {
                path, operation, ..
            } => {
                assert_eq!(path, "/tmp/file");
                assert_eq!(operation, "read");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
