//! Pluggable enrichment sources.
//!
//! Each lookup mechanism implements one async trait so the pipeline can:
//!   * Run sources in a fixed order with per-source failure isolation
//!   * Gate the free/metered HTTP APIs behind the shared rate limiter
//!   * Share expensive intermediate results (resolved IP, fetched homepage)
//!   * Swap in canned sources for tests
//!
//! Sources do not touch the profile directly. They return typed [`Signal`]
//! values and the pipeline reduces them under its precedence policy, so a
//! misbehaving source can never clobber a field another source owns.
//!
//! Shared state lives in [`EnrichmentContext`]: the DNS source records the
//! first resolved IPv4 address for the geolocation source, and the three
//! homepage-based sources (CMS, payment, content) read one homepage fetched
//! at most once per enrichment through [`EnrichmentContext::homepage`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::errors::{Result, VendorScopeError};
use crate::profile::{ContentSignals, ThreatIntel};
use crate::ratelimit::RateLimiter;
use crate::retry::{RetryConfig, RetryExecutor, TransientNetworkPolicy};

pub mod cms;
pub mod content;
pub mod dns;
pub mod geoip;
pub mod payment;
pub mod threat;
pub mod whois;

pub use cms::CmsSource;
pub use content::ContentSource;
pub use dns::DnsSource;
pub use geoip::GeoIpSource;
pub use payment::PaymentSource;
pub use threat::ThreatIntelSource;
pub use whois::WhoisSource;

/// Rate-limit key shared by every consumer of the fetched homepage.
pub const HOMEPAGE_SOURCE: &str = "homepage";

/// How long the shared homepage fetch will wait on a saturated limiter.
const HOMEPAGE_MAX_WAIT: Duration = Duration::from_secs(1);

/// One typed field value produced by a source. The pipeline's reducer maps
/// each variant onto its `DomainProfile` slot and records provenance under
/// the name returned by [`Signal::field`].
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Registrar(String),
    CreationDate(DateTime<Utc>),
    ExpirationDate(DateTime<Utc>),
    UpdatedDate(DateTime<Utc>),
    WhoisStatus(Vec<String>),
    RegistrantOrg(String),
    NameServers(Vec<String>),
    IpAddress(String),
    IpAddresses(Vec<String>),
    Ipv6Addresses(Vec<String>),
    MxRecords(Vec<String>),
    HostName(String),
    Asn(String),
    Isp(String),
    Country(String),
    City(String),
    Cdn(String),
    Cms(String),
    PaymentProcessors(Vec<String>),
    Content(ContentSignals),
    Subdomains(Vec<String>),
    Threat(ThreatIntel),
}

impl Signal {
    /// Profile field this signal targets; doubles as the provenance key.
    pub fn field(&self) -> &'static str {
        match self {
            Signal::Registrar(_) => "registrar",
            Signal::CreationDate(_) => "creation_date",
            Signal::ExpirationDate(_) => "expiration_date",
            Signal::UpdatedDate(_) => "updated_date",
            Signal::WhoisStatus(_) => "whois_status",
            Signal::RegistrantOrg(_) => "registrant_org",
            Signal::NameServers(_) => "name_servers",
            Signal::IpAddress(_) => "ip_address",
            Signal::IpAddresses(_) => "ip_addresses",
            Signal::Ipv6Addresses(_) => "ipv6_addresses",
            Signal::MxRecords(_) => "mx_records",
            Signal::HostName(_) => "host_name",
            Signal::Asn(_) => "asn",
            Signal::Isp(_) => "isp",
            Signal::Country(_) => "country",
            Signal::City(_) => "city",
            Signal::Cdn(_) => "cdn",
            Signal::Cms(_) => "cms",
            Signal::PaymentProcessors(_) => "payment_processors",
            Signal::Content(_) => "content",
            Signal::Subdomains(_) => "subdomains",
            Signal::Threat(_) => "threat",
        }
    }
}

/// Runtime toggles for source orchestration. `enable_homepage` covers the
/// CMS, payment and content sources together since they share one fetch.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub enable_whois: bool,
    pub enable_dns: bool,
    pub enable_geoip: bool,
    pub enable_homepage: bool,
    pub enable_threat_intel: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            enable_whois: true,
            enable_dns: true,
            enable_geoip: true,
            enable_homepage: true,
            enable_threat_intel: true,
        }
    }
}

/// A fetched homepage, shared by the CMS, payment and content sources.
/// The body is lowercased once at fetch time since every consumer matches
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct HomePage {
    pub final_url: String,
    pub status: u16,
    pub powered_by: Option<String>,
    pub body: String,
}

enum PageState {
    Unfetched,
    Fetched(Arc<HomePage>),
    /// The limiter refused the fetch; later consumers skip without retrying.
    Skipped,
    /// The fetch failed; the reason is replayed to later consumers.
    Failed(String),
}

/// Shared mutable state passed across sources during one enrichment.
pub struct EnrichmentContext {
    pub domain: String,
    pub opts: SourceOptions,
    pub started_at: Instant,

    /// First IPv4 address resolved by the DNS source, consumed by geoip.
    pub resolved_ip: Option<String>,

    // Stats / diagnostics
    pub dns_queries: u32,
    pub whois_queries: u32,
    pub http_requests: u32,
    pub warnings: Vec<String>,

    config: Arc<Config>,
    http: Client,
    limiter: Arc<RateLimiter>,
    homepage: PageState,
}

impl EnrichmentContext {
    pub fn new(
        domain: impl Into<String>,
        opts: SourceOptions,
        config: Arc<Config>,
        http: Client,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            domain: domain.into(),
            opts,
            started_at: Instant::now(),
            resolved_ip: None,
            dns_queries: 0,
            whois_queries: 0,
            http_requests: 0,
            warnings: vec![],
            config,
            http,
            limiter,
            homepage: PageState::Unfetched,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Handle for retry closures that outlive a borrow of the context.
    pub fn limiter_handle(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Ask the limiter for a slot, waiting briefly if saturated.
    pub async fn admit(&self, source: &str, max_wait: Duration) -> Result<()> {
        if self.limiter.wait_if_needed(source, max_wait).await {
            Ok(())
        } else {
            Err(VendorScopeError::rate_limited(source))
        }
    }

    /// Record one upstream request against the limiter window.
    pub fn record_request(&mut self, source: &str) {
        self.limiter.record_request(source);
        self.http_requests += 1;
    }

    /// The homepage for this domain, fetched at most once per enrichment.
    ///
    /// The first caller pays for the fetch (through the limiter under the
    /// `homepage` key); later callers get the cached page, or the remembered
    /// failure so no consumer triggers a second fetch.
    pub async fn homepage(&mut self) -> Result<Arc<HomePage>> {
        match &self.homepage {
            PageState::Fetched(page) => return Ok(Arc::clone(page)),
            PageState::Skipped => return Err(VendorScopeError::rate_limited(HOMEPAGE_SOURCE)),
            PageState::Failed(reason) => {
                return Err(VendorScopeError::source_failure(
                    HOMEPAGE_SOURCE,
                    &self.domain,
                    reason.clone(),
                ));
            }
            PageState::Unfetched => {}
        }

        if self.admit(HOMEPAGE_SOURCE, HOMEPAGE_MAX_WAIT).await.is_err() {
            self.homepage = PageState::Skipped;
            return Err(VendorScopeError::rate_limited(HOMEPAGE_SOURCE));
        }
        self.record_request(HOMEPAGE_SOURCE);

        match fetch_homepage(&self.http, &self.domain).await {
            Ok(page) => {
                let page = Arc::new(page);
                self.homepage = PageState::Fetched(Arc::clone(&page));
                Ok(page)
            }
            Err(e) => {
                let reason = e.to_string();
                self.homepage = PageState::Failed(reason.clone());
                Err(VendorScopeError::source_failure(
                    HOMEPAGE_SOURCE,
                    &self.domain,
                    reason,
                ))
            }
        }
    }
}

async fn fetch_homepage(http: &Client, domain: &str) -> Result<HomePage> {
    // Plain http; a server redirect to https is followed automatically.
    let url = format!("http://{domain}");
    let response = http.get(&url).send().await?;

    let status = response.status();
    let final_url = response.url().to_string();
    if !status.is_success() {
        return Err(VendorScopeError::http_status(
            HOMEPAGE_SOURCE,
            final_url,
            status.as_u16(),
        ));
    }

    let powered_by = response
        .headers()
        .get("x-powered-by")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = response.text().await?.to_lowercase();

    Ok(HomePage {
        final_url,
        status: status.as_u16(),
        powered_by,
        body,
    })
}

/// Rate-limited GET returning parsed JSON, shared by the API-backed sources.
///
/// The admission wait happens once; each retry attempt re-checks the limiter
/// and records its own request, so a saturated window stops the retry loop
/// instead of stretching it.
pub(crate) async fn fetch_json(
    ctx: &mut EnrichmentContext,
    source: &'static str,
    url: String,
    max_wait: Duration,
) -> Result<Value> {
    ctx.admit(source, max_wait).await?;

    let http = ctx.http().clone();
    let limiter = ctx.limiter_handle();
    let network = &ctx.config().network;
    let executor = RetryExecutor::new(RetryConfig {
        max_attempts: network.retry_attempts,
        initial_delay: network.retry_base_delay,
        ..RetryConfig::default()
    });

    let value = executor
        .execute(
            source,
            || {
                let http = http.clone();
                let url = url.clone();
                let limiter = limiter.clone();
                async move {
                    if !limiter.can_make_request(source) {
                        return Err(VendorScopeError::rate_limited(source));
                    }
                    limiter.record_request(source);
                    let response = http.get(&url).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(VendorScopeError::http_status(source, &url, status.as_u16()));
                    }
                    Ok(response.json::<Value>().await?)
                }
            },
            &TransientNetworkPolicy,
        )
        .await?;

    ctx.http_requests += 1;
    Ok(value)
}

/// Trait every enrichment source implements. Sources gate themselves on
/// `ctx.opts` and return an empty signal list when disabled.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>>;
}
