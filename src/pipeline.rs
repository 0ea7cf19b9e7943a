//! Enrichment orchestration.
//!
//! [`EnrichmentPipeline`] owns the source list, the HTTP client, the scorer
//! and handles to the shared cache and rate limiter. One call to
//! [`EnrichmentPipeline::enrich`] normalizes the domain, checks the cache,
//! runs the sources in a fixed order, reduces their signals onto a
//! [`DomainProfile`] under the field-precedence policy, scores the result and
//! stores it back in the cache.
//!
//! Source failures never fail the call: a failed source is logged and its
//! fields stay unset. Only invalid input is an error.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{DOMAIN_ENTITY, ProfileCache};
use crate::config::Config;
use crate::domain_utils::normalize_domain;
use crate::errors::{Result, VendorScopeError};
use crate::profile::DomainProfile;
use crate::ratelimit::RateLimiter;
use crate::scoring::{RiskScorer, ScoringRules};
use crate::sources::{
    CmsSource, ContentSource, DnsSource, EnrichmentContext, EnrichmentSource, GeoIpSource,
    PaymentSource, Signal, SourceOptions, ThreatIntelSource, WhoisSource,
};

/// Hard cap on the number of domains accepted by one batch call.
pub const MAX_BATCH_SIZE: usize = 100;

/// One domain that could not be enriched in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BatchFailure {
    /// The domain exactly as submitted
    pub domain: String,
    /// Human-readable failure description
    pub error: String,
}

/// Result of a batch run: successes and failures in input order, collected
/// independently so one bad domain never sinks the rest.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub profiles: Vec<DomainProfile>,
    pub failures: Vec<BatchFailure>,
}

pub struct EnrichmentPipeline {
    config: Arc<Config>,
    opts: SourceOptions,
    cache: Arc<ProfileCache>,
    limiter: Arc<RateLimiter>,
    http: Client,
    scorer: RiskScorer,
    sources: Vec<Box<dyn EnrichmentSource>>,
}

impl EnrichmentPipeline {
    /// Pipeline with the full source set: WHOIS, DNS, geolocation, CMS,
    /// payment, content and threat intelligence, in that order.
    pub fn new(
        config: Arc<Config>,
        opts: SourceOptions,
        cache: Arc<ProfileCache>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let sources: Vec<Box<dyn EnrichmentSource>> = vec![
            Box::new(WhoisSource::new()),
            Box::new(DnsSource::new()),
            Box::new(GeoIpSource::new()),
            Box::new(CmsSource::new()),
            Box::new(PaymentSource::new()),
            Box::new(ContentSource::new()),
            Box::new(ThreatIntelSource::new()),
        ];
        Self::with_sources(config, opts, cache, limiter, sources)
    }

    /// Pipeline over an explicit source list. Tests use this to inject
    /// canned sources.
    pub fn with_sources(
        config: Arc<Config>,
        opts: SourceOptions,
        cache: Arc<ProfileCache>,
        limiter: Arc<RateLimiter>,
        sources: Vec<Box<dyn EnrichmentSource>>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.network.api_timeout)
            .user_agent(config.network.user_agent.clone())
            .build()?;
        let scorer = match &config.scoring.rules_file {
            Some(path) => RiskScorer::new(ScoringRules::from_file(path)?),
            None => RiskScorer::with_defaults(),
        };
        Ok(Self {
            config,
            opts,
            cache,
            limiter,
            http,
            scorer,
            sources,
        })
    }

    /// Enrich one domain into a full profile.
    ///
    /// Only input validation can fail this call. Source failures are logged
    /// and leave their fields unset, so the returned profile always carries
    /// the complete field shape.
    pub async fn enrich(&self, raw_domain: &str) -> Result<DomainProfile> {
        let domain = normalize_domain(raw_domain)
            .map_err(|e| VendorScopeError::invalid_domain(raw_domain, e.to_string()))?;

        if let Some(profile) = self.cache.get(DOMAIN_ENTITY, &domain) {
            debug!(domain = %domain, "profile served from cache");
            return Ok(profile);
        }

        let mut ctx = EnrichmentContext::new(
            domain.clone(),
            self.opts.clone(),
            Arc::clone(&self.config),
            self.http.clone(),
            Arc::clone(&self.limiter),
        );
        let mut profile = DomainProfile::new(domain.as_str());

        for source in &self.sources {
            match source.collect(&mut ctx).await {
                Ok(signals) => {
                    for signal in signals {
                        apply_signal(&mut profile, source.name(), signal);
                    }
                }
                Err(e) if e.is_rate_limited() => {
                    debug!(domain = %domain, source = source.name(), "source skipped by rate limiter");
                }
                Err(e) => {
                    warn!(domain = %domain, source = source.name(), error = %e, "source failed");
                }
            }
        }
        for warning in &ctx.warnings {
            warn!(domain = %domain, "{warning}");
        }

        let assessment = self.scorer.assess(&profile);
        profile.vendor_type = assessment.vendor_type;
        profile.risk_score = assessment.risk_score;
        profile.vendor_name = assessment.vendor_name;
        profile.enriched_at = Utc::now();

        debug!(
            domain = %domain,
            risk_score = profile.risk_score,
            dns_queries = ctx.dns_queries,
            whois_queries = ctx.whois_queries,
            http_requests = ctx.http_requests,
            elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
            "enrichment finished"
        );

        self.cache.set(DOMAIN_ENTITY, &domain, profile.clone());
        Ok(profile)
    }

    /// Enrich up to [`MAX_BATCH_SIZE`] domains over a bounded concurrent
    /// stream. Each domain runs under the configured per-domain deadline;
    /// results come back in input order.
    pub async fn enrich_batch(&self, domains: &[String]) -> Result<BatchOutcome> {
        if domains.is_empty() {
            return Err(VendorScopeError::invalid_input("no domains to enrich"));
        }
        if domains.len() > MAX_BATCH_SIZE {
            return Err(VendorScopeError::batch_too_large(
                domains.len(),
                MAX_BATCH_SIZE,
            ));
        }

        let deadline = self.config.network.domain_deadline;
        let mut results: Vec<(usize, String, Result<DomainProfile>)> =
            stream::iter(domains.iter().cloned().enumerate())
                .map(|(idx, domain)| async move {
                    let result = match tokio::time::timeout(deadline, self.enrich(&domain)).await {
                        Ok(result) => result,
                        Err(_) => Err(VendorScopeError::domain_deadline(
                            domain.clone(),
                            deadline.as_secs(),
                        )),
                    };
                    (idx, domain, result)
                })
                .buffer_unordered(self.config.network.concurrency_limit.max(1))
                .collect()
                .await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut outcome = BatchOutcome::default();
        for (_, domain, result) in results {
            match result {
                Ok(profile) => outcome.profiles.push(profile),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "batch enrichment failed");
                    outcome.failures.push(BatchFailure {
                        domain,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Snapshot of the cache backing this pipeline.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Snapshot of the rate-limit windows backing this pipeline.
    pub fn rate_limit_snapshot(&self) -> Vec<crate::ratelimit::RateLimitStatus> {
        self.limiter.snapshot()
    }
}

/// Source that owns a field outright. An authoritative write displaces any
/// earlier value and is itself final; for unowned fields the first writer
/// wins.
fn authoritative_source(field: &str) -> Option<&'static str> {
    match field {
        "ip_address" | "ip_addresses" | "name_servers" => Some("dns"),
        "registrar" | "creation_date" | "expiration_date" | "updated_date" => Some("whois"),
        _ => None,
    }
}

fn apply_signal(profile: &mut DomainProfile, source: &str, signal: Signal) {
    let field = signal.field();
    if let Some(current) = profile.provenance.get(field) {
        let authority = authoritative_source(field);
        if authority == Some(current.as_str()) {
            return;
        }
        if authority != Some(source) {
            return;
        }
    }
    store(profile, signal);
    profile
        .provenance
        .insert(field.to_string(), source.to_string());
}

fn store(profile: &mut DomainProfile, signal: Signal) {
    match signal {
        Signal::Registrar(v) => profile.registrar = Some(v),
        Signal::CreationDate(v) => profile.creation_date = Some(v),
        Signal::ExpirationDate(v) => profile.expiration_date = Some(v),
        Signal::UpdatedDate(v) => profile.updated_date = Some(v),
        Signal::WhoisStatus(v) => profile.whois_status = v,
        Signal::RegistrantOrg(v) => profile.registrant_org = Some(v),
        Signal::NameServers(v) => profile.name_servers = v,
        Signal::IpAddress(v) => profile.ip_address = Some(v),
        Signal::IpAddresses(v) => profile.ip_addresses = v,
        Signal::Ipv6Addresses(v) => profile.ipv6_addresses = v,
        Signal::MxRecords(v) => profile.mx_records = v,
        Signal::HostName(v) => profile.host_name = Some(v),
        Signal::Asn(v) => profile.asn = Some(v),
        Signal::Isp(v) => profile.isp = Some(v),
        Signal::Country(v) => profile.country = Some(v),
        Signal::City(v) => profile.city = Some(v),
        Signal::Cdn(v) => profile.cdn = Some(v),
        Signal::Cms(v) => profile.cms = Some(v),
        Signal::PaymentProcessors(v) => profile.payment_processors = v,
        Signal::Content(v) => profile.content = v,
        Signal::Subdomains(v) => profile.subdomains = v,
        Signal::Threat(v) => profile.threat = Some(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_pipeline(
        cache_enabled: bool,
        sources: Vec<Box<dyn EnrichmentSource>>,
    ) -> EnrichmentPipeline {
        EnrichmentPipeline::with_sources(
            Arc::new(Config::default()),
            SourceOptions::default(),
            Arc::new(ProfileCache::new(cache_enabled, Duration::from_secs(3600))),
            Arc::new(RateLimiter::new(HashMap::new())),
            sources,
        )
        .unwrap()
    }

    #[test]
    fn dns_displaces_earlier_name_servers() {
        let mut profile = DomainProfile::new("example.com");
        apply_signal(
            &mut profile,
            "whois",
            Signal::NameServers(vec!["ns1.registrar.example".to_string()]),
        );
        apply_signal(
            &mut profile,
            "dns",
            Signal::NameServers(vec!["ns1.zone.example".to_string()]),
        );
        assert_eq!(profile.name_servers, vec!["ns1.zone.example"]);
        assert_eq!(
            profile.provenance.get("name_servers").map(String::as_str),
            Some("dns")
        );
    }

    #[test]
    fn authoritative_value_is_final() {
        let mut profile = DomainProfile::new("example.com");
        apply_signal(&mut profile, "dns", Signal::IpAddress("203.0.113.7".to_string()));
        apply_signal(&mut profile, "geoip", Signal::IpAddress("198.51.100.1".to_string()));
        assert_eq!(profile.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(
            profile.provenance.get("ip_address").map(String::as_str),
            Some("dns")
        );
    }

    #[test]
    fn whois_owns_registration_dates() {
        let epoch = chrono::DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let later = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut profile = DomainProfile::new("example.com");
        apply_signal(&mut profile, "threat_intel", Signal::CreationDate(later));
        apply_signal(&mut profile, "whois", Signal::CreationDate(epoch));
        assert_eq!(profile.creation_date, Some(epoch));
        // Settled; a repeat write from anywhere is ignored.
        apply_signal(&mut profile, "whois", Signal::CreationDate(later));
        assert_eq!(profile.creation_date, Some(epoch));
    }

    #[test]
    fn first_writer_wins_for_unowned_fields() {
        let mut profile = DomainProfile::new("example.com");
        apply_signal(&mut profile, "geoip", Signal::HostName("Primary Org".to_string()));
        apply_signal(&mut profile, "fallback", Signal::HostName("Other Org".to_string()));
        assert_eq!(profile.host_name.as_deref(), Some("Primary Org"));
        assert_eq!(
            profile.provenance.get("host_name").map(String::as_str),
            Some("geoip")
        );
    }

    #[tokio::test]
    async fn invalid_domain_is_the_only_enrich_error() {
        let pipeline = test_pipeline(false, vec![]);
        let err = pipeline.enrich("not a domain").await.unwrap_err();
        assert!(matches!(err, VendorScopeError::InvalidDomain { .. }));
    }

    #[tokio::test]
    async fn sourceless_enrich_yields_scored_full_shape_profile() {
        let pipeline = test_pipeline(false, vec![]);
        let profile = pipeline
            .enrich("https://WWW.Example.COM/shop?x=1")
            .await
            .unwrap();
        assert_eq!(profile.domain, "example.com");
        assert_eq!(profile.risk_score, 0);
        assert!(profile.vendor_type.is_none());
        assert_eq!(profile.vendor_name.as_deref(), Some("Example"));
        assert!(profile.provenance.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_returns_the_stored_profile() {
        let pipeline = test_pipeline(true, vec![]);
        let first = pipeline.enrich("example.com").await.unwrap();
        // Different spelling, same cache identity.
        let second = pipeline.enrich("EXAMPLE.COM.").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let pipeline = test_pipeline(false, vec![]);
        let err = pipeline.enrich_batch(&[]).await.unwrap_err();
        assert!(matches!(err, VendorScopeError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_any_work() {
        let pipeline = test_pipeline(false, vec![]);
        let domains: Vec<String> = (0..101).map(|i| format!("domain{i}.example")).collect();
        let err = pipeline.enrich_batch(&domains).await.unwrap_err();
        assert!(matches!(
            err,
            VendorScopeError::BatchTooLarge {
                size: 101,
                limit: 100
            }
        ));
    }

    #[tokio::test]
    async fn batch_collects_failures_without_aborting() {
        let pipeline = test_pipeline(false, vec![]);
        let domains = vec![
            "ok-domain.example".to_string(),
            "bad domain".to_string(),
            "second-ok.example".to_string(),
        ];
        let outcome = pipeline.enrich_batch(&domains).await.unwrap();
        assert_eq!(outcome.profiles.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        // Input order is preserved within each list.
        assert_eq!(outcome.profiles[0].domain, "ok-domain.example");
        assert_eq!(outcome.profiles[1].domain, "second-ok.example");
        assert_eq!(outcome.failures[0].domain, "bad domain");
    }
}
