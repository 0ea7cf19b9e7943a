//! Pipeline integration tests with stub sources and mock HTTP endpoints.
//!
//! Everything here runs offline: canned sources stand in for the real
//! lookups, and `wiremock` serves the HTTP-backed sources where the wire
//! handling itself is under test.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vendorscope::cache::ProfileCache;
use vendorscope::config::Config;
use vendorscope::errors::{Result, VendorScopeError};
use vendorscope::pipeline::EnrichmentPipeline;
use vendorscope::profile::VendorType;
use vendorscope::ratelimit::RateLimiter;
use vendorscope::sources::{
    CmsSource, ContentSource, EnrichmentContext, EnrichmentSource, GeoIpSource, PaymentSource,
    Signal, SourceOptions, ThreatIntelSource,
};

/// Counts invocations and replays a fixed signal list under a chosen
/// source name.
struct CannedSource {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    signals: Vec<Signal>,
}

impl CannedSource {
    fn new(name: &'static str, signals: Vec<Signal>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                calls: Arc::clone(&calls),
                signals,
            },
            calls,
        )
    }
}

#[async_trait]
impl EnrichmentSource for CannedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn collect(&self, _ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.signals.clone())
    }
}

struct FailingSource;

#[async_trait]
impl EnrichmentSource for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        Err(VendorScopeError::source_failure(
            "failing",
            &ctx.domain,
            "upstream exploded",
        ))
    }
}

struct RateLimitedSource;

#[async_trait]
impl EnrichmentSource for RateLimitedSource {
    fn name(&self) -> &'static str {
        "limited"
    }

    async fn collect(&self, _ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        Err(VendorScopeError::rate_limited("limited"))
    }
}

/// Publishes a resolved address the way the DNS source would.
struct ResolvedIpStub {
    ip: &'static str,
}

#[async_trait]
impl EnrichmentSource for ResolvedIpStub {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        ctx.resolved_ip = Some(self.ip.to_string());
        Ok(vec![Signal::IpAddress(self.ip.to_string())])
    }
}

/// Default config with retries disabled so failure paths stay fast.
fn test_config() -> Config {
    let mut config = Config::default();
    config.network.retry_attempts = 0;
    config
}

fn build_pipeline(
    config: Config,
    cache: ProfileCache,
    sources: Vec<Box<dyn EnrichmentSource>>,
) -> EnrichmentPipeline {
    let config = Arc::new(config);
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.limits.clone()));
    EnrichmentPipeline::with_sources(
        config,
        SourceOptions::default(),
        Arc::new(cache),
        limiter,
        sources,
    )
    .unwrap()
}

#[tokio::test]
async fn cached_second_call_invokes_no_sources() {
    let (source, calls) = CannedSource::new(
        "whois",
        vec![Signal::Registrar("Example Registrar".to_string())],
    );
    let cache = ProfileCache::new(true, Duration::from_secs(3600));
    let pipeline = build_pipeline(test_config(), cache, vec![Box::new(source)]);

    let first = pipeline.enrich("example.com").await.unwrap();
    // Different spelling, same cache key after normalization.
    let second = pipeline.enrich("EXAMPLE.COM").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert_eq!(second.registrar.as_deref(), Some("Example Registrar"));
}

#[tokio::test]
async fn disabled_cache_invokes_sources_each_time() {
    let (source, calls) = CannedSource::new("whois", vec![]);
    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(test_config(), cache, vec![Box::new(source)]);

    pipeline.enrich("example.com").await.unwrap();
    pipeline.enrich("example.com").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_cache_entry_triggers_reenrichment() {
    let (source, calls) = CannedSource::new("whois", vec![]);
    // Zero TTL: every stored entry is already expired on the next read.
    let cache = ProfileCache::new(true, Duration::ZERO);
    let pipeline = build_pipeline(test_config(), cache, vec![Box::new(source)]);

    pipeline.enrich("example.com").await.unwrap();
    pipeline.enrich("example.com").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.cache_stats().total_entries, 1);
}

#[tokio::test]
async fn failing_source_leaves_other_fields_intact() {
    let (source, _calls) = CannedSource::new("cms", vec![Signal::Cms("WordPress".to_string())]);
    let sources: Vec<Box<dyn EnrichmentSource>> = vec![Box::new(FailingSource), Box::new(source)];
    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(test_config(), cache, sources);

    let profile = pipeline.enrich("vendor-shop.example").await.unwrap();

    assert_eq!(profile.cms.as_deref(), Some("WordPress"));
    assert_eq!(profile.provenance.get("cms").map(String::as_str), Some("cms"));
}

#[tokio::test]
async fn rate_limited_source_is_skipped() {
    let (source, _calls) = CannedSource::new(
        "whois",
        vec![Signal::Registrar("Example Registrar".to_string())],
    );
    let sources: Vec<Box<dyn EnrichmentSource>> =
        vec![Box::new(RateLimitedSource), Box::new(source)];
    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(test_config(), cache, sources);

    let profile = pipeline.enrich("example.com").await.unwrap();

    assert_eq!(profile.registrar.as_deref(), Some("Example Registrar"));
}

#[tokio::test]
async fn collected_signals_drive_risk_scoring() {
    let (source, _calls) = CannedSource::new(
        "stub",
        vec![
            Signal::PaymentProcessors(vec!["crypto".to_string()]),
            Signal::HostName("Bulletproof Hosting Ltd".to_string()),
        ],
    );
    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(test_config(), cache, vec![Box::new(source)]);

    let profile = pipeline.enrich("fakeidpro.com").await.unwrap();

    assert!(profile.risk_score >= 65);
    assert_eq!(profile.vendor_type, Some(VendorType::SyntheticIdentity));
    assert_eq!(profile.vendor_name.as_deref(), Some("Fakeidpro"));
}

#[tokio::test]
async fn geoip_falls_back_to_ip_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iplocate/198.51.100.7"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ip-api/198.51.100.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "org": "Bulletproof Hosting Ltd",
            "as": "AS64500 BPH",
            "isp": "BPH Networks",
            "country": "Seychelles",
            "city": "Victoria"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.endpoints.iplocate_url = format!("{}/iplocate", server.uri());
    config.endpoints.ip_api_url = format!("{}/ip-api", server.uri());

    let sources: Vec<Box<dyn EnrichmentSource>> = vec![
        Box::new(ResolvedIpStub {
            ip: "198.51.100.7",
        }),
        Box::new(GeoIpSource::new()),
    ];
    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(config, cache, sources);

    let profile = pipeline.enrich("bph-vendor.example").await.unwrap();

    assert_eq!(profile.ip_address.as_deref(), Some("198.51.100.7"));
    assert_eq!(
        profile.host_name.as_deref(),
        Some("Bulletproof Hosting Ltd")
    );
    assert_eq!(profile.asn.as_deref(), Some("AS64500 BPH"));
    assert_eq!(profile.country.as_deref(), Some("Seychelles"));
}

#[tokio::test]
async fn threat_feeds_fill_subdomains_and_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crtsh/"))
        .and(query_param("q", "darkvendor.example"))
        .and(query_param("output", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name_value": "www.darkvendor.example\nshop.darkvendor.example"},
            {"name_value": "*.darkvendor.example"},
            {"name_value": "SHOP.DARKVENDOR.EXAMPLE"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/urlhaus/darkvendor.example/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query_status": "ok",
            "firstseen": "2024-11-02 07:15:04 UTC",
            "threat": {"threat_type": "malware_download"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.endpoints.crtsh_url = format!("{}/crtsh", server.uri());
    config.endpoints.urlhaus_url = format!("{}/urlhaus", server.uri());

    let cache = ProfileCache::new(false, Duration::from_secs(3600));
    let pipeline = build_pipeline(config, cache, vec![Box::new(ThreatIntelSource::new())]);

    let profile = pipeline.enrich("darkvendor.example").await.unwrap();

    assert_eq!(
        profile.subdomains,
        vec!["shop.darkvendor.example", "www.darkvendor.example"]
    );
    let threat = profile.threat.unwrap();
    assert!(threat.is_malicious);
    assert_eq!(threat.threat_type.as_deref(), Some("malware_download"));
    assert_eq!(threat.first_seen.as_deref(), Some("2024-11-02 07:15:04 UTC"));
}

#[tokio::test]
async fn homepage_is_fetched_once_for_all_consumers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><link href="/wp-content/style.css">
               Pay via bitcoin.org. Contact telegram: @vendor123</html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    // The context fetches http://<domain>, so the mock server's host:port
    // stands in for the domain here.
    let host = server.uri().trim_start_matches("http://").to_string();
    let mut ctx = EnrichmentContext::new(
        host,
        SourceOptions::default(),
        Arc::new(test_config()),
        reqwest::Client::new(),
        Arc::new(RateLimiter::new(HashMap::new())),
    );

    let cms = CmsSource::new().collect(&mut ctx).await.unwrap();
    let payment = PaymentSource::new().collect(&mut ctx).await.unwrap();
    let content = ContentSource::new().collect(&mut ctx).await.unwrap();

    assert_eq!(cms, vec![Signal::Cms("WordPress".to_string())]);
    assert_eq!(
        payment,
        vec![Signal::PaymentProcessors(vec!["crypto".to_string()])]
    );
    assert!(!content.is_empty());
    assert_eq!(ctx.http_requests, 1);
}
