//! Threat-intelligence enrichment from free feeds.
//!
//! Two independent lookups: certificate-transparency logs via crt.sh for the
//! domain's subdomain footprint, and the URLhaus host endpoint for malware
//! listings. Each sits behind its own limiter key and a failure in one never
//! masks the other's result.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{fetch_json, EnrichmentContext, EnrichmentSource, Signal};
use crate::errors::Result;
use crate::profile::ThreatIntel;

pub const CRTSH_SOURCE: &str = "crtsh";
pub const URLHAUS_SOURCE: &str = "urlhaus";

/// How long a threat-intel call will wait on a saturated limiter.
const THREAT_MAX_WAIT: Duration = Duration::from_secs(1);

/// One certificate row from crt.sh; `name_value` holds newline-separated
/// DNS names covered by the certificate.
#[derive(Debug, Deserialize)]
struct CrtShEntry {
    #[serde(default)]
    name_value: String,
}

pub struct ThreatIntelSource;

impl ThreatIntelSource {
    pub fn new() -> Self {
        Self
    }

    async fn query_subdomains(&self, ctx: &mut EnrichmentContext) -> Result<Option<Signal>> {
        let domain = ctx.domain.clone();
        let url = format!(
            "{}/?q={}&output=json",
            ctx.config().endpoints.crtsh_url.trim_end_matches('/'),
            domain
        );
        let data = fetch_json(ctx, CRTSH_SOURCE, url, THREAT_MAX_WAIT).await?;
        let entries: Vec<CrtShEntry> = serde_json::from_value(data)?;
        let subdomains = extract_subdomains(&entries, &domain);
        if subdomains.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Signal::Subdomains(subdomains)))
        }
    }

    async fn query_urlhaus(&self, ctx: &mut EnrichmentContext) -> Result<Option<Signal>> {
        let url = format!(
            "{}/{}/",
            ctx.config().endpoints.urlhaus_url.trim_end_matches('/'),
            ctx.domain
        );
        let data = fetch_json(ctx, URLHAUS_SOURCE, url, THREAT_MAX_WAIT).await?;
        Ok(Some(Signal::Threat(parse_urlhaus(&data))))
    }
}

impl Default for ThreatIntelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for ThreatIntelSource {
    fn name(&self) -> &'static str {
        "threat_intel"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_threat_intel {
            return Ok(vec![]);
        }
        let mut signals = Vec::new();

        match self.query_subdomains(ctx).await {
            Ok(signal) => signals.extend(signal),
            Err(e) if e.is_rate_limited() => {
                debug!(domain = %ctx.domain, "crt.sh lookup skipped by rate limiter");
            }
            Err(e) => {
                debug!(domain = %ctx.domain, error = %e, "crt.sh lookup failed");
                ctx.warnings.push(format!("crt.sh subdomain lookup failed: {e}"));
            }
        }

        match self.query_urlhaus(ctx).await {
            Ok(signal) => signals.extend(signal),
            Err(e) if e.is_rate_limited() => {
                debug!(domain = %ctx.domain, "urlhaus lookup skipped by rate limiter");
            }
            Err(e) => {
                debug!(domain = %ctx.domain, error = %e, "urlhaus lookup failed");
                ctx.warnings.push(format!("URLhaus lookup failed: {e}"));
            }
        }

        Ok(signals)
    }
}

/// Flattens certificate names into a sorted, deduplicated subdomain list.
/// Wildcard prefixes are stripped first, then the queried domain itself is
/// excluded, so `*.example.com` never reintroduces the apex.
fn extract_subdomains(entries: &[CrtShEntry], domain: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    for entry in entries {
        for raw in entry.name_value.split('\n') {
            let name = raw.trim().to_lowercase();
            let name = name.strip_prefix("*.").unwrap_or(&name);
            if !name.is_empty() && name != domain {
                names.insert(name.to_string());
            }
        }
    }
    names.into_iter().collect()
}

/// URLhaus verdict for a host. Any completed query yields a verdict; a host
/// the feed does not know is reported clean. `threat_type` and `first_seen`
/// are only carried for listed hosts.
fn parse_urlhaus(data: &Value) -> ThreatIntel {
    let mut intel = ThreatIntel::default();
    if data.get("query_status").and_then(Value::as_str) != Some("ok") {
        return intel;
    }
    let threat_type = data
        .get("threat")
        .and_then(|t| t.get("threat_type"))
        .and_then(Value::as_str);
    if let Some(threat_type) = threat_type {
        intel.is_malicious = true;
        intel.threat_type = Some(threat_type.to_string());
        intel.first_seen = data
            .get("firstseen")
            .and_then(Value::as_str)
            .map(String::from);
    }
    intel
}
