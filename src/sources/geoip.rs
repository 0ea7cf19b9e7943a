//! IP geolocation and hosting-provider enrichment.
//!
//! Primary lookup is iplocate.io (generous daily quota, optional API key);
//! ip-api.com is the fallback when the primary fails or is rate limited.
//! Each service sits behind its own limiter key so a throttled primary does
//! not burn fallback quota. Runs only when the DNS source resolved an IPv4
//! address for the domain.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{fetch_json, EnrichmentContext, EnrichmentSource, Signal};
use crate::errors::{Result, VendorScopeError};

pub const IPLOCATE_SOURCE: &str = "iplocate.io";
pub const IP_API_SOURCE: &str = "ip-api.com";

/// How long a geolocation call will wait on a saturated limiter.
const GEOIP_MAX_WAIT: Duration = Duration::from_secs(2);

pub struct GeoIpSource;

impl GeoIpSource {
    pub fn new() -> Self {
        Self
    }

    async fn query_iplocate(&self, ctx: &mut EnrichmentContext, ip: &str) -> Result<Vec<Signal>> {
        let endpoints = &ctx.config().endpoints;
        let mut url = format!("{}/{}", endpoints.iplocate_url.trim_end_matches('/'), ip);
        if let Some(key) = &endpoints.iplocate_api_key {
            url.push_str(&format!("?apikey={key}"));
        }
        let data = fetch_json(ctx, IPLOCATE_SOURCE, url, GEOIP_MAX_WAIT).await?;
        Ok(iplocate_signals(&data))
    }

    async fn query_ip_api(&self, ctx: &mut EnrichmentContext, ip: &str) -> Result<Vec<Signal>> {
        let url = format!(
            "{}/{}",
            ctx.config().endpoints.ip_api_url.trim_end_matches('/'),
            ip
        );
        let data = fetch_json(ctx, IP_API_SOURCE, url, GEOIP_MAX_WAIT).await?;
        if data.get("status").and_then(Value::as_str) != Some("success") {
            let reported = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("lookup status was not success");
            return Err(VendorScopeError::source_failure(
                IP_API_SOURCE,
                &ctx.domain,
                reported,
            ));
        }
        Ok(ip_api_signals(&data))
    }
}

impl Default for GeoIpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for GeoIpSource {
    fn name(&self) -> &'static str {
        "geoip"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_geoip {
            return Ok(vec![]);
        }
        let Some(ip) = ctx.resolved_ip.clone() else {
            return Ok(vec![]);
        };

        match self.query_iplocate(ctx, &ip).await {
            Ok(signals) => return Ok(signals),
            Err(e) => {
                debug!(domain = %ctx.domain, error = %e, "iplocate lookup failed, trying ip-api");
            }
        }
        self.query_ip_api(ctx, &ip).await
    }
}

fn iplocate_signals(data: &Value) -> Vec<Signal> {
    let mut signals = Vec::new();
    // Hosting org, falling back to the ASN owner name.
    if let Some(v) = json_str(&data["org"]).or_else(|| json_str(&data["asn"]["name"])) {
        signals.push(Signal::HostName(v));
    }
    if let Some(v) = json_str(&data["asn"]["asn"]) {
        signals.push(Signal::Asn(v));
    }
    if let Some(v) = json_str(&data["org"]) {
        signals.push(Signal::Isp(v));
    }
    if let Some(v) = json_str(&data["country"]) {
        signals.push(Signal::Country(v));
    }
    if let Some(v) = json_str(&data["city"]) {
        signals.push(Signal::City(v));
    }
    signals
}

fn ip_api_signals(data: &Value) -> Vec<Signal> {
    let mut signals = Vec::new();
    if let Some(v) = json_str(&data["org"]) {
        signals.push(Signal::HostName(v));
    }
    if let Some(v) = json_str(&data["as"]) {
        signals.push(Signal::Asn(v));
    }
    if let Some(v) = json_str(&data["isp"]) {
        signals.push(Signal::Isp(v));
    }
    if let Some(v) = json_str(&data["country"]) {
        signals.push(Signal::Country(v));
    }
    if let Some(v) = json_str(&data["city"]) {
        signals.push(Signal::City(v));
    }
    signals
}

/// Non-empty string or number rendered as a string; APIs disagree on which
/// they send for ASN values.
fn json_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn iplocate_mapping() {
        let data = json!({
            "ip": "203.0.113.9",
            "country": "Seychelles",
            "city": "Victoria",
            "org": "Bulletproof Hosting Ltd",
            "asn": {"asn": "AS64500", "name": "BULLET-AS"}
        });
        let signals = iplocate_signals(&data);
        assert!(signals.contains(&Signal::HostName("Bulletproof Hosting Ltd".to_string())));
        assert!(signals.contains(&Signal::Asn("AS64500".to_string())));
        assert!(signals.contains(&Signal::Isp("Bulletproof Hosting Ltd".to_string())));
        assert!(signals.contains(&Signal::Country("Seychelles".to_string())));
        assert!(signals.contains(&Signal::City("Victoria".to_string())));
    }

    #[test]
    fn iplocate_falls_back_to_asn_name_for_host() {
        let data = json!({"asn": {"asn": 64500, "name": "BULLET-AS"}});
        let signals = iplocate_signals(&data);
        assert!(signals.contains(&Signal::HostName("BULLET-AS".to_string())));
        // Numeric ASN is rendered as a string.
        assert!(signals.contains(&Signal::Asn("64500".to_string())));
        // No org means no ISP signal.
        assert!(!signals.iter().any(|s| matches!(s, Signal::Isp(_))));
    }

    #[test]
    fn ip_api_mapping() {
        let data = json!({
            "status": "success",
            "country": "Netherlands",
            "city": "Amsterdam",
            "isp": "Example ISP",
            "org": "Example Org",
            "as": "AS64501 EXAMPLE-AS"
        });
        let signals = ip_api_signals(&data);
        assert!(signals.contains(&Signal::HostName("Example Org".to_string())));
        assert!(signals.contains(&Signal::Asn("AS64501 EXAMPLE-AS".to_string())));
        assert!(signals.contains(&Signal::Isp("Example ISP".to_string())));
    }

    #[test]
    fn empty_strings_are_dropped() {
        let data = json!({"org": "", "country": "DE"});
        let signals = iplocate_signals(&data);
        assert!(!signals.iter().any(|s| matches!(s, Signal::HostName(_))));
        assert!(signals.contains(&Signal::Country("DE".to_string())));
    }
}
