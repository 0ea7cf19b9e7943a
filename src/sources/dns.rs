//! DNS enrichment: A / AAAA / MX / NS lookups plus CDN inference.
//!
//! One resolver is built at construction and shared across every enrichment.
//! Each record type is queried independently under the configured DNS
//! timeout; a failing record type is absorbed (a domain with no MX is
//! normal) so the remaining types still land. The CDN is inferred from the
//! name-server names, first indicator match wins.

use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{ResolverConfig, ResolverOpts},
    proto::rr::{Name, RData, RecordType},
};

use super::{EnrichmentContext, EnrichmentSource, Signal};
use crate::errors::{Result, VendorScopeError};

/// Name-server substring -> CDN product, checked in order.
const CDN_INDICATORS: &[(&str, &str)] = &[
    ("cloudflare", "Cloudflare"),
    ("fastly", "Fastly"),
    ("amazonaws", "Amazon CloudFront"),
    ("akamai", "Akamai"),
    ("maxcdn", "MaxCDN"),
    ("keycdn", "KeyCDN"),
];

pub struct DnsSource {
    resolver: TokioAsyncResolver,
}

impl DnsSource {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }

    /// One typed lookup; record values are rendered to normalized strings.
    async fn lookup_strings(
        &self,
        ctx: &mut EnrichmentContext,
        rtype: RecordType,
    ) -> Result<Vec<String>> {
        let domain = ctx.domain.clone();
        let name = Name::from_ascii(&domain).map_err(|e| {
            VendorScopeError::dns_resolution(&domain, rtype.to_string(), e.to_string())
        })?;

        ctx.dns_queries += 1;
        let dns_timeout = ctx.config().network.dns_timeout;
        let lookup = match timeout(dns_timeout, self.resolver.lookup(name, rtype)).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                return Err(VendorScopeError::dns_resolution(
                    &domain,
                    rtype.to_string(),
                    e.to_string(),
                ));
            }
            Err(_) => {
                return Err(VendorScopeError::dns_timeout(&domain, dns_timeout.as_secs()));
            }
        };

        let mut values = Vec::new();
        for record in lookup.iter() {
            match record {
                RData::A(a) => values.push(Ipv4Addr::from(*a).to_string()),
                RData::AAAA(aaaa) => values.push(Ipv6Addr::from(*aaaa).to_string()),
                RData::NS(ns) => values.push(normalize_host(&ns.0.to_utf8())),
                RData::MX(mx) => values.push(normalize_host(&mx.exchange().to_utf8())),
                _ => {}
            }
        }
        Ok(values)
    }

    /// Absorbing wrapper: a failed record type logs at debug and yields
    /// nothing rather than killing the whole DNS pass.
    async fn lookup_or_empty(&self, ctx: &mut EnrichmentContext, rtype: RecordType) -> Vec<String> {
        match self.lookup_strings(ctx, rtype).await {
            Ok(values) => values,
            Err(e) => {
                debug!(domain = %ctx.domain, record_type = %rtype, error = %e, "dns lookup failed");
                vec![]
            }
        }
    }
}

impl Default for DnsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for DnsSource {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_dns {
            return Ok(vec![]);
        }

        let a_records = self.lookup_or_empty(ctx, RecordType::A).await;
        let aaaa_records = self.lookup_or_empty(ctx, RecordType::AAAA).await;
        let mx_records = self.lookup_or_empty(ctx, RecordType::MX).await;
        let ns_records = self.lookup_or_empty(ctx, RecordType::NS).await;

        let mut signals = Vec::new();
        if let Some(first) = a_records.first() {
            ctx.resolved_ip = Some(first.clone());
            signals.push(Signal::IpAddress(first.clone()));
            signals.push(Signal::IpAddresses(a_records));
        }
        if !aaaa_records.is_empty() {
            signals.push(Signal::Ipv6Addresses(aaaa_records));
        }
        if !mx_records.is_empty() {
            signals.push(Signal::MxRecords(mx_records));
        }
        if !ns_records.is_empty() {
            if let Some(cdn) = detect_cdn(&ns_records) {
                signals.push(Signal::Cdn(cdn));
            }
            signals.push(Signal::NameServers(ns_records));
        }

        Ok(signals)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_lowercase()
}

fn detect_cdn(name_servers: &[String]) -> Option<String> {
    for ns in name_servers {
        let ns = ns.to_lowercase();
        for (indicator, cdn) in CDN_INDICATORS {
            if ns.contains(indicator) {
                return Some((*cdn).to_string());
            }
        }
    }
    None
}
