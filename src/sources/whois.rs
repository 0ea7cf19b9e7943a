//! WHOIS enrichment over raw TCP port 43.
//!
//! Server discovery is two-step: `whois.iana.org` is asked once per TLD for
//! the registry server (`refer:` line, cached for the life of the source),
//! then the registry is queried for the domain. When the registry response
//! names a registrar WHOIS server, that referral is followed for the richer
//! registrant data, bounded by the configured depth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{EnrichmentContext, EnrichmentSource, Signal};
use crate::errors::{Result, VendorScopeError};

/// WHOIS TCP port.
const WHOIS_PORT: u16 = 43;

/// Root server used to discover the registry server for a TLD.
const IANA_WHOIS: &str = "whois.iana.org";

// "refer:        whois.verisign-grs.com" (IANA style)
static REFER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*refer:\s*([A-Za-z0-9._\-]+)\s*$").unwrap());
// "Registrar WHOIS Server: whois.namecheap.com" (registry style)
static REGISTRAR_SERVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Registrar WHOIS Server:\s*([A-Za-z0-9._\-]+)\s*$").unwrap());

/// Registration-record source. Safe to share across a batch: the only state
/// is the per-TLD registry cache behind a mutex.
pub struct WhoisSource {
    /// TLD -> registry server, learned from IANA once per process.
    referrals: Mutex<HashMap<String, String>>,
}

impl WhoisSource {
    pub fn new() -> Self {
        Self {
            referrals: Mutex::new(HashMap::new()),
        }
    }

    fn cached_referral(&self, tld: &str) -> Option<String> {
        let referrals = self
            .referrals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        referrals.get(tld).cloned()
    }

    fn store_referral(&self, tld: &str, server: &str) {
        let mut referrals = self
            .referrals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        referrals.insert(tld.to_string(), server.to_string());
    }

    async fn registry_server(&self, ctx: &mut EnrichmentContext, tld: &str) -> Result<String> {
        if let Some(server) = self.cached_referral(tld) {
            return Ok(server);
        }
        let to = ctx.config().network.whois_timeout;
        ctx.whois_queries += 1;
        let response = simple_whois(IANA_WHOIS, tld, to).await?;
        let server = REFER_RE
            .captures(&response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .ok_or_else(|| {
                VendorScopeError::whois_query(IANA_WHOIS, tld, "no registry referral in response")
            })?;
        self.store_referral(tld, &server);
        Ok(server)
    }
}

impl Default for WhoisSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for WhoisSource {
    fn name(&self) -> &'static str {
        "whois"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_whois {
            return Ok(vec![]);
        }

        let domain = ctx.domain.clone();
        let tld = domain.rsplit('.').next().unwrap_or(&domain).to_string();
        let to = ctx.config().network.whois_timeout;
        let max_referrals = ctx.config().network.max_whois_referrals;

        let mut server = self.registry_server(ctx, &tld).await?;
        let mut combined = String::new();
        let mut visited: Vec<String> = Vec::new();

        for _ in 0..max_referrals {
            if visited.contains(&server) {
                break;
            }
            visited.push(server.clone());

            ctx.whois_queries += 1;
            let response = match simple_whois(&server, &domain, to).await {
                Ok(r) => r,
                Err(e) if combined.is_empty() => return Err(e),
                Err(e) => {
                    debug!(server = %server, error = %e, "registrar whois hop failed");
                    break;
                }
            };

            let next = REGISTRAR_SERVER_RE
                .captures(&response)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_ascii_lowercase());
            combined.push_str(&response);
            combined.push('\n');

            match next {
                Some(n) if !visited.contains(&n) => server = n,
                _ => break,
            }
        }

        Ok(parse_response(&combined).into_signals())
    }
}

/// Perform one WHOIS query (canonical `<query>\r\n` over TCP 43) with a
/// timeout on each phase.
pub async fn simple_whois(server: &str, query: &str, to: Duration) -> Result<String> {
    let mut stream = match timeout(to, TcpStream::connect((server, WHOIS_PORT))).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            return Err(VendorScopeError::whois_query(
                server,
                query,
                format!("connect error: {e}"),
            ));
        }
        Err(_) => {
            return Err(VendorScopeError::whois_query(server, query, "connect timeout"));
        }
    };

    let line = format!("{query}\r\n");
    timeout(to, stream.write_all(line.as_bytes()))
        .await
        .map_err(|_| VendorScopeError::whois_query(server, query, "write timeout"))?
        .map_err(|e| VendorScopeError::whois_query(server, query, format!("write error: {e}")))?;

    let mut buf = Vec::new();
    timeout(to, stream.read_to_end(&mut buf))
        .await
        .map_err(|_| VendorScopeError::whois_query(server, query, "read timeout"))?
        .map_err(|e| VendorScopeError::whois_query(server, query, format!("read error: {e}")))?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Default, PartialEq)]
struct WhoisFields {
    registrar: Option<String>,
    creation_date: Option<DateTime<Utc>>,
    expiration_date: Option<DateTime<Utc>>,
    updated_date: Option<DateTime<Utc>>,
    name_servers: Vec<String>,
    status: Vec<String>,
    registrant_org: Option<String>,
}

impl WhoisFields {
    fn into_signals(self) -> Vec<Signal> {
        let mut signals = Vec::new();
        if let Some(v) = self.registrar {
            signals.push(Signal::Registrar(v));
        }
        if let Some(v) = self.creation_date {
            signals.push(Signal::CreationDate(v));
        }
        if let Some(v) = self.expiration_date {
            signals.push(Signal::ExpirationDate(v));
        }
        if let Some(v) = self.updated_date {
            signals.push(Signal::UpdatedDate(v));
        }
        if !self.status.is_empty() {
            signals.push(Signal::WhoisStatus(self.status));
        }
        if let Some(v) = self.registrant_org {
            signals.push(Signal::RegistrantOrg(v));
        }
        if !self.name_servers.is_empty() {
            signals.push(Signal::NameServers(self.name_servers));
        }
        signals
    }
}

/// Key/value parse of a WHOIS response. First match wins per scalar field
/// (registry data precedes registrar data in the combined text); name
/// servers and statuses accumulate without duplicates.
fn parse_response(text: &str) -> WhoisFields {
    let mut fields = WhoisFields::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "registrar" => {
                if fields.registrar.is_none() {
                    fields.registrar = Some(value.to_string());
                }
            }
            "creation date" | "created" => {
                if fields.creation_date.is_none() {
                    fields.creation_date = parse_date(value);
                }
            }
            "registry expiry date" | "expiration date" => {
                if fields.expiration_date.is_none() {
                    fields.expiration_date = parse_date(value);
                }
            }
            "updated date" => {
                if fields.updated_date.is_none() {
                    fields.updated_date = parse_date(value);
                }
            }
            "name server" => {
                let ns = value.trim_end_matches('.').to_lowercase();
                if !ns.is_empty() && !fields.name_servers.contains(&ns) {
                    fields.name_servers.push(ns);
                }
            }
            "domain status" => {
                let status = value.to_string();
                if !fields.status.contains(&status) {
                    fields.status.push(status);
                }
            }
            "registrant organization" => {
                if fields.registrant_org.is_none() {
                    fields.registrant_org = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    fields
}

/// Registry dates come as RFC 3339; older registries emit bare `YYYY-MM-DD`.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const REGISTRY_RESPONSE: &str = "\
   Domain Name: FAKEIDPRO.COM\n\
   Registrar WHOIS Server: whois.registrar.example\n\
   Registrar: Privacy Registrar Inc\n\
   Updated Date: 2024-05-01T10:20:30Z\n\
   Creation Date: 2023-11-15T08:00:00Z\n\
   Registry Expiry Date: 2025-11-15T08:00:00Z\n\
   Domain Status: clientTransferProhibited https://icann.org/epp#clientTransferProhibited\n\
   Name Server: NS1.BULLETHOST.NET.\n\
   Name Server: NS2.BULLETHOST.NET.\n";

    const REGISTRAR_RESPONSE: &str = "\
Domain Name: fakeidpro.com\n\
Registrar: Different Registrar Name\n\
Registrant Organization: Shadow Holdings Ltd\n\
Name Server: ns1.bullethost.net\n\
Name Server: ns3.bullethost.net\n\
Creation Date: 2023-11-15\n";

    #[test]
    fn parses_registry_fields() {
        let fields = parse_response(REGISTRY_RESPONSE);
        assert_eq!(fields.registrar.as_deref(), Some("Privacy Registrar Inc"));
        assert_eq!(fields.creation_date.unwrap().year(), 2023);
        assert_eq!(fields.expiration_date.unwrap().year(), 2025);
        assert_eq!(fields.updated_date.unwrap().month(), 5);
        assert_eq!(
            fields.name_servers,
            vec!["ns1.bullethost.net".to_string(), "ns2.bullethost.net".to_string()]
        );
        assert_eq!(fields.status.len(), 1);
    }

    #[test]
    fn first_match_wins_and_name_servers_accumulate() {
        let combined = format!("{REGISTRY_RESPONSE}\n{REGISTRAR_RESPONSE}");
        let fields = parse_response(&combined);
        // Registry value kept, registrar duplicate ignored.
        assert_eq!(fields.registrar.as_deref(), Some("Privacy Registrar Inc"));
        assert_eq!(fields.registrant_org.as_deref(), Some("Shadow Holdings Ltd"));
        // ns1 deduplicated, ns3 appended.
        assert_eq!(
            fields.name_servers,
            vec![
                "ns1.bullethost.net".to_string(),
                "ns2.bullethost.net".to_string(),
                "ns3.bullethost.net".to_string(),
            ]
        );
    }

    #[test]
    fn date_formats() {
        assert!(parse_date("2024-05-01T10:20:30Z").is_some());
        assert!(parse_date("2024-05-01T10:20:30+02:00").is_some());
        assert_eq!(parse_date("2024-05-01").unwrap().day(), 1);
        assert!(parse_date("May 1st 2024").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn referral_regexes() {
        let iana = "domain:      COM\nrefer:        whois.verisign-grs.com\nstatus: ACTIVE\n";
        let cap = REFER_RE.captures(iana).unwrap();
        assert_eq!(&cap[1], "whois.verisign-grs.com");

        let cap = REGISTRAR_SERVER_RE.captures(REGISTRY_RESPONSE).unwrap();
        assert_eq!(&cap[1], "whois.registrar.example");

        // URL-shaped values never match; no referral is followed.
        let url = "Registrar WHOIS Server: http://whois.example.com/path\n";
        assert!(REGISTRAR_SERVER_RE.captures(url).is_none());
    }

    #[test]
    fn empty_response_yields_no_signals() {
        let signals = parse_response("No match for domain \"NOBODY.INVALID\".\n").into_signals();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn simple_whois_unreachable_server_errors() {
        let res = simple_whois("invalid.whois.test.", "example", Duration::from_millis(500)).await;
        assert!(res.is_err());
    }
}
