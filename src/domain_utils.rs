//! Domain input normalization and Public Suffix List helpers.
//!
//! Enrichment accepts messy operator input (URLs pasted from reports, mixed
//! case, trailing dots) and needs one canonical form per domain so that
//! caching, rate limiting and clustering all agree on identity. PSL-backed
//! parsing handles multi-part suffixes properly:
//! - subdomain.example.co.uk -> example.co.uk
//! - subdomain.example.com -> example.com
//! - mysite.github.io -> mysite.github.io (github.io is a public suffix)

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use psl::{domain_str, suffix_str};
use regex::Regex;

/// RFC 1035 practical limit after normalization.
const MAX_DOMAIN_LEN: usize = 253;

/// LDH labels, each 1-63 chars, not starting or ending with a hyphen,
/// followed by an alphabetic TLD of at least two chars. Punycode (`xn--`)
/// labels pass as ordinary LDH text.
static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").unwrap()
});

/// Normalize raw user input into a canonical domain name.
///
/// Strips scheme, a leading `www.` label, path/query and port, lowercases,
/// removes the trailing dot, then validates syntax and length. Returns the
/// canonical form or an error describing why the input is not a usable
/// domain name.
pub fn normalize_domain(input: &str) -> Result<String> {
    let lowered = input.trim().to_lowercase();
    let clean = lowered
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_start_matches("ftp://");
    let clean = clean.strip_prefix("www.").unwrap_or(clean);
    let clean = clean
        .split('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .trim_end_matches('.');

    if clean.is_empty() {
        return Err(anyhow!("empty domain"));
    }
    if clean.len() > MAX_DOMAIN_LEN {
        return Err(anyhow!(
            "domain exceeds {} characters after normalization",
            MAX_DOMAIN_LEN
        ));
    }
    if !DOMAIN_RE.is_match(clean) {
        return Err(anyhow!("invalid domain syntax: {}", clean));
    }

    Ok(clean.to_string())
}

/// Domain information extracted using PSL or fallback parsing
#[derive(Debug, Clone, PartialEq)]
pub struct DomainInfo {
    /// The full domain as provided (already normalized)
    pub full_domain: String,
    /// The registrable domain (what you can actually register)
    pub registrable_domain: Option<String>,
    /// The subdomain part (if any)
    pub subdomain: Option<String>,
    /// The public suffix (TLD or effective TLD)
    pub suffix: Option<String>,
}

impl DomainInfo {
    /// Parse a domain string into structured domain information
    pub fn parse(domain: &str) -> Result<Self> {
        let clean = normalize_domain(domain)?;
        Ok(Self::parse_with_psl(&clean))
    }

    fn parse_with_psl(domain: &str) -> Self {
        let mut registrable_domain = domain_str(domain).map(|s| s.to_string());
        let mut subdomain = registrable_domain
            .as_ref()
            .and_then(|reg| subdomain_for(domain, reg));

        if registrable_domain.is_none() {
            let (fallback_reg, fallback_sub) = fallback_registrable_domain(domain);
            registrable_domain = fallback_reg;
            subdomain = fallback_sub;
        }

        let mut suffix = suffix_str(domain).map(|s| s.to_string());
        if suffix.is_none() {
            suffix = domain.split('.').skip(1).last().map(|s| s.to_string());
        }
        if suffix.as_ref().map(|s| s.is_empty()).unwrap_or(false) {
            suffix = None;
        }

        DomainInfo {
            full_domain: domain.to_string(),
            registrable_domain,
            subdomain,
            suffix,
        }
    }
}

/// The label a vendor actually chose when registering: the first label of
/// the registrable domain. `shop.fakeidpro.co.uk` -> `fakeidpro`, not `shop`.
pub fn vendor_label(domain: &str) -> String {
    let registrable = domain_str(domain)
        .map(|s| s.to_string())
        .unwrap_or_else(|| domain.to_string());
    registrable
        .split('.')
        .next()
        .unwrap_or(domain)
        .to_string()
}

fn subdomain_for(full_domain: &str, registrable: &str) -> Option<String> {
    if full_domain == registrable {
        return None;
    }
    if full_domain.len() <= registrable.len() {
        return None;
    }
    if !full_domain.ends_with(registrable) {
        return None;
    }
    let prefix_len = full_domain.len() - registrable.len() - 1;
    if prefix_len == 0 || prefix_len >= full_domain.len() {
        None
    } else {
        Some(full_domain[..prefix_len].to_string())
    }
}

fn fallback_registrable_domain(domain: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return (Some(domain.to_string()), None);
    }
    let registrable = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    let subdomain = if parts.len() > 2 {
        Some(parts[..parts.len() - 2].join("."))
    } else {
        None
    };
    (Some(registrable), subdomain)
}
