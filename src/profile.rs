//! The enrichment record: one fixed-shape profile per domain.
//!
//! Every enrichment produces a `DomainProfile` with the same set of fields;
//! sources that failed or were skipped leave their fields null/empty rather
//! than shrinking the record. Downstream consumers (reports, clustering,
//! storage) can therefore rely on the shape without per-field existence
//! checks. The `provenance` map records which source supplied each populated
//! field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vendor classification assigned by the risk scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VendorType {
    /// Sells fabricated identities or identity documents
    SyntheticIdentity,
    /// Sells face-swap / voice-clone / deepfake services
    Deepfake,
    /// Sells impersonation personas or profile kits
    Impersonation,
}

impl std::fmt::Display for VendorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VendorType::SyntheticIdentity => "synthetic_identity",
            VendorType::Deepfake => "deepfake",
            VendorType::Impersonation => "impersonation",
        };
        f.write_str(s)
    }
}

/// URLhaus verdict for the domain's host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ThreatIntel {
    /// Whether URLhaus lists the host
    pub is_malicious: bool,

    /// Reported threat type (e.g. `malware_download`), if listed
    pub threat_type: Option<String>,

    /// First-seen timestamp as reported, verbatim
    pub first_seen: Option<String>,
}

/// Signals mined from the publicly served homepage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ContentSignals {
    /// Vendor keyword phrases found in the page body
    pub suspicious_keywords: Vec<String>,

    /// Pricing mentions ($/€/£ amounts, BTC/ETH quantities), capped
    pub pricing_mentions: Vec<String>,

    /// Contact e-mail addresses found on the page, capped
    pub contact_emails: Vec<String>,

    /// Telegram handles / t.me links found on the page
    pub telegram_handles: Vec<String>,

    /// Messaging platforms mentioned (telegram, discord, ...)
    pub messaging_platforms: Vec<String>,
}

impl ContentSignals {
    pub fn is_empty(&self) -> bool {
        self.suspicious_keywords.is_empty()
            && self.pricing_mentions.is_empty()
            && self.contact_emails.is_empty()
            && self.telegram_handles.is_empty()
            && self.messaging_platforms.is_empty()
    }
}

/// One enriched domain. Unique key: the normalized `domain`.
///
/// Unlike the report envelopes, this struct never skips fields during
/// serialization: absent values appear as `null` / `[]` so every consumer
/// sees the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DomainProfile {
    /// Normalized domain name (lowercase, no scheme/www/path)
    pub domain: String,

    // ------------------------- registration (WHOIS) -------------------------
    /// Sponsoring registrar
    pub registrar: Option<String>,

    /// Registration date
    pub creation_date: Option<DateTime<Utc>>,

    /// Registry expiry date
    pub expiration_date: Option<DateTime<Utc>>,

    /// Last registry update
    pub updated_date: Option<DateTime<Utc>>,

    /// EPP status codes (e.g. `clientTransferProhibited`)
    pub whois_status: Vec<String>,

    /// Registrant organization, if the registry discloses it
    pub registrant_org: Option<String>,

    /// Delegated name servers (DNS-authoritative, WHOIS as fallback)
    pub name_servers: Vec<String>,

    // ----------------------------- resolution -------------------------------
    /// First resolved IPv4 address
    pub ip_address: Option<String>,

    /// All resolved IPv4 addresses, resolver order
    pub ip_addresses: Vec<String>,

    /// Resolved IPv6 addresses
    pub ipv6_addresses: Vec<String>,

    /// MX exchange hosts
    pub mx_records: Vec<String>,

    // ------------------------------ hosting ---------------------------------
    /// Hosting organization for the resolved IP
    pub host_name: Option<String>,

    /// Autonomous system (e.g. `AS13335`)
    pub asn: Option<String>,

    /// ISP name for the resolved IP
    pub isp: Option<String>,

    /// Country of the resolved IP
    pub country: Option<String>,

    /// City of the resolved IP
    pub city: Option<String>,

    /// Detected CDN product, if any
    pub cdn: Option<String>,

    // ------------------------------- web ------------------------------------
    /// Detected CMS product, if any
    pub cms: Option<String>,

    /// Payment processors referenced by the homepage (ordered set)
    pub payment_processors: Vec<String>,

    /// Homepage content signals
    pub content: ContentSignals,

    // ------------------------------ threat ----------------------------------
    /// Certificate-transparency subdomains (sorted, apex excluded)
    pub subdomains: Vec<String>,

    /// URLhaus verdict; present when the lookup completed
    pub threat: Option<ThreatIntel>,

    // ------------------------------ scoring ---------------------------------
    /// Vendor classification, absent when no category matched
    pub vendor_type: Option<VendorType>,

    /// Risk score, always within 0..=100
    pub risk_score: u8,

    /// Display name derived from the domain or registrant
    pub vendor_name: Option<String>,

    // ----------------------------- bookkeeping ------------------------------
    /// When this profile was produced
    pub enriched_at: DateTime<Utc>,

    /// Which source populated each field (field name -> source name)
    pub provenance: BTreeMap<String, String>,
}

impl DomainProfile {
    /// Empty profile for a normalized domain; all signal fields unset.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            registrar: None,
            creation_date: None,
            expiration_date: None,
            updated_date: None,
            whois_status: Vec::new(),
            registrant_org: None,
            name_servers: Vec::new(),
            ip_address: None,
            ip_addresses: Vec::new(),
            ipv6_addresses: Vec::new(),
            mx_records: Vec::new(),
            host_name: None,
            asn: None,
            isp: None,
            country: None,
            city: None,
            cdn: None,
            cms: None,
            payment_processors: Vec::new(),
            content: ContentSignals::default(),
            subdomains: Vec::new(),
            threat: None,
            vendor_type: None,
            risk_score: 0,
            vendor_name: None,
            enriched_at: Utc::now(),
            provenance: BTreeMap::new(),
        }
    }

    /// Infrastructure fingerprint: sorted `label:value` pairs joined with `|`
    /// over hosting org, CDN, registrar and the payment processor set. Empty
    /// string when none of the four fields is populated.
    ///
    /// Recomputed on demand and never stored, so it cannot go stale when
    /// fields change.
    pub fn infrastructure_fingerprint(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);
        if let Some(host) = &self.host_name {
            parts.push(format!("host:{host}"));
        }
        if let Some(cdn) = &self.cdn {
            parts.push(format!("cdn:{cdn}"));
        }
        if let Some(registrar) = &self.registrar {
            parts.push(format!("registrar:{registrar}"));
        }
        if !self.payment_processors.is_empty() {
            parts.push(format!("payment:{}", self.payment_processors.join(",")));
        }
        parts.sort();
        parts.join("|")
    }
}
