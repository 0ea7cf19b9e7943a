//! Deterministic risk scoring for enriched domains.
//!
//! The scorer is a pure function of a profile and a `ScoringRules` value:
//! no I/O, no clock, no randomness, so identical inputs always produce
//! identical assessments. Rules (keyword sets and weights) are data, not
//! code: the built-in tables ship as `ScoringRules::default()` and the same
//! structure deserializes from a TOML file so weights can be audited and
//! tuned without a rebuild.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::domain_utils;
use crate::errors::{Result, VendorScopeError};
use crate::profile::{DomainProfile, VendorType};

static VENDOR_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:www|shop|store|buy|get)[-_]?").unwrap());
static VENDOR_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_]?(?:shop|store|site|web)$").unwrap());

/// Additive score weights. Negative values lower the score; the final
/// result is clamped to 0..=100.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per strong name keyword found in the domain
    pub strong_keyword: i32,
    /// Per medium name keyword found in the domain
    pub medium_keyword: i32,
    /// Content analysis found vendor keyword phrases
    pub content_keywords: i32,
    /// Content analysis found pricing indicators
    pub pricing: i32,
    /// A crypto-style payment processor is referenced
    pub crypto_payment: i32,
    /// A recognized legitimate processor is referenced
    pub legitimate_payment: i32,
    /// Offshore/bulletproof/anonymous hosting language
    pub offshore_hosting: i32,
    /// Reputable hosting organization
    pub reputable_hosting: i32,
    /// Privacy/anonymous/offshore registrar language
    pub privacy_registrar: i32,
    /// Reputable registrar
    pub reputable_registrar: i32,
    /// Domain contains a known-legitimate substring (applied at most once)
    pub legitimate_substring: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            strong_keyword: 25,
            medium_keyword: 10,
            content_keywords: 20,
            pricing: 15,
            crypto_payment: 20,
            legitimate_payment: -5,
            offshore_hosting: 20,
            reputable_hosting: -5,
            privacy_registrar: 15,
            reputable_registrar: -3,
            legitimate_substring: -30,
        }
    }
}

/// Domain-substring keyword sets that map a domain to a vendor category.
/// Priority when several sets match: deepfake > impersonation >
/// synthetic_identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationKeywords {
    pub synthetic_identity: Vec<String>,
    pub deepfake: Vec<String>,
    pub impersonation: Vec<String>,
}

impl Default for ClassificationKeywords {
    fn default() -> Self {
        Self {
            synthetic_identity: strings(&[
                "identity", "id", "persona", "profile", "fake", "synthetic", "document",
                "passport", "license", "ssn", "credit",
            ]),
            deepfake: strings(&[
                "deepfake",
                "face-swap",
                "voice-clone",
                "impersonate",
                "clone",
                "replica",
                "fake-video",
                "ai-face",
            ]),
            impersonation: strings(&[
                "impersonate",
                "pretend",
                "roleplay",
                "character",
                "profile-pack",
                "identity-kit",
            ]),
        }
    }
}

/// Complete rule set consumed by the scorer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Rules format version, bumped when the shape changes
    pub version: u32,

    pub weights: ScoringWeights,
    pub classification: ClassificationKeywords,

    /// High-confidence vendor name fragments
    pub strong_keywords: Vec<String>,
    /// Weaker, more generic name fragments
    pub medium_keywords: Vec<String>,
    /// Payment processor names counted as crypto-style
    pub crypto_processors: Vec<String>,
    /// Payment processor names counted as legitimate
    pub legitimate_processors: Vec<String>,
    /// Hosting/ISP language suggesting abuse-tolerant infrastructure
    pub offshore_markers: Vec<String>,
    /// Hosting organizations counted as reputable
    pub reputable_hosts: Vec<String>,
    /// Registrar language suggesting anonymity services
    pub privacy_registrar_markers: Vec<String>,
    /// Registrars counted as reputable
    pub reputable_registrars: Vec<String>,
    /// Substrings of well-known legitimate properties; first match dampens
    pub legitimate_substrings: Vec<String>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            version: 1,
            weights: ScoringWeights::default(),
            classification: ClassificationKeywords::default(),
            strong_keywords: strings(&[
                "fakeid",
                "fake-id",
                "fakeidvendor",
                "fakeidshop",
                "fakeidstore",
                "deepfake",
                "deep-fake",
                "deepfakeservice",
                "face-swap",
                "voice-clone",
                "syntheticid",
                "synthetic-id",
                "personakit",
                "persona-kit",
                "identitypack",
                "fakedocs",
                "fake-docs",
                "fakedocuments",
                "fake-documents",
                "kycbypass",
                "kyc-bypass",
                "fakekyc",
                "fake-kyc",
            ]),
            medium_keywords: strings(&[
                "fake", "synthetic", "clone", "impersonate", "persona", "identity", "document",
                "passport", "license", "ssn", "credit",
            ]),
            crypto_processors: strings(&[
                "crypto", "bitcoin", "btc", "eth", "ethereum", "monero", "xmr",
            ]),
            legitimate_processors: strings(&["stripe", "paypal", "square"]),
            offshore_markers: strings(&["offshore", "bulletproof", "anonymous"]),
            reputable_hosts: strings(&["cloudflare", "amazon", "google", "microsoft", "aws"]),
            privacy_registrar_markers: strings(&[
                "privacy",
                "anonymous",
                "offshore",
                "bulletproof",
            ]),
            reputable_registrars: strings(&["godaddy", "namecheap", "google", "cloudflare"]),
            legitimate_substrings: strings(&[
                "reddit.com",
                "youtube.com",
                "twitter.com",
                "facebook.com",
                "instagram.com",
                "linkedin.com",
                "github.com",
                "stackoverflow.com",
                "wikipedia.org",
                "news",
                "blog",
                "article",
                "report",
                "study",
                "research",
                "gov",
                "edu",
                "bloomberg",
                "reuters",
                "cnn",
                "bbc",
                "nytimes",
                "washingtonpost",
                "coinbase",
                "binance",
                "ethereum",
                "bitcoin.org",
            ]),
        }
    }
}

impl ScoringRules {
    /// Load rules from a TOML file; unspecified fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path)
            .map_err(|e| VendorScopeError::io(path_str.clone(), "read", e))?;
        toml::from_str(&content).map_err(|e| {
            VendorScopeError::configuration(format!("scoring rules '{}': {}", path_str, e))
        })
    }
}

/// Outcome of assessing one profile.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub vendor_type: Option<VendorType>,
    pub risk_score: u8,
    pub vendor_name: Option<String>,
}

/// Applies a rule set to enriched profiles. Pure: `assess` has no side
/// effects and never touches the network.
pub struct RiskScorer {
    rules: ScoringRules,
}

impl RiskScorer {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoringRules::default())
    }

    /// Score and classify a profile. The score is additive over the rule
    /// tables and clamped to 0..=100.
    pub fn assess(&self, profile: &DomainProfile) -> RiskAssessment {
        let domain = profile.domain.to_lowercase();
        let weights = &self.rules.weights;
        let mut score: i32 = 0;

        for keyword in &self.rules.strong_keywords {
            if domain.contains(keyword.as_str()) {
                score += weights.strong_keyword;
            }
        }
        for keyword in &self.rules.medium_keywords {
            if domain.contains(keyword.as_str()) {
                score += weights.medium_keyword;
            }
        }

        if !profile.content.suspicious_keywords.is_empty() {
            score += weights.content_keywords;
        }
        if !profile.content.pricing_mentions.is_empty() {
            score += weights.pricing;
        }

        // Each signal pair is exclusive: the risk marker wins over the
        // reputable one when both appear.
        let processors: Vec<String> = profile
            .payment_processors
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        if contains_any_marker(&processors, &self.rules.crypto_processors) {
            score += weights.crypto_payment;
        } else if contains_any_marker(&processors, &self.rules.legitimate_processors) {
            score += weights.legitimate_payment;
        }

        let hosting = format!(
            "{} {}",
            profile.isp.as_deref().unwrap_or(""),
            profile.host_name.as_deref().unwrap_or("")
        )
        .to_lowercase();
        if !hosting.trim().is_empty() {
            if self.rules.offshore_markers.iter().any(|m| hosting.contains(m.as_str())) {
                score += weights.offshore_hosting;
            } else if self.rules.reputable_hosts.iter().any(|m| hosting.contains(m.as_str())) {
                score += weights.reputable_hosting;
            }
        }

        if let Some(registrar) = &profile.registrar {
            let registrar = registrar.to_lowercase();
            if self
                .rules
                .privacy_registrar_markers
                .iter()
                .any(|m| registrar.contains(m.as_str()))
            {
                score += weights.privacy_registrar;
            } else if self
                .rules
                .reputable_registrars
                .iter()
                .any(|m| registrar.contains(m.as_str()))
            {
                score += weights.reputable_registrar;
            }
        }

        // The dampener applies once, on the first matching substring.
        for substring in &self.rules.legitimate_substrings {
            if domain.contains(substring.as_str()) {
                score += weights.legitimate_substring;
                break;
            }
        }

        RiskAssessment {
            vendor_type: self.classify(&domain),
            risk_score: score.clamp(0, 100) as u8,
            vendor_name: self.vendor_name(profile),
        }
    }

    fn classify(&self, domain: &str) -> Option<VendorType> {
        let sets = &self.rules.classification;
        if sets.deepfake.iter().any(|k| domain.contains(k.as_str())) {
            return Some(VendorType::Deepfake);
        }
        if sets.impersonation.iter().any(|k| domain.contains(k.as_str())) {
            return Some(VendorType::Impersonation);
        }
        if sets
            .synthetic_identity
            .iter()
            .any(|k| domain.contains(k.as_str()))
        {
            return Some(VendorType::SyntheticIdentity);
        }
        None
    }

    /// Display name: the registrable label with storefront prefixes and
    /// suffixes stripped, capitalized; registrant organization as fallback.
    fn vendor_name(&self, profile: &DomainProfile) -> Option<String> {
        let label = domain_utils::vendor_label(&profile.domain);
        let stripped = VENDOR_PREFIX_RE.replace(&label, "");
        let stripped = VENDOR_SUFFIX_RE.replace(&stripped, "");
        if stripped.len() > 2 {
            return Some(capitalize(&stripped));
        }
        profile
            .registrant_org
            .as_ref()
            .filter(|org| !org.trim().is_empty())
            .cloned()
    }
}

fn contains_any_marker(values: &[String], markers: &[String]) -> bool {
    values
        .iter()
        .any(|v| markers.iter().any(|m| v.contains(m.as_str())))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
