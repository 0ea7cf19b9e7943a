//! Public-content analysis of the shared homepage.
//!
//! Scans the page body for vendor keyword phrases, pricing indicators,
//! contact channels and messaging-platform mentions. Everything here reads
//! publicly served markup only; match counts are capped so a keyword-stuffed
//! page cannot bloat the profile.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{EnrichmentContext, EnrichmentSource, HomePage, Signal};
use crate::errors::Result;
use crate::profile::ContentSignals;

/// Vendor phrase sets, grouped by the category they indicate.
const KEYWORD_SETS: &[(&str, &[&str])] = &[
    (
        "synthetic_identity",
        &[
            "synthetic identity",
            "fake id",
            "identity kit",
            "persona pack",
            "fake documents",
            "synthetic id",
            "identity bundle",
        ],
    ),
    (
        "deepfake",
        &[
            "deepfake",
            "face swap",
            "voice clone",
            "ai impersonation",
            "video deepfake",
            "voice deepfake",
            "face swap service",
        ],
    ),
    (
        "impersonation",
        &[
            "impersonation",
            "roleplay",
            "character pack",
            "profile kit",
            "fake profile",
            "synthetic persona",
        ],
    ),
];

const MESSAGING_PLATFORMS: &[&str] = &["telegram", "discord", "whatsapp", "signal", "wickr"];

/// Per-pattern cap on pricing matches.
const MAX_PRICING_MATCHES: usize = 5;
/// Cap on extracted contact e-mail addresses.
const MAX_EMAILS: usize = 3;
/// Per-pattern cap on extracted Telegram handles.
const MAX_TELEGRAM_HANDLES: usize = 3;

static PRICING_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$[\d,]+",
        r"€[\d,]+",
        r"£[\d,]+",
        r"[\d,]+\s*btc",
        r"[\d,]+\s*eth",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static TELEGRAM_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"telegram[:\s]+@?([a-z0-9_]+)", r"t\.me/([a-z0-9_]+)"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

pub struct ContentSource;

impl ContentSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for ContentSource {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_homepage {
            return Ok(vec![]);
        }
        let page = ctx.homepage().await?;
        let signals = analyze_page(&page);
        if signals.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![Signal::Content(signals)])
        }
    }
}

pub(crate) fn analyze_page(page: &HomePage) -> ContentSignals {
    let body = &page.body;
    let mut signals = ContentSignals::default();

    for (_category, phrases) in KEYWORD_SETS {
        for phrase in *phrases {
            if body.contains(phrase) {
                signals.suspicious_keywords.push((*phrase).to_string());
            }
        }
    }

    for re in PRICING_RES.iter() {
        for m in re.find_iter(body).take(MAX_PRICING_MATCHES) {
            signals.pricing_mentions.push(m.as_str().to_string());
        }
    }

    for m in EMAIL_RE.find_iter(body).take(MAX_EMAILS) {
        signals.contact_emails.push(m.as_str().to_string());
    }

    for re in TELEGRAM_RES.iter() {
        for cap in re.captures_iter(body).take(MAX_TELEGRAM_HANDLES) {
            let handle = format!("@{}", &cap[1]);
            if !signals.telegram_handles.contains(&handle) {
                signals.telegram_handles.push(handle);
            }
        }
    }

    for platform in MESSAGING_PLATFORMS {
        if body.contains(platform) {
            signals.messaging_platforms.push((*platform).to_string());
        }
    }

    signals
}
