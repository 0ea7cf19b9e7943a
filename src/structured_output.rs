//! Structured report model for JSON and YAML serialization.
//!
//! One envelope carries everything a run produced: the enriched profiles,
//! per-domain failures, optional infrastructure clusters and the cache /
//! rate-limit snapshots. The shape is versioned and has a generated JSON
//! schema so downstream consumers can validate before ingesting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::clustering::VendorCluster;
use crate::pipeline::BatchFailure;
use crate::profile::DomainProfile;
use crate::ratelimit::RateLimitStatus;

/// Root structure for all structured vendorscope output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VendorScopeReport {
    /// Tool version and schema metadata
    pub metadata: ReportMetadata,

    /// Enriched domain profiles, in input order
    pub profiles: Vec<DomainProfile>,

    /// Domains that could not be enriched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BatchFailure>,

    /// Infrastructure clusters (cluster mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<Vec<VendorCluster>>,

    /// Cache snapshot (when requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,

    /// Remaining per-source rate-limit quota at the end of the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitStatus>,

    /// Aggregate counts for quick triage
    pub summary: ReportSummary,
}

/// Tool metadata and versioning information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ReportMetadata {
    /// Tool name
    pub tool_name: String,

    /// Tool version
    pub version: String,

    /// When this report was generated
    pub generated_at: DateTime<Utc>,

    /// Schema version for this output format
    pub schema_version: String,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            tool_name: "vendorscope".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            schema_version: "1.0.0".to_string(),
        }
    }
}

/// Aggregate result counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ReportSummary {
    /// Domains submitted (successes plus failures)
    pub domains_requested: usize,

    /// Domains enriched into a full profile
    pub domains_enriched: usize,

    /// Domains that failed validation or timed out
    pub domains_failed: usize,

    /// Profiles with an assigned vendor classification
    pub classified_count: usize,

    /// Highest risk score across the enriched profiles
    pub max_risk_score: u8,
}

impl VendorScopeReport {
    /// Report over a run's profiles and failures; the summary is derived.
    pub fn new(profiles: Vec<DomainProfile>, failures: Vec<BatchFailure>) -> Self {
        let summary = ReportSummary {
            domains_requested: profiles.len() + failures.len(),
            domains_enriched: profiles.len(),
            domains_failed: failures.len(),
            classified_count: profiles.iter().filter(|p| p.vendor_type.is_some()).count(),
            max_risk_score: profiles.iter().map(|p| p.risk_score).max().unwrap_or(0),
        };
        Self {
            metadata: ReportMetadata::default(),
            profiles,
            failures,
            clusters: None,
            cache: None,
            rate_limits: Vec::new(),
            summary,
        }
    }

    /// Generate the JSON schema for this output format.
    pub fn generate_json_schema() -> Result<String> {
        let schema = schemars::schema_for!(VendorScopeReport);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
