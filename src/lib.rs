//! VendorScope Library
//!
//! A Rust library for enriching domain names into vendor risk profiles.
//! This library provides functionality to:
//!
//! - Normalize and validate domain names (scheme, `www.`, path and port stripped)
//! - Collect WHOIS registration data, DNS records and IP geolocation
//! - Analyze vendor homepages for CMS, payment methods and suspicious content
//! - Query threat intelligence feeds (crt.sh, URLhaus)
//! - Score vendor risk deterministically and classify vendor types
//! - Cluster profiles that share exact infrastructure fingerprints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vendorscope::cache::ProfileCache;
//! use vendorscope::config::Config;
//! use vendorscope::pipeline::EnrichmentPipeline;
//! use vendorscope::ratelimit::RateLimiter;
//! use vendorscope::sources::SourceOptions;
//!
//! # #[tokio::main]
//! # async fn main() -> vendorscope::Result<()> {
//! let config = Arc::new(Config::default());
//! let cache = Arc::new(ProfileCache::new(config.cache.enabled, config.cache.ttl));
//! let limiter = Arc::new(RateLimiter::new(config.rate_limits.limits.clone()));
//! let pipeline = EnrichmentPipeline::new(config, SourceOptions::default(), cache, limiter)?;
//!
//! let profile = pipeline.enrich("fakeidpro.com").await?;
//! println!("{} scored {}/100", profile.domain, profile.risk_score);
//! # Ok(())
//! # }
//! ```

// Re-export all modules for library use
pub mod cache;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod domain_utils;
pub mod errors;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod ratelimit;
pub mod retry;
pub mod scoring;
pub mod sources;
pub mod structured_output;

// Re-export commonly used types and functions for convenience
pub use cache::{CacheStats, ProfileCache};
pub use clustering::{cluster_profiles, VendorCluster};
pub use config::Config;
pub use errors::{Result, VendorScopeError};
pub use output::OutputFormat;
pub use pipeline::{BatchFailure, BatchOutcome, EnrichmentPipeline, MAX_BATCH_SIZE};
pub use profile::{ContentSignals, DomainProfile, ThreatIntel, VendorType};
pub use ratelimit::{RateLimit, RateLimiter, RateLimitStatus};
pub use scoring::{RiskAssessment, RiskScorer, ScoringRules};
pub use sources::{EnrichmentSource, SourceOptions};
pub use structured_output::VendorScopeReport;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
