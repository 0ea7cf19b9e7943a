use clap::Parser;

use crate::sources::SourceOptions;

/// Command-line interface definition.
/// Provides command-line options for domain vendor enrichment.
///
/// Verbosity levels:
/// 0 - silent (only final output)
/// 1 - errors (default)
/// 2 - warnings + errors
/// 5 - trace/debug
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Enrich domain names with WHOIS, DNS, geolocation, homepage and threat intel data"
)]
pub struct Cli {
    /// Domain to enrich (e.g. fakeidpro.com). Required unless --domains-file,
    /// --clusters or --generate-schema is provided.
    #[arg(
        required_unless_present_any = ["domains_file", "clusters", "generate_schema"],
        conflicts_with_all = ["domains_file", "clusters"]
    )]
    pub domain: Option<String>,

    /// Path to a file with one domain per line (at most 100 domains)
    #[arg(long = "domains-file", value_name = "FILE")]
    pub domains_file: Option<String>,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Emit the report as YAML instead of text
    #[arg(long, conflicts_with = "json")]
    pub yaml: bool,

    /// Cluster previously enriched profiles from a JSON report or profile dump
    #[arg(long, value_name = "FILE")]
    pub clusters: Option<String>,

    /// Include cache statistics in the report
    #[arg(long = "cache-stats")]
    pub cache_stats: bool,

    /// Disable the WHOIS source
    #[arg(long = "no-whois", default_value_t = false)]
    pub no_whois: bool,

    /// Disable the DNS source
    #[arg(long = "no-dns", default_value_t = false)]
    pub no_dns: bool,

    /// Disable IP geolocation lookups
    #[arg(long = "no-geoip", default_value_t = false)]
    pub no_geoip: bool,

    /// Disable homepage fetching (also disables CMS, payment and content analysis)
    #[arg(long = "no-homepage", default_value_t = false)]
    pub no_homepage: bool,

    /// Disable threat intelligence lookups (crt.sh, URLhaus)
    #[arg(long = "no-threat-intel", default_value_t = false)]
    pub no_threat_intel: bool,

    /// Disable the profile cache for this run
    #[arg(long = "no-cache", default_value_t = false)]
    pub no_cache: bool,

    /// Override the cache TTL in hours
    #[arg(long = "cache-ttl-hours", value_name = "HOURS")]
    pub cache_ttl_hours: Option<u64>,

    /// Maximum number of domains enriched concurrently in batch mode
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Path to a TOML scoring rules file
    #[arg(long = "scoring-rules", value_name = "FILE")]
    pub scoring_rules: Option<String>,

    /// Print the JSON Schema for the report format and exit
    #[arg(long = "generate-schema")]
    pub generate_schema: bool,

    /// Verbosity level (0,1,2,5)
    #[arg(long, default_value_t = 1)]
    pub verbose: u8,
}

impl Cli {
    /// Parse CLI arguments from process args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Convenience: are we in very verbose/debug mode?
    pub fn is_trace(&self) -> bool {
        self.verbose >= 5
    }

    /// Are warning-level messages enabled?
    pub fn warn_enabled(&self) -> bool {
        self.verbose >= 2
    }

    /// Are error-level messages enabled?
    pub fn error_enabled(&self) -> bool {
        self.verbose >= 1
    }

    /// Source toggles derived from the --no-* flags.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            enable_whois: !self.no_whois,
            enable_dns: !self.no_dns,
            enable_geoip: !self.no_geoip,
            enable_homepage: !self.no_homepage,
            enable_threat_intel: !self.no_threat_intel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_domain_parses() {
        let cli = Cli::parse_from(["vendorscope", "example.com"]);
        assert_eq!(cli.domain.as_deref(), Some("example.com"));
        assert_eq!(cli.verbose, 1);
        assert!(!cli.json);
    }

    #[test]
    fn domain_is_required_without_an_alternative_mode() {
        assert!(Cli::try_parse_from(["vendorscope"]).is_err());
        assert!(Cli::try_parse_from(["vendorscope", "--domains-file", "d.txt"]).is_ok());
        assert!(Cli::try_parse_from(["vendorscope", "--clusters", "report.json"]).is_ok());
        assert!(Cli::try_parse_from(["vendorscope", "--generate-schema"]).is_ok());
    }

    #[test]
    fn domain_conflicts_with_batch_and_cluster_modes() {
        assert!(
            Cli::try_parse_from(["vendorscope", "example.com", "--domains-file", "d.txt"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["vendorscope", "example.com", "--clusters", "r.json"]).is_err()
        );
    }

    #[test]
    fn json_and_yaml_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["vendorscope", "example.com", "--json", "--yaml"]).is_err());
    }

    #[test]
    fn source_flags_map_to_options() {
        let cli = Cli::parse_from([
            "vendorscope",
            "example.com",
            "--no-geoip",
            "--no-threat-intel",
        ]);
        let opts = cli.source_options();
        assert!(opts.enable_whois);
        assert!(opts.enable_dns);
        assert!(!opts.enable_geoip);
        assert!(opts.enable_homepage);
        assert!(!opts.enable_threat_intel);
    }

    #[test]
    fn verbosity_helpers_follow_the_levels() {
        let quiet = Cli::parse_from(["vendorscope", "example.com", "--verbose", "0"]);
        assert!(!quiet.error_enabled());
        let default = Cli::parse_from(["vendorscope", "example.com"]);
        assert!(default.error_enabled());
        assert!(!default.warn_enabled());
        let trace = Cli::parse_from(["vendorscope", "example.com", "--verbose", "5"]);
        assert!(trace.is_trace());
        assert!(trace.warn_enabled());
    }
}
