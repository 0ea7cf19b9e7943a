use std::sync::Arc;

use anyhow::Context;

use vendorscope::cache::ProfileCache;
use vendorscope::cli::Cli;
use vendorscope::clustering::cluster_profiles;
use vendorscope::config::Config;
use vendorscope::output::{create_formatter, OutputFormat};
use vendorscope::pipeline::{BatchOutcome, EnrichmentPipeline};
use vendorscope::profile::DomainProfile;
use vendorscope::ratelimit::RateLimiter;
use vendorscope::structured_output::VendorScopeReport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::from_args();

    // Handle schema generation early exit
    if cli.generate_schema {
        println!("{}", VendorScopeReport::generate_json_schema()?);
        return Ok(());
    }

    init_tracing(&cli);

    // Configuration precedence: defaults, then file, then environment,
    // then CLI flags.
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    config.merge_with_cli(&cli);
    config.validate()?;

    // Cluster mode reworks an existing profile dump and never touches the
    // network.
    if let Some(path) = &cli.clusters {
        let profiles = load_profile_dump(path)?;
        let clusters = cluster_profiles(&profiles);
        let mut report = VendorScopeReport::new(profiles, Vec::new());
        report.clusters = Some(clusters);
        return emit(&cli, &report);
    }

    let config = Arc::new(config);
    let cache = Arc::new(ProfileCache::new(config.cache.enabled, config.cache.ttl));
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.limits.clone()));
    let pipeline = EnrichmentPipeline::new(
        Arc::clone(&config),
        cli.source_options(),
        Arc::clone(&cache),
        Arc::clone(&limiter),
    )?;

    let mut report = if let Some(path) = &cli.domains_file {
        let domains = read_domains_file(path)?;
        let BatchOutcome { profiles, failures } = pipeline.enrich_batch(&domains).await?;
        VendorScopeReport::new(profiles, failures)
    } else if let Some(domain) = &cli.domain {
        let profile = pipeline.enrich(domain).await?;
        VendorScopeReport::new(vec![profile], Vec::new())
    } else {
        anyhow::bail!("either a domain or --domains-file must be provided");
    };

    if cli.cache_stats {
        report.cache = Some(pipeline.cache_stats());
        report.rate_limits = pipeline.rate_limit_snapshot();
    }

    if report.summary.domains_enriched == 0 && cli.error_enabled() {
        eprintln!("No domains could be enriched.");
    }

    emit(&cli, &report)
}

/// Install the tracing subscriber. The default level follows --verbose;
/// RUST_LOG overrides it when set.
fn init_tracing(cli: &Cli) {
    let level = match cli.verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 | 4 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("vendorscope={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read a domains file: one domain per line, blank lines and '#' comments
/// skipped. Size limits are enforced by the pipeline.
fn read_domains_file(path: &str) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading domains file {path}"))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Load profiles for cluster mode. Accepts either a full report produced by
/// this tool or a bare JSON array of profiles.
fn load_profile_dump(path: &str) -> anyhow::Result<Vec<DomainProfile>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile dump {path}"))?;
    if let Ok(report) = serde_json::from_str::<VendorScopeReport>(&raw) {
        return Ok(report.profiles);
    }
    let profiles = serde_json::from_str::<Vec<DomainProfile>>(&raw)
        .with_context(|| format!("parsing profile dump {path}"))?;
    Ok(profiles)
}

/// Render the report in the requested format on stdout.
fn emit(cli: &Cli, report: &VendorScopeReport) -> anyhow::Result<()> {
    let format = if cli.json {
        OutputFormat::Json { pretty: true }
    } else if cli.yaml {
        OutputFormat::Yaml
    } else {
        OutputFormat::Text
    };
    let formatter = create_formatter(&format);
    let rendered = formatter
        .format_report(report)
        .context("formatting report")?;
    print!("{rendered}");
    Ok(())
}
