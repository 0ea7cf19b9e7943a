//! Output formatting for enrichment results.
//!
//! This module renders a [`VendorScopeReport`] as human-readable text,
//! machine-parsable JSON or YAML. Formatters are selected from the CLI
//! flags and share one trait so the binary can stay format-agnostic.

use std::io;

use crate::profile::DomainProfile;
use crate::structured_output::VendorScopeReport;

/// Output format options
#[derive(Debug, Clone)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,

    /// JSON format
    Json {
        /// Pretty-print the JSON
        pretty: bool,
    },

    /// YAML format
    Yaml,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

/// Report formatter trait, dyn-compatible so the binary can hold one boxed
/// formatter regardless of the chosen format.
pub trait ReportFormatter {
    /// Render the report to a string
    fn format_report(&self, report: &VendorScopeReport) -> io::Result<String>;

    /// Get the MIME type for this format
    fn mime_type(&self) -> &'static str;

    /// Get the file extension for this format
    fn file_extension(&self) -> &'static str;
}

/// Text output formatter
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format_report(&self, report: &VendorScopeReport) -> io::Result<String> {
        let mut output = String::new();

        if report.profiles.is_empty() && report.failures.is_empty() {
            output.push_str("No domains processed\n");
            return Ok(output);
        }

        for profile in &report.profiles {
            output.push_str(&format_profile(profile));
            output.push('\n');
        }

        if let Some(clusters) = &report.clusters {
            if clusters.is_empty() {
                output.push_str("No shared-infrastructure clusters found\n\n");
            }
            for (i, cluster) in clusters.iter().enumerate() {
                output.push_str(&format!(
                    "Cluster {}: {} domains / {} vendor type{}\n",
                    i + 1,
                    cluster.domain_count,
                    cluster.vendor_type_count,
                    if cluster.vendor_type_count == 1 { "" } else { "s" }
                ));
                output.push_str(&format!(
                    "  Infrastructure: {}\n",
                    cluster.infrastructure.join(" | ")
                ));
                output.push_str(&format!("  Domains:        {}\n", cluster.domains.join(", ")));
                if !cluster.vendor_types.is_empty() {
                    output.push_str(&format!(
                        "  Vendor types:   {}\n",
                        cluster.vendor_types.join(", ")
                    ));
                }
                output.push('\n');
            }
        }

        if !report.failures.is_empty() {
            output.push_str("Failures:\n");
            for failure in &report.failures {
                output.push_str(&format!("  {}: {}\n", failure.domain, failure.error));
            }
            output.push('\n');
        }

        if let Some(cache) = &report.cache {
            output.push_str(&format!(
                "Cache: {} ({} entries, {} valid, {} expired)\n",
                if cache.enabled { "enabled" } else { "disabled" },
                cache.total_entries,
                cache.valid_entries,
                cache.expired_entries
            ));
        }

        output.push_str(&format!(
            "Enriched {} of {} domain{}",
            report.summary.domains_enriched,
            report.summary.domains_requested,
            if report.summary.domains_requested == 1 { "" } else { "s" }
        ));
        if report.summary.domains_enriched > 0 {
            output.push_str(&format!(
                ", max risk {}/100, {} classified",
                report.summary.max_risk_score, report.summary.classified_count
            ));
        }
        output.push('\n');

        Ok(output)
    }

    fn mime_type(&self) -> &'static str {
        "text/plain"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

/// One profile as an indented text block. Lines for unset fields are
/// dropped so sparse profiles stay short.
fn format_profile(profile: &DomainProfile) -> String {
    let mut block = String::new();
    block.push_str(&format!("Domain: {}\n", profile.domain));

    let mut risk = format!("  Risk:          {}/100", profile.risk_score);
    let mut qualifiers: Vec<String> = Vec::new();
    if let Some(vendor_type) = &profile.vendor_type {
        qualifiers.push(vendor_type.to_string());
    }
    if let Some(name) = &profile.vendor_name {
        qualifiers.push(format!("vendor \"{name}\""));
    }
    if !qualifiers.is_empty() {
        risk.push_str(&format!(" ({})", qualifiers.join(", ")));
    }
    block.push_str(&risk);
    block.push('\n');

    if let Some(registrar) = &profile.registrar {
        block.push_str(&format!("  Registrar:     {registrar}\n"));
    }
    if let Some(created) = &profile.creation_date {
        let mut line = format!("  Created:       {}", created.format("%Y-%m-%d"));
        if let Some(expires) = &profile.expiration_date {
            line.push_str(&format!("   Expires: {}", expires.format("%Y-%m-%d")));
        }
        block.push_str(&line);
        block.push('\n');
    }
    if !profile.name_servers.is_empty() {
        block.push_str(&format!(
            "  Name servers:  {}\n",
            profile.name_servers.join(", ")
        ));
    }
    if let Some(ip) = &profile.ip_address {
        let mut line = format!("  Address:       {ip}");
        let mut hosting: Vec<&str> = Vec::new();
        if let Some(asn) = &profile.asn {
            hosting.push(asn);
        }
        if let Some(host) = &profile.host_name {
            hosting.push(host);
        }
        if let Some(country) = &profile.country {
            hosting.push(country);
        }
        if !hosting.is_empty() {
            line.push_str(&format!(" ({})", hosting.join(", ")));
        }
        block.push_str(&line);
        block.push('\n');
    }
    if let Some(cdn) = &profile.cdn {
        block.push_str(&format!("  CDN:           {cdn}\n"));
    }
    if let Some(cms) = &profile.cms {
        block.push_str(&format!("  CMS:           {cms}\n"));
    }
    if !profile.payment_processors.is_empty() {
        block.push_str(&format!(
            "  Payment:       {}\n",
            profile.payment_processors.join(", ")
        ));
    }
    if !profile.subdomains.is_empty() {
        block.push_str(&format!(
            "  Subdomains:    {} via certificate transparency\n",
            profile.subdomains.len()
        ));
    }
    if let Some(threat) = &profile.threat {
        if threat.is_malicious {
            let mut line = format!(
                "  Threat:        {}",
                threat.threat_type.as_deref().unwrap_or("listed")
            );
            if let Some(first_seen) = &threat.first_seen {
                line.push_str(&format!(" (first seen {first_seen})"));
            }
            block.push_str(&line);
            block.push('\n');
        }
    }
    if !profile.content.suspicious_keywords.is_empty() {
        block.push_str(&format!(
            "  Keywords:      {}\n",
            profile.content.suspicious_keywords.join(", ")
        ));
    }

    block
}

/// JSON output formatter
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_report(&self, report: &VendorScopeReport) -> io::Result<String> {
        let json = if self.pretty {
            report.to_json().map_err(io::Error::other)?
        } else {
            serde_json::to_string(report).map_err(io::Error::other)?
        };
        Ok(format!("{json}\n"))
    }

    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }
}

/// YAML output formatter
pub struct YamlFormatter;

impl ReportFormatter for YamlFormatter {
    fn format_report(&self, report: &VendorScopeReport) -> io::Result<String> {
        report.to_yaml().map_err(io::Error::other)
    }

    fn mime_type(&self) -> &'static str {
        "application/yaml"
    }

    fn file_extension(&self) -> &'static str {
        "yaml"
    }
}

/// Create a formatter based on the output format
pub fn create_formatter(format: &OutputFormat) -> Box<dyn ReportFormatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json { pretty } => Box::new(JsonFormatter::new(*pretty)),
        OutputFormat::Yaml => Box::new(YamlFormatter),
    }
}
