//! Infrastructure clustering over enriched profiles.
//!
//! Profiles that share an identical infrastructure fingerprint (hosting
//! provider, CDN, registrar, payment processors) are grouped into a
//! `VendorCluster`. Matching is exact: two domains land in the same cluster
//! only when every fingerprint component agrees, so a cluster is strong
//! evidence of shared operation rather than a fuzzy similarity guess.

use std::collections::{BTreeSet, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::profile::DomainProfile;

/// A group of two or more domains on identical infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VendorCluster {
    /// The shared fingerprint string the cluster keys on
    pub signature: String,
    /// Member domains, sorted lexicographically
    pub domains: Vec<String>,
    /// Number of member domains
    pub domain_count: usize,
    /// Fingerprint components, one per infrastructure dimension
    pub infrastructure: Vec<String>,
    /// Distinct vendor classifications present in the cluster, sorted
    pub vendor_types: Vec<String>,
    /// Number of distinct vendor classifications
    pub vendor_type_count: usize,
}

/// Group profiles by exact infrastructure fingerprint.
///
/// Profiles whose fingerprint is empty (no infrastructure attributes were
/// resolved) are skipped entirely, and a fingerprint shared by fewer than
/// two distinct domains does not form a cluster. Clusters come back ordered
/// by size descending, then by vendor-type diversity descending, then by
/// signature ascending so runs over the same input always agree.
pub fn cluster_profiles(profiles: &[DomainProfile]) -> Vec<VendorCluster> {
    let mut groups: HashMap<String, Vec<&DomainProfile>> = HashMap::new();
    for profile in profiles {
        let fingerprint = profile.infrastructure_fingerprint();
        if fingerprint.is_empty() {
            continue;
        }
        groups.entry(fingerprint).or_default().push(profile);
    }

    let mut clusters: Vec<VendorCluster> = groups
        .into_iter()
        .filter_map(|(signature, members)| build_cluster(signature, &members))
        .collect();

    clusters.sort_by(|a, b| {
        b.domain_count
            .cmp(&a.domain_count)
            .then_with(|| b.vendor_type_count.cmp(&a.vendor_type_count))
            .then_with(|| a.signature.cmp(&b.signature))
    });
    clusters
}

fn build_cluster(signature: String, members: &[&DomainProfile]) -> Option<VendorCluster> {
    let domains: BTreeSet<String> = members.iter().map(|p| p.domain.clone()).collect();
    if domains.len() < 2 {
        return None;
    }

    let vendor_types: BTreeSet<String> = members
        .iter()
        .filter_map(|p| p.vendor_type.as_ref())
        .map(|vt| vt.to_string())
        .collect();

    let infrastructure: Vec<String> = signature.split('|').map(str::to_string).collect();
    let domains: Vec<String> = domains.into_iter().collect();
    let vendor_types: Vec<String> = vendor_types.into_iter().collect();

    Some(VendorCluster {
        domain_count: domains.len(),
        vendor_type_count: vendor_types.len(),
        signature,
        domains,
        infrastructure,
        vendor_types,
    })
}
