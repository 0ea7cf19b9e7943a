//! TTL memoization for enrichment results.
//!
//! Enrichment is expensive (WHOIS round trips, several HTTP APIs, a homepage
//! fetch), so completed profiles are held in memory and replayed for repeat
//! queries within the TTL. Keys are digests of `entity_type:value` so the
//! same cache can later hold other entity kinds without collisions. Expired
//! entries are evicted lazily on read; there is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::profile::DomainProfile;

/// Entity namespace used for domain profiles.
pub const DOMAIN_ENTITY: &str = "domain";

struct CacheEntry {
    profile: DomainProfile,
    expires_at: Instant,
}

/// Point-in-time cache statistics, embedded in structured reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct CacheStats {
    pub enabled: bool,
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// In-memory TTL cache for enriched profiles.
///
/// Constructed once and shared by reference; interior mutability keeps the
/// public methods `&self` so concurrent enrichments can use one instance.
pub struct ProfileCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ProfileCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stable cache key: SHA-256 over the lowercased, trimmed composite.
    pub fn cache_key(entity_type: &str, value: &str) -> String {
        let composite = format!("{}:{}", entity_type, value.trim().to_lowercase());
        let digest = Sha256::digest(composite.as_bytes());
        format!("{digest:x}")
    }

    /// Look up a cached profile. Expired entries are deleted and reported as
    /// a miss. Always a miss when the cache is disabled.
    pub fn get(&self, entity_type: &str, value: &str) -> Option<DomainProfile> {
        if !self.enabled {
            return None;
        }
        let key = Self::cache_key(entity_type, value);
        let mut entries = self.lock_entries();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.profile.clone()),
            Some(_) => {
                entries.remove(&key);
                debug!(entity_type, value, "evicted expired cache entry");
                None
            }
            None => None,
        }
    }

    /// Store a profile with the configured TTL. No-op when disabled.
    pub fn set(&self, entity_type: &str, value: &str, profile: DomainProfile) {
        if !self.enabled {
            return;
        }
        let key = Self::cache_key(entity_type, value);
        let entry = CacheEntry {
            profile,
            expires_at: Instant::now() + self.ttl,
        };
        self.lock_entries().insert(key, entry);
    }

    /// Drop all entries, valid and expired alike.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock_entries();
        let total_entries = entries.len();
        let valid_entries = entries.values().filter(|e| e.expires_at > now).count();
        CacheStats {
            enabled: self.enabled,
            total_entries,
            valid_entries,
            expired_entries: total_entries - valid_entries,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the map itself is still usable.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(domain: &str) -> DomainProfile {
        DomainProfile::new(domain)
    }

    #[test]
    fn get_after_set_returns_profile() {
        let cache = ProfileCache::new(true, Duration::from_secs(60));
        cache.set(DOMAIN_ENTITY, "example.com", profile("example.com"));
        let hit = cache.get(DOMAIN_ENTITY, "example.com").unwrap();
        assert_eq!(hit.domain, "example.com");
    }

    #[test]
    fn key_normalizes_value() {
        assert_eq!(
            ProfileCache::cache_key("domain", "  Example.COM "),
            ProfileCache::cache_key("domain", "example.com")
        );
        assert_ne!(
            ProfileCache::cache_key("domain", "example.com"),
            ProfileCache::cache_key("ip", "example.com")
        );
        // SHA-256 hex digest length.
        assert_eq!(ProfileCache::cache_key("domain", "example.com").len(), 64);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = ProfileCache::new(true, Duration::ZERO);
        cache.set(DOMAIN_ENTITY, "example.com", profile("example.com"));
        assert_eq!(cache.stats().total_entries, 1);
        assert_eq!(cache.stats().expired_entries, 1);

        assert!(cache.get(DOMAIN_ENTITY, "example.com").is_none());
        // The read removed the stale entry.
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = ProfileCache::new(false, Duration::from_secs(60));
        cache.set(DOMAIN_ENTITY, "example.com", profile("example.com"));
        assert!(cache.get(DOMAIN_ENTITY, "example.com").is_none());
        let stats = cache.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn clear_removes_everything() {
        let cache = ProfileCache::new(true, Duration::from_secs(60));
        cache.set(DOMAIN_ENTITY, "a.com", profile("a.com"));
        cache.set(DOMAIN_ENTITY, "b.com", profile("b.com"));
        assert_eq!(cache.stats().total_entries, 2);
        cache.clear();
        assert_eq!(cache.stats().total_entries, 0);
        assert!(cache.get(DOMAIN_ENTITY, "a.com").is_none());
    }

    #[test]
    fn stats_counts_valid_entries() {
        let cache = ProfileCache::new(true, Duration::from_secs(60));
        cache.set(DOMAIN_ENTITY, "a.com", profile("a.com"));
        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 0);
    }
}
