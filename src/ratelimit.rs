//! Per-source sliding-window rate limiting.
//!
//! Public enrichment APIs publish hard request quotas (ip-api.com allows 45
//! per minute unauthenticated, crt.sh and URLhaus tolerate only light use).
//! The limiter tracks request timestamps per source inside a rolling window
//! and admits a request only while the live count is below capacity. Sources
//! without a configured limit are unlimited. The limiter itself never
//! returns errors; callers translate a denied admission into a skip.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Upper bound on a single blocking pause inside `wait_if_needed`.
const MAX_PAUSE: Duration = Duration::from_secs(1);

/// Capacity of one source's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Remaining quota for one source, embedded in structured reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitStatus {
    pub source: String,
    pub max_requests: usize,
    pub window_secs: u64,
    pub remaining: usize,
}

struct SourceWindow {
    limit: RateLimit,
    hits: Mutex<VecDeque<Instant>>,
}

/// Sliding-window limiter shared across concurrent enrichments.
///
/// The limit table is fixed at construction; each source's window sits
/// behind its own mutex so unrelated sources never contend.
pub struct RateLimiter {
    sources: HashMap<String, SourceWindow>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, RateLimit>) -> Self {
        let sources = limits
            .into_iter()
            .map(|(name, limit)| {
                (
                    name,
                    SourceWindow {
                        limit,
                        hits: Mutex::new(VecDeque::new()),
                    },
                )
            })
            .collect();
        Self { sources }
    }

    /// Whether a request to `source` is currently admissible. Prunes
    /// timestamps that have aged out of the window first. Unconfigured
    /// sources are always admissible.
    pub fn can_make_request(&self, source: &str) -> bool {
        match self.sources.get(source) {
            None => true,
            Some(window) => {
                let mut hits = lock_hits(&window.hits);
                prune(&mut hits, window.limit.window);
                hits.len() < window.limit.max_requests
            }
        }
    }

    /// Record that a request to `source` was actually issued. No-op for
    /// unconfigured sources.
    pub fn record_request(&self, source: &str) {
        if let Some(window) = self.sources.get(source) {
            let mut hits = lock_hits(&window.hits);
            prune(&mut hits, window.limit.window);
            hits.push_back(Instant::now());
        }
    }

    /// Requests left in the current window, or None for unlimited sources.
    pub fn get_remaining(&self, source: &str) -> Option<usize> {
        self.sources.get(source).map(|window| {
            let mut hits = lock_hits(&window.hits);
            prune(&mut hits, window.limit.window);
            window.limit.max_requests.saturating_sub(hits.len())
        })
    }

    /// Admit a request, pausing briefly (at most min(`max_wait`, 1s)) when
    /// the window is full, then re-checking once. Returns whether the caller
    /// may proceed; never blocks indefinitely.
    pub async fn wait_if_needed(&self, source: &str, max_wait: Duration) -> bool {
        if self.can_make_request(source) {
            return true;
        }
        let pause = max_wait.min(MAX_PAUSE);
        if pause.is_zero() {
            return false;
        }
        debug!(
            source,
            pause_ms = pause.as_millis() as u64,
            "rate limit window full, pausing"
        );
        sleep(pause).await;
        self.can_make_request(source)
    }

    /// Remaining quota per configured source, sorted by source name.
    pub fn snapshot(&self) -> Vec<RateLimitStatus> {
        let mut statuses: Vec<RateLimitStatus> = self
            .sources
            .iter()
            .map(|(name, window)| {
                let mut hits = lock_hits(&window.hits);
                prune(&mut hits, window.limit.window);
                RateLimitStatus {
                    source: name.clone(),
                    max_requests: window.limit.max_requests,
                    window_secs: window.limit.window.as_secs(),
                    remaining: window.limit.max_requests.saturating_sub(hits.len()),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.source.cmp(&b.source));
        statuses
    }
}

fn prune(hits: &mut VecDeque<Instant>, window: Duration) {
    let now = Instant::now();
    while let Some(front) = hits.front() {
        if now.duration_since(*front) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

fn lock_hits(hits: &Mutex<VecDeque<Instant>>) -> MutexGuard<'_, VecDeque<Instant>> {
    hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(source: &str, max: usize, window: Duration) -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(source.to_string(), RateLimit::new(max, window));
        RateLimiter::new(limits)
    }

    #[test]
    fn unconfigured_source_is_unlimited() {
        let limiter = RateLimiter::new(HashMap::new());
        for _ in 0..1000 {
            assert!(limiter.can_make_request("anything"));
            limiter.record_request("anything");
        }
        assert_eq!(limiter.get_remaining("anything"), None);
    }

    #[test]
    fn capacity_is_enforced() {
        let limiter = limiter_with("api", 3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.can_make_request("api"));
            limiter.record_request("api");
        }
        assert!(!limiter.can_make_request("api"));
        assert_eq!(limiter.get_remaining("api"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_capacity_over_time() {
        let limiter = limiter_with("api", 2, Duration::from_millis(100));
        limiter.record_request("api");
        limiter.record_request("api");
        assert!(!limiter.can_make_request("api"));

        sleep(Duration::from_millis(150)).await;
        assert!(limiter.can_make_request("api"));
        assert_eq!(limiter.get_remaining("api"), Some(2));
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_open() {
        let limiter = limiter_with("api", 1, Duration::from_secs(60));
        assert!(limiter.wait_if_needed("api", Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_recovers_after_short_window() {
        let limiter = limiter_with("api", 1, Duration::from_millis(50));
        limiter.record_request("api");
        assert!(!limiter.can_make_request("api"));
        // Pause (capped at min(max_wait, 1s)) outlasts the window.
        assert!(limiter.wait_if_needed("api", Duration::from_millis(200)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_when_window_stays_full() {
        let limiter = limiter_with("api", 1, Duration::from_secs(3600));
        limiter.record_request("api");
        assert!(!limiter.wait_if_needed("api", Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rolling_window_never_exceeds_capacity() {
        let window = Duration::from_millis(100);
        let limiter = limiter_with("api", 5, window);
        let mut admitted: Vec<Instant> = Vec::new();

        for _ in 0..50 {
            if limiter.can_make_request("api") {
                limiter.record_request("api");
                admitted.push(Instant::now());
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert!(admitted.len() > 5, "limiter should admit across windows");
        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_window <= 5, "window starting at admission {i} holds {in_window}");
        }
    }

    #[test]
    fn snapshot_is_sorted_and_counts_remaining() {
        let mut limits = HashMap::new();
        limits.insert("zeta".to_string(), RateLimit::new(10, Duration::from_secs(60)));
        limits.insert("alpha".to_string(), RateLimit::new(2, Duration::from_secs(60)));
        let limiter = RateLimiter::new(limits);
        limiter.record_request("alpha");

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].source, "alpha");
        assert_eq!(snapshot[0].remaining, 1);
        assert_eq!(snapshot[1].source, "zeta");
        assert_eq!(snapshot[1].remaining, 10);
    }
}
