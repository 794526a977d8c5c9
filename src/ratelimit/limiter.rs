//! Keyed rate limiter over fixed-window counters.

use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use axum::http::Method;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::counter::{FixedWindow, WindowSnapshot};
use super::key::RateLimitKey;
use super::policy::QuotaConfig;

/// Outcome of a completed request, as seen at request exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx/3xx response.
    Success,
    /// 4xx/5xx response.
    Failure,
}

impl RequestOutcome {
    pub fn from_status(status: u16) -> Self {
        if status < 400 {
            RequestOutcome::Success
        } else {
            RequestOutcome::Failure
        }
    }
}

/// Requests exempt from rate limiting. Checked before any counter is
/// read or written; exempt requests leave no trace in the limiter.
#[derive(Debug, Clone)]
pub struct BypassRules {
    health_paths: Vec<String>,
    trusted_ips: Vec<IpAddr>,
}

impl BypassRules {
    pub fn new(health_paths: Vec<String>, trusted_ips: Vec<IpAddr>) -> Self {
        Self {
            health_paths,
            trusted_ips,
        }
    }

    /// Whether a request is exempt: health-check paths, CORS preflight,
    /// trusted IPs, and loopback or private-range source addresses.
    /// Addresses are canonicalized first, so a v4-mapped IPv6 address
    /// is judged by its embedded IPv4 range.
    pub fn is_exempt(&self, method: &Method, path: &str, ip: IpAddr) -> bool {
        if *method == Method::OPTIONS {
            return true;
        }
        if self.health_paths.iter().any(|p| p == path) {
            return true;
        }
        let ip = ip.to_canonical();
        if self.trusted_ips.contains(&ip) {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
            IpAddr::V6(v6) => v6.is_loopback() || is_unique_local(&v6),
        }
    }
}

/// fc00::/7, the IPv6 counterpart of the RFC 1918 private ranges.
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}

impl Default for BypassRules {
    fn default() -> Self {
        Self {
            health_paths: vec!["/health".to_string()],
            trusted_ips: Vec::new(),
        }
    }
}

/// The core rate limiter: one fixed-window counter per active key.
///
/// Thread-safe and shared across request tasks. Counters are created
/// lazily on first hit; stale entries are left to the store's own
/// eviction rather than reaped here.
pub struct RateLimiter {
    windows: DashMap<String, Arc<FixedWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Count a request against its key's quota and answer whether it is
    /// allowed, along with remaining/reset/retry-after metadata.
    pub fn check(&self, key: &RateLimitKey, quota: &QuotaConfig) -> WindowSnapshot {
        self.check_at(key, quota, now_ms())
    }

    /// Clock-explicit variant of [`check`](Self::check).
    pub fn check_at(&self, key: &RateLimitKey, quota: &QuotaConfig, now_ms: u64) -> WindowSnapshot {
        let window = self.window_for(key, quota, now_ms);

        trace!(key = %key, "Checking rate limit");
        let snapshot = window.hit(now_ms);

        if !snapshot.allowed {
            debug!(
                key = %key,
                limit = snapshot.limit,
                retry_after_secs = snapshot.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        snapshot
    }

    /// Settle a provisional hit after the request completed. When the
    /// quota says the outcome should not count, the entry increment is
    /// reversed, returning the budget to the window the hit landed in.
    /// `window_started_at_ms` comes from the entry [`WindowSnapshot`];
    /// if that window has rolled over since, the reversal is a no-op.
    pub fn settle(
        &self,
        key: &RateLimitKey,
        quota: &QuotaConfig,
        outcome: RequestOutcome,
        window_started_at_ms: u64,
    ) {
        let skip = match outcome {
            RequestOutcome::Success => quota.skip_successful,
            RequestOutcome::Failure => quota.skip_failed,
        };
        if !skip {
            return;
        }

        if let Some(window) = self.windows.get(&key.to_string_key()) {
            trace!(key = %key, outcome = ?outcome, "Reversing provisional hit");
            window.forgive(window_started_at_ms);
        }
    }

    /// Current count for a key, if a counter exists.
    pub fn current_count(&self, key: &RateLimitKey) -> Option<u64> {
        self.current_count_at(key, now_ms())
    }

    /// Clock-explicit variant of [`current_count`](Self::current_count).
    pub fn current_count_at(&self, key: &RateLimitKey, now_ms: u64) -> Option<u64> {
        self.windows
            .get(&key.to_string_key())
            .map(|w| w.current_count(now_ms))
    }

    /// Number of active counters.
    pub fn counter_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop all counters. Primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }

    fn window_for(&self, key: &RateLimitKey, quota: &QuotaConfig, now_ms: u64) -> Arc<FixedWindow> {
        self.windows
            .entry(key.to_string_key())
            .or_insert_with(|| {
                debug!(
                    key = %key,
                    capacity = quota.capacity,
                    window_ms = quota.window_ms,
                    "Creating new rate limit counter"
                );
                Arc::new(FixedWindow::new(quota.capacity, quota.window_ms, now_ms))
            })
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::policy::Category;

    fn quota(capacity: u64) -> QuotaConfig {
        QuotaConfig {
            capacity,
            window_ms: 60_000,
            skip_successful: false,
            skip_failed: false,
        }
    }

    fn login_quota(capacity: u64) -> QuotaConfig {
        QuotaConfig {
            skip_successful: true,
            ..quota(capacity)
        }
    }

    #[test]
    fn test_five_allowed_sixth_denied() {
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Api, "203.0.113.9");
        let quota = quota(5);

        for i in 0..5 {
            assert!(limiter.check_at(&key, &quota, i).allowed);
        }
        let snap = limiter.check_at(&key, &quota, 6);
        assert!(!snap.allowed);
        assert!(snap.retry_after_secs <= 60);
    }

    #[test]
    fn test_keys_count_independently() {
        let limiter = RateLimiter::new();
        let quota = quota(1);
        let a = RateLimitKey::for_ip(Category::Global, "203.0.113.9");
        let b = RateLimitKey::for_ip(Category::Global, "203.0.113.10");

        assert!(limiter.check_at(&a, &quota, 0).allowed);
        assert!(limiter.check_at(&b, &quota, 0).allowed);
        assert!(!limiter.check_at(&a, &quota, 1).allowed);
        assert_eq!(limiter.counter_count(), 2);
    }

    #[test]
    fn test_window_elapse_allows_again() {
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Global, "203.0.113.9");
        let quota = quota(1);

        assert!(limiter.check_at(&key, &quota, 0).allowed);
        assert!(!limiter.check_at(&key, &quota, 1).allowed);
        assert!(limiter.check_at(&key, &quota, 60_000).allowed);
    }

    #[test]
    fn test_successful_logins_do_not_consume_quota() {
        // Five failed logins, one successful, then a sixth failure:
        // the success is settled back, so the sixth failure still fits.
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Login, "203.0.113.9");
        let quota = login_quota(6);

        for i in 0..5 {
            let snap = limiter.check_at(&key, &quota, i);
            assert!(snap.allowed);
            limiter.settle(&key, &quota, RequestOutcome::Failure, snap.window_started_at_ms);
        }

        let snap = limiter.check_at(&key, &quota, 10);
        assert!(snap.allowed);
        limiter.settle(&key, &quota, RequestOutcome::Success, snap.window_started_at_ms);

        let snap = limiter.check_at(&key, &quota, 11);
        assert!(snap.allowed, "sixth failed attempt should still fit");
        limiter.settle(&key, &quota, RequestOutcome::Failure, snap.window_started_at_ms);

        assert_eq!(limiter.current_count_at(&key, 11), Some(6));
    }

    #[test]
    fn test_settle_without_skip_flags_keeps_count() {
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Api, "203.0.113.9");
        let quota = quota(5);

        let snap = limiter.check_at(&key, &quota, 0);
        limiter.settle(&key, &quota, RequestOutcome::Success, snap.window_started_at_ms);

        assert_eq!(limiter.current_count_at(&key, 0), Some(1));
    }

    #[test]
    fn test_settle_after_rollover_leaves_new_window() {
        // A request admitted near the end of a window may complete
        // after the window rolls over; its reversal must not hand
        // budget to the successor window.
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Login, "203.0.113.9");
        let quota = login_quota(5);

        let early = limiter.check_at(&key, &quota, 0);
        assert!(early.allowed);

        let later = limiter.check_at(&key, &quota, 60_000);
        assert!(later.allowed);
        assert_eq!(limiter.counter_count(), 1);

        limiter.settle(&key, &quota, RequestOutcome::Success, early.window_started_at_ms);
        assert_eq!(limiter.current_count_at(&key, 60_000), Some(1));

        limiter.settle(&key, &quota, RequestOutcome::Success, later.window_started_at_ms);
        assert_eq!(limiter.current_count_at(&key, 60_000), Some(0));
    }

    #[test]
    fn test_clear_counters() {
        let limiter = RateLimiter::new();
        let key = RateLimitKey::for_ip(Category::Global, "203.0.113.9");
        limiter.check_at(&key, &quota(5), 0);
        assert_eq!(limiter.counter_count(), 1);

        limiter.clear();
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_bypass_rules() {
        let rules = BypassRules::new(
            vec!["/health".to_string()],
            vec!["198.51.100.7".parse().unwrap()],
        );

        let public: IpAddr = "203.0.113.9".parse().unwrap();
        let private: IpAddr = "10.1.2.3".parse().unwrap();
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        let trusted: IpAddr = "198.51.100.7".parse().unwrap();

        assert!(rules.is_exempt(&Method::OPTIONS, "/todos", public));
        assert!(rules.is_exempt(&Method::GET, "/health", public));
        assert!(rules.is_exempt(&Method::GET, "/todos", trusted));
        assert!(rules.is_exempt(&Method::GET, "/todos", private));
        assert!(rules.is_exempt(&Method::GET, "/todos", loopback));
        assert!(rules.is_exempt(&Method::GET, "/todos", "::1".parse().unwrap()));

        assert!(!rules.is_exempt(&Method::GET, "/todos", public));
        assert!(!rules.is_exempt(&Method::POST, "/login", public));
    }

    #[test]
    fn test_bypass_rules_ipv6_mirror_ipv4() {
        let rules = BypassRules::new(Vec::new(), Vec::new());

        // v4-mapped loopback and fc00::/7 unique-local get the same
        // treatment as their IPv4 analogues.
        assert!(rules.is_exempt(&Method::GET, "/todos", "::ffff:127.0.0.1".parse().unwrap()));
        assert!(rules.is_exempt(&Method::GET, "/todos", "::ffff:10.1.2.3".parse().unwrap()));
        assert!(rules.is_exempt(&Method::GET, "/todos", "fc00::1".parse().unwrap()));
        assert!(rules.is_exempt(&Method::GET, "/todos", "fd12:3456:789a::1".parse().unwrap()));

        assert!(!rules.is_exempt(&Method::GET, "/todos", "2001:db8::1".parse().unwrap()));
        assert!(!rules.is_exempt(&Method::GET, "/todos", "::ffff:203.0.113.9".parse().unwrap()));
    }
}
