//! Fixed-window rate limiting keyed by (client identity, route).

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::error::GatewayError;
use crate::http::pipeline::{RequestContext, Stage, StageOutcome};
use crate::observability::metrics;
use crate::routing::matcher::path_has_prefix;
use crate::security::clock::{Clock, SystemClock};
use crate::security::store::{CounterStore, InMemoryCounterStore, WindowCounter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const DEFAULT_RULE: &str = "default";

/// Limit applying to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub rule: String,
    pub max_requests: u32,
    pub window: Duration,
}

/// Counter state exposed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub rule: String,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the current window ends.
    pub reset_at_secs: u64,
    /// Zero when the request was allowed.
    pub retry_after_secs: u64,
}

impl RateLimitInfo {
    /// `X-RateLimit-*` headers describing this window.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at_secs));
        headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow(RateLimitInfo),
    Reject(RateLimitInfo),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allow(_))
    }

    pub fn info(&self) -> &RateLimitInfo {
        match self {
            RateLimitDecision::Allow(info) | RateLimitDecision::Reject(info) => info,
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    limit: RateLimit,
    path_prefix: String,
    methods: Vec<Method>,
}

impl CompiledRule {
    fn compile(rule: &RateLimitRule, default_window: Duration) -> Self {
        Self {
            limit: RateLimit {
                rule: rule.name.clone(),
                max_requests: rule.max_requests,
                window: rule.window_secs.map(Duration::from_secs).unwrap_or(default_window),
            },
            path_prefix: rule.path_prefix.clone(),
            methods: rule
                .methods
                .iter()
                .filter_map(|m| m.to_uppercase().parse().ok())
                .collect(),
        }
    }

    fn matches(&self, method: Option<&Method>, path: &str) -> bool {
        if !path_has_prefix(path, &self.path_prefix) {
            return false;
        }
        if self.methods.is_empty() {
            return true;
        }
        method.is_some_and(|m| self.methods.contains(m))
    }
}

/// Fixed-window limiter over an injected [`CounterStore`].
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    default_limit: RateLimit,
    rules: Vec<CompiledRule>,
    exempt_paths: Vec<String>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        let window = Duration::from_secs(config.window_secs);
        let mut rules: Vec<CompiledRule> = config
            .rules
            .iter()
            .map(|r| CompiledRule::compile(r, window))
            .collect();
        // Longest prefix first; method-scoped rules before catch-alls.
        rules.sort_by(|a, b| {
            b.path_prefix
                .len()
                .cmp(&a.path_prefix.len())
                .then_with(|| b.methods.len().cmp(&a.methods.len()))
        });

        Self {
            enabled: config.enabled,
            default_limit: RateLimit {
                rule: DEFAULT_RULE.to_string(),
                max_requests: config.max_requests,
                window,
            },
            rules,
            exempt_paths: config.exempt_paths.clone(),
            store,
            clock,
        }
    }

    /// Limiter with a process-local store and the system clock.
    pub fn in_memory(config: &RateLimitConfig) -> Self {
        Self::new(config, Arc::new(InMemoryCounterStore::new()), Arc::new(SystemClock))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| path_has_prefix(path, p))
    }

    /// Resolve the limit for a request; method-scoped rules need `method`.
    pub fn limit_for(&self, method: Option<&Method>, path: &str) -> &RateLimit {
        self.rules
            .iter()
            .find(|r| r.matches(method, path))
            .map(|r| &r.limit)
            .unwrap_or(&self.default_limit)
    }

    /// Count one request for `identity` on `route` under the route's limit.
    pub fn check(&self, identity: &str, route: &str) -> RateLimitDecision {
        self.check_with(identity, route, self.limit_for(None, route))
    }

    /// Count one request, honouring method-scoped rules, exemptions and the
    /// enabled switch. `None` means the request is not rate limited at all.
    pub fn check_request(&self, identity: &str, method: &Method, route: &str) -> Option<RateLimitDecision> {
        if !self.enabled || self.is_exempt(route) {
            return None;
        }
        Some(self.check_with(identity, route, self.limit_for(Some(method), route)))
    }

    /// Count one request against an explicit limit.
    pub fn check_with(&self, identity: &str, route: &str, limit: &RateLimit) -> RateLimitDecision {
        let key = format!("{identity}:{route}");
        let window_millis = limit.window.as_millis() as u64;

        // Compare-and-swap loop: a lost race re-reads the counter, so the
        // check and the increment act as one step per request.
        loop {
            let now = self.clock.now_millis();
            let current = self.store.get(&key);

            let next = match current {
                Some(counter) if !counter.is_expired(now) => {
                    if counter.count >= limit.max_requests {
                        let retry_after = counter.window_reset_at.saturating_sub(now).div_ceil(1000);
                        return RateLimitDecision::Reject(RateLimitInfo {
                            rule: limit.rule.clone(),
                            limit: limit.max_requests,
                            remaining: 0,
                            reset_at_secs: counter.window_reset_at.div_ceil(1000),
                            retry_after_secs: retry_after.max(1),
                        });
                    }
                    counter.incremented()
                }
                _ => WindowCounter::start(now, window_millis),
            };

            if self.store.compare_and_swap(&key, current.as_ref(), next) {
                if next.count == 1 {
                    metrics::record_rate_limit_entries(self.store.len());
                }
                return RateLimitDecision::Allow(RateLimitInfo {
                    rule: limit.rule.clone(),
                    limit: limit.max_requests,
                    remaining: limit.max_requests.saturating_sub(next.count),
                    reset_at_secs: next.window_reset_at.div_ceil(1000),
                    retry_after_secs: 0,
                });
            }
        }
    }
}

/// Pipeline stage running the limiter for every request.
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> StageOutcome {
        match self.limiter.check_request(ctx.identity.as_str(), ctx.method, ctx.path) {
            None => StageOutcome::proceed(),
            Some(RateLimitDecision::Allow(info)) => StageOutcome::Continue(info.headers()),
            Some(RateLimitDecision::Reject(info)) => {
                tracing::warn!(
                    identity = %ctx.identity,
                    route = %ctx.path,
                    rule = %info.rule,
                    retry_after_secs = info.retry_after_secs,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited(&info.rule);
                StageOutcome::Respond(
                    GatewayError::RateLimitExceeded {
                        limit: info.limit,
                        reset_at_secs: info.reset_at_secs,
                        retry_after_secs: info.retry_after_secs,
                    }
                    .into_response(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use std::sync::Barrier;
    use std::thread;

    const START: u64 = 1_700_000_000_000;

    fn config(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            ..Default::default()
        }
    }

    fn limiter(config: &RateLimitConfig) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::new(config, Arc::new(InMemoryCounterStore::new()), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_sixth_request_rejected_then_window_resets() {
        let (limiter, clock) = limiter(&config(5));

        for i in 0..5 {
            let decision = limiter.check("1.2.3.4", "/api/posts");
            assert!(decision.is_allowed(), "request {} should pass", i + 1);
            assert_eq!(decision.info().remaining, 4 - i);
        }

        clock.advance(Duration::from_millis(20_500));
        let rejected = limiter.check("1.2.3.4", "/api/posts");
        assert!(!rejected.is_allowed());
        assert_eq!(rejected.info().remaining, 0);
        // 39.5s left in the window rounds up.
        assert_eq!(rejected.info().retry_after_secs, 40);

        clock.advance(Duration::from_secs(40));
        let fresh = limiter.check("1.2.3.4", "/api/posts");
        assert!(fresh.is_allowed());
        assert_eq!(fresh.info().remaining, 4);
        assert_eq!(fresh.info().reset_at_secs, (START + 60_500 + 60_000).div_ceil(1000));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let (limiter, clock) = limiter(&config(1));
        assert!(limiter.check("a", "/r").is_allowed());
        clock.advance(Duration::from_millis(59_999));
        assert!(!limiter.check("a", "/r").is_allowed());
        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("a", "/r").is_allowed());
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter(&config(1));
        assert!(limiter.check("a", "/api/posts").is_allowed());
        assert!(limiter.check("b", "/api/posts").is_allowed());
        assert!(limiter.check("a", "/api/teams").is_allowed());
        assert!(!limiter.check("a", "/api/posts").is_allowed());
    }

    #[test]
    fn test_rule_resolution() {
        let mut cfg = config(60);
        cfg.rules = vec![
            RateLimitRule {
                name: "api".into(),
                path_prefix: "/api".into(),
                methods: vec![],
                max_requests: 30,
                window_secs: None,
            },
            RateLimitRule {
                name: "admin".into(),
                path_prefix: "/api/admin".into(),
                methods: vec![],
                max_requests: 10,
                window_secs: Some(120),
            },
            RateLimitRule {
                name: "writes".into(),
                path_prefix: "/api".into(),
                methods: vec!["post".into(), "DELETE".into()],
                max_requests: 20,
                window_secs: None,
            },
        ];
        let (limiter, _) = limiter(&cfg);

        assert_eq!(limiter.limit_for(Some(&Method::GET), "/healthz").rule, "default");
        assert_eq!(limiter.limit_for(Some(&Method::GET), "/api/posts").rule, "api");
        assert_eq!(limiter.limit_for(Some(&Method::POST), "/api/posts").rule, "writes");
        assert_eq!(limiter.limit_for(None, "/api/posts").rule, "api");

        let admin = limiter.limit_for(Some(&Method::POST), "/api/admin/users");
        assert_eq!(admin.rule, "admin");
        assert_eq!(admin.window, Duration::from_secs(120));

        // Prefixes match whole segments only.
        assert_eq!(limiter.limit_for(Some(&Method::GET), "/api/administrators").rule, "api");
        assert_eq!(limiter.limit_for(Some(&Method::GET), "/apiary").rule, "default");
    }

    #[test]
    fn test_disabled_and_exempt() {
        let (limiter, _) = limiter(&config(1));
        assert!(limiter.check_request("a", &Method::GET, "/healthz").is_none());
        assert!(limiter.check_request("a", &Method::GET, "/api").is_some());

        // Only the exempt path itself and its sub-paths are exempt.
        let first = limiter.check_request("a", &Method::GET, "/healthzcheck-anything");
        assert!(first.is_some_and(|d| d.is_allowed()));
        let second = limiter.check_request("a", &Method::GET, "/healthzcheck-anything");
        assert!(second.is_some_and(|d| !d.is_allowed()));
        assert!(limiter.check_request("a", &Method::GET, "/healthz/ready").is_none());

        let mut cfg = config(1);
        cfg.enabled = false;
        let (disabled, _) = self::limiter(&cfg);
        assert!(disabled.check_request("a", &Method::GET, "/api").is_none());
    }

    #[test]
    fn test_concurrent_requests_never_exceed_limit() {
        const MAX: u32 = 50;
        const THREADS: usize = 16;
        const PER_THREAD: usize = 20;

        let (limiter, _) = limiter(&config(MAX));
        let limiter = Arc::new(limiter);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .filter(|_| limiter.check("1.2.3.4", "/api/posts").is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, MAX as usize);
    }

    #[test]
    fn test_boundary_race_allows_exactly_one() {
        for _ in 0..50 {
            let (limiter, _) = limiter(&config(2));
            let limiter = Arc::new(limiter);
            assert!(limiter.check("x", "/r").is_allowed());

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let limiter = limiter.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        limiter.check("x", "/r").is_allowed()
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(wins, 1);
        }
    }
}
