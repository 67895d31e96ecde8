//! Multi-scope admission control.
//!
//! Fixed-window budgets at four granularities (global, tenant, agent,
//! source address); an admission check consults every applicable scope and
//! returns the most restrictive decision. Denials are logged to a bounded
//! FIFO violation history, and a background sweeper evicts buckets whose
//! window has passed with a clean record. Under reported load pressure the
//! per-tenant budgets scale down adaptively.
//!
//! Admission runs before any embedding or index call, so a denied request
//! has no side effect downstream: one tenant cannot starve another by
//! volume alone.

mod types;

#[cfg(test)]
mod tests;

pub use types::{Decision, LimitAction, RateRule, RateScope, Violation};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::MAX_VIOLATION_LOG;

/// Default rules per scope kind; explicit per-scope rules override these.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Process-wide budget.
    pub global: Option<RateRule>,
    /// Budget applied to every tenant without an explicit rule.
    pub tenant_default: Option<RateRule>,
    /// Budget applied to every agent without an explicit rule.
    pub agent_default: Option<RateRule>,
    /// Budget applied to every source address without an explicit rule.
    pub source_default: Option<RateRule>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global: Some(RateRule::throttle(10_000, Duration::from_secs(60))),
            tenant_default: Some(RateRule::throttle(1_000, Duration::from_secs(60))),
            agent_default: Some(RateRule::throttle(500, Duration::from_secs(60))),
            source_default: Some(RateRule::block(2_000, Duration::from_secs(60))),
        }
    }
}

impl RateLimiterConfig {
    /// A configuration with no budgets at all (admission always passes).
    pub fn unlimited() -> Self {
        Self {
            global: None,
            tenant_default: None,
            agent_default: None,
            source_default: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl Bucket {
    fn fresh(window: Duration) -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
            window,
        }
    }

    /// Rolls the window forward if it has elapsed.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn remaining_window(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.duration_since(self.window_start))
    }
}

/// Multi-scope fixed-window rate limiter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    rules: Mutex<HashMap<String, RateRule>>,
    buckets: Mutex<HashMap<String, Bucket>>,
    violations: Mutex<VecDeque<Violation>>,
    tenant_factor: Mutex<f64>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.buckets.lock().len())
            .field("tenant_factor", &*self.tenant_factor.lock())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter with the given defaults.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            rules: Mutex::new(HashMap::new()),
            buckets: Mutex::new(HashMap::new()),
            violations: Mutex::new(VecDeque::new()),
            tenant_factor: Mutex::new(1.0),
        }
    }

    /// Installs an explicit rule for one scope.
    pub fn set_rule(&self, scope: RateScope, rule: RateRule) {
        self.rules.lock().insert(scope.key(), rule);
    }

    /// Removes an explicit rule; the kind default applies again.
    pub fn remove_rule(&self, scope: &RateScope) {
        self.rules.lock().remove(&scope.key());
    }

    /// Scales per-tenant budgets from host load signals.
    ///
    /// Load above 0.8 (or p50 latency past a second) scales tenant budgets
    /// by 0.7; load between 0.6 and 0.8 by 0.85; anything calmer restores
    /// full budgets.
    pub fn update_adaptive(&self, load: f64, p50_response_time_ms: f64) {
        let factor = if load > 0.8 || p50_response_time_ms > 1_000.0 {
            0.7
        } else if load > 0.6 || p50_response_time_ms > 500.0 {
            0.85
        } else {
            1.0
        };
        let mut current = self.tenant_factor.lock();
        if (*current - factor).abs() > f64::EPSILON {
            debug!(load, p50_response_time_ms, factor, "Adaptive rate factor changed");
            *current = factor;
        }
    }

    /// The current adaptive scaling factor for tenant budgets.
    pub fn tenant_factor(&self) -> f64 {
        *self.tenant_factor.lock()
    }

    /// Checks admission across every applicable scope without committing.
    pub fn check(&self, tenant: &str, agent: Option<&str>, source: Option<&str>) -> Decision {
        let now = Instant::now();
        let scopes = self.applicable_scopes(tenant, agent, source);

        let mut verdict: Option<Decision> = None;
        for (scope, rule) in scopes {
            let limit = self.effective_limit(&scope, &rule);
            let key = scope.key();

            let mut buckets = self.buckets.lock();
            let bucket = buckets
                .entry(key.clone())
                .or_insert_with(|| Bucket::fresh(rule.window));
            bucket.roll(now);

            let remaining = limit.saturating_sub(bucket.count);
            let over = bucket.count >= limit && rule.action != LimitAction::Allow;
            let reset_at = Utc::now()
                + chrono::Duration::from_std(bucket.remaining_window(now))
                    .unwrap_or_else(|_| chrono::Duration::zero());
            drop(buckets);

            let decision = Decision {
                allowed: !over,
                action: rule.action,
                reset_at,
                remaining,
                limit,
                limit_type: scope.kind(),
            };

            if over {
                self.record_violation(&key);
                warn!(scope = %key, limit, "Rate limit exceeded");
            }

            verdict = Some(match verdict.take() {
                None => decision,
                Some(best) => most_restrictive(best, decision),
            });
        }

        verdict.unwrap_or(Decision {
            allowed: true,
            action: LimitAction::Allow,
            reset_at: Utc::now(),
            remaining: u32::MAX,
            limit: u32::MAX,
            limit_type: "none",
        })
    }

    /// Commits an admitted request: increments every applicable bucket.
    pub fn commit(&self, tenant: &str, agent: Option<&str>, source: Option<&str>) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        for (scope, rule) in self.applicable_scopes(tenant, agent, source) {
            let bucket = buckets
                .entry(scope.key())
                .or_insert_with(|| Bucket::fresh(rule.window));
            bucket.roll(now);
            bucket.count = bucket.count.saturating_add(1);
        }
    }

    /// Recorded denials, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().iter().cloned().collect()
    }

    /// Evicts buckets whose window has fully passed and whose scope has no
    /// recorded violations.
    pub fn sweep(&self) {
        let now = Instant::now();
        let violations = self.violations.lock();
        let dirty: std::collections::HashSet<&str> =
            violations.iter().map(|v| v.scope.as_str()).collect();

        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|key, bucket| {
            now.duration_since(bucket.window_start) < bucket.window || dirty.contains(key.as_str())
        });
        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!(evicted, "Swept expired rate-limit buckets");
        }
    }

    /// Starts a periodic sweep task.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }

    fn applicable_scopes(
        &self,
        tenant: &str,
        agent: Option<&str>,
        source: Option<&str>,
    ) -> Vec<(RateScope, RateRule)> {
        let rules = self.rules.lock();
        let mut scopes = Vec::with_capacity(4);

        let mut push = |scope: RateScope, default: Option<RateRule>| {
            let rule = rules.get(&scope.key()).copied().or(default);
            if let Some(rule) = rule {
                scopes.push((scope, rule));
            }
        };

        push(RateScope::Global, self.config.global);
        push(
            RateScope::Tenant(tenant.to_string()),
            self.config.tenant_default,
        );
        if let Some(agent) = agent {
            push(
                RateScope::Agent {
                    tenant: tenant.to_string(),
                    agent: agent.to_string(),
                },
                self.config.agent_default,
            );
        }
        if let Some(source) = source {
            push(
                RateScope::Source(source.to_string()),
                self.config.source_default,
            );
        }
        scopes
    }

    fn effective_limit(&self, scope: &RateScope, rule: &RateRule) -> u32 {
        match scope {
            RateScope::Tenant(_) | RateScope::Agent { .. } if rule.max_requests > 0 => {
                let factor = *self.tenant_factor.lock();
                // Scaling never drives a positive budget all the way to zero.
                ((rule.max_requests as f64 * factor) as u32).max(1)
            }
            _ => rule.max_requests,
        }
    }

    fn record_violation(&self, scope: &str) {
        let mut violations = self.violations.lock();
        violations.push_back(Violation {
            scope: scope.to_string(),
            at: Utc::now(),
        });
        while violations.len() > MAX_VIOLATION_LOG {
            violations.pop_front();
        }
    }
}

fn most_restrictive(a: Decision, b: Decision) -> Decision {
    match (a.allowed, b.allowed) {
        (true, false) => b,
        (false, true) => a,
        (false, false) => {
            // Both deny: prefer the harsher action, then the later reset.
            if (b.action.severity(), b.reset_at) > (a.action.severity(), a.reset_at) {
                b
            } else {
                a
            }
        }
        (true, true) => {
            if b.remaining < a.remaining {
                b
            } else {
                a
            }
        }
    }
}
