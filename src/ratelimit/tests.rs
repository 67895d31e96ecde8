use std::time::Duration;

use super::*;

fn limiter_with_tenant_rule(max: u32, window_ms: u64) -> RateLimiter {
    let limiter = RateLimiter::new(RateLimiterConfig::unlimited());
    limiter.set_rule(
        RateScope::Tenant("t1".to_string()),
        RateRule::throttle(max, Duration::from_millis(window_ms)),
    );
    limiter
}

#[test]
fn test_allows_within_budget() {
    let limiter = limiter_with_tenant_rule(2, 1_000);

    let first = limiter.check("t1", None, None);
    assert!(first.allowed);
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, 2);
    limiter.commit("t1", None, None);

    let second = limiter.check("t1", None, None);
    assert!(second.allowed);
    assert_eq!(second.remaining, 1);
    limiter.commit("t1", None, None);
}

#[test]
fn test_denies_over_budget_with_reset_hint() {
    let limiter = limiter_with_tenant_rule(2, 1_000);
    let before = chrono::Utc::now();

    limiter.commit("t1", None, None);
    limiter.commit("t1", None, None);

    let decision = limiter.check("t1", None, None);
    assert!(!decision.allowed);
    assert_eq!(decision.action, LimitAction::Throttle);
    assert_eq!(decision.remaining, 0);
    assert_eq!(decision.limit_type, "tenant");

    // reset_at lands within the window from the first commit.
    let until_reset = decision.reset_at - before;
    assert!(until_reset <= chrono::Duration::milliseconds(1_050));
    assert!(until_reset >= chrono::Duration::zero());
}

#[test]
fn test_window_rollover_readmits() {
    let limiter = limiter_with_tenant_rule(1, 50);

    limiter.commit("t1", None, None);
    assert!(!limiter.check("t1", None, None).allowed);

    std::thread::sleep(Duration::from_millis(60));
    assert!(limiter.check("t1", None, None).allowed);
}

#[test]
fn test_scopes_are_independent() {
    let limiter = limiter_with_tenant_rule(1, 1_000);
    limiter.commit("t1", None, None);

    assert!(!limiter.check("t1", None, None).allowed);
    // t2 has no rule at all in this configuration.
    assert!(limiter.check("t2", None, None).allowed);
}

#[test]
fn test_most_restrictive_scope_wins() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        global: Some(RateRule::throttle(100, Duration::from_secs(60))),
        tenant_default: Some(RateRule::throttle(1, Duration::from_secs(60))),
        agent_default: None,
        source_default: None,
    });

    limiter.commit("t1", None, None);
    let decision = limiter.check("t1", None, None);
    assert!(!decision.allowed);
    assert_eq!(decision.limit_type, "tenant");
}

#[test]
fn test_agent_scope_checked_when_present() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        global: None,
        tenant_default: None,
        agent_default: Some(RateRule::throttle(1, Duration::from_secs(60))),
        source_default: None,
    });

    limiter.commit("t1", Some("a1"), None);
    assert!(!limiter.check("t1", Some("a1"), None).allowed);
    // Same tenant, different agent: separate bucket.
    assert!(limiter.check("t1", Some("a2"), None).allowed);
    // No agent supplied: the agent scope does not apply.
    assert!(limiter.check("t1", None, None).allowed);
}

#[test]
fn test_source_block_action() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        global: None,
        tenant_default: None,
        agent_default: None,
        source_default: Some(RateRule::block(1, Duration::from_secs(60))),
    });

    limiter.commit("t1", None, Some("10.0.0.9"));
    let decision = limiter.check("t1", None, Some("10.0.0.9"));
    assert!(!decision.allowed);
    assert_eq!(decision.action, LimitAction::Block);
    assert_eq!(decision.limit_type, "source");
}

#[test]
fn test_allow_action_never_denies() {
    let limiter = RateLimiter::new(RateLimiterConfig::unlimited());
    limiter.set_rule(
        RateScope::Tenant("t1".to_string()),
        RateRule {
            max_requests: 1,
            window: Duration::from_secs(60),
            action: LimitAction::Allow,
        },
    );

    limiter.commit("t1", None, None);
    limiter.commit("t1", None, None);
    assert!(limiter.check("t1", None, None).allowed);
}

#[test]
fn test_adaptive_downscaling() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        global: None,
        tenant_default: Some(RateRule::throttle(10, Duration::from_secs(60))),
        agent_default: None,
        source_default: None,
    });

    assert_eq!(limiter.tenant_factor(), 1.0);
    assert_eq!(limiter.check("t1", None, None).limit, 10);

    limiter.update_adaptive(0.7, 100.0);
    assert_eq!(limiter.tenant_factor(), 0.85);
    assert_eq!(limiter.check("t1", None, None).limit, 8);

    limiter.update_adaptive(0.9, 100.0);
    assert_eq!(limiter.tenant_factor(), 0.7);
    assert_eq!(limiter.check("t1", None, None).limit, 7);

    limiter.update_adaptive(0.2, 50.0);
    assert_eq!(limiter.tenant_factor(), 1.0);
    assert_eq!(limiter.check("t1", None, None).limit, 10);
}

#[test]
fn test_adaptive_respects_latency_pressure() {
    let limiter = RateLimiter::new(RateLimiterConfig::default());
    limiter.update_adaptive(0.1, 1_500.0);
    assert_eq!(limiter.tenant_factor(), 0.7);
    limiter.update_adaptive(0.1, 600.0);
    assert_eq!(limiter.tenant_factor(), 0.85);
}

#[test]
fn test_violation_log_is_bounded_fifo() {
    let limiter = limiter_with_tenant_rule(0, 60_000);
    // A zero budget denies every check; each denial records a violation.
    for _ in 0..(crate::constants::MAX_VIOLATION_LOG + 10) {
        let _ = limiter.check("t1", None, None);
    }
    let violations = limiter.violations();
    assert_eq!(violations.len(), crate::constants::MAX_VIOLATION_LOG);
}

#[test]
fn test_sweep_evicts_clean_expired_buckets() {
    let limiter = limiter_with_tenant_rule(5, 20);
    limiter.commit("t1", None, None);

    std::thread::sleep(Duration::from_millis(30));
    limiter.sweep();

    // The clean, expired bucket is gone; a fresh check recreates it.
    let decision = limiter.check("t1", None, None);
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 5);
}

#[test]
fn test_sweep_keeps_buckets_with_violation_history() {
    let limiter = limiter_with_tenant_rule(0, 20);
    let _ = limiter.check("t1", None, None);

    std::thread::sleep(Duration::from_millis(30));
    limiter.sweep();
    assert!(!limiter.violations().is_empty());
}

#[test]
fn test_explicit_rule_overrides_default() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        global: None,
        tenant_default: Some(RateRule::throttle(100, Duration::from_secs(60))),
        agent_default: None,
        source_default: None,
    });
    limiter.set_rule(
        RateScope::Tenant("vip".to_string()),
        RateRule::throttle(1_000, Duration::from_secs(60)),
    );

    assert_eq!(limiter.check("vip", None, None).limit, 1_000);
    assert_eq!(limiter.check("other", None, None).limit, 100);

    limiter.remove_rule(&RateScope::Tenant("vip".to_string()));
    assert_eq!(limiter.check("vip", None, None).limit, 100);
}
