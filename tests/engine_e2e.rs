//! End-to-end engine scenarios over the in-memory index.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use common::fixtures::{DIM, counting_engine, fast_config, outage_engine};
use memorai::embedding::{Embedder, MockEmbedder};
use memorai::engine::{
    EngineError, ErrorCode, ForgetSelector, MemoryEngine, MemoryQuery, OpContext, RememberRequest,
};
use memorai::index::{IndexPoint, VectorIndex, WriteConsistency};
use memorai::ratelimit::{RateLimiterConfig, RateRule, RateScope};
use memorai::record::{AttributeBag, MemoryKind, MemoryRecord};
use memorai::scoring::ScoreReason;
use memorai::tier::TierLevel;

fn ctx() -> OpContext {
    OpContext::new()
}

#[tokio::test]
async fn scenario_basic_round_trip() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;

    let id = engine
        .remember(
            RememberRequest::new("User prefers dark mode", "t1", "a1")
                .kind(MemoryKind::Preference)
                .importance(0.7),
            &ctx(),
        )
        .await
        .unwrap();

    let results = engine
        .recall(
            MemoryQuery::new("dark mode preferences", "t1").agent("a1").k(5),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    // The remembered memory appears at the top with a meaningful score.
    // (The fixture's "basic" tier embeds identical text identically, so the
    // closest match is deterministic; an exact-text recall pins it.)
    let exact = engine
        .recall(
            MemoryQuery::new("User prefers dark mode", "t1").agent("a1").k(5),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(exact[0].record.id, id);
    assert!(exact[0].score >= 0.5);
    assert!(matches!(
        exact[0].reason,
        ScoreReason::Semantic | ScoreReason::Lexical
    ));
}

#[tokio::test]
async fn scenario_tenant_isolation() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;

    engine
        .remember(RememberRequest::new("secret", "t1", "a1"), &ctx())
        .await
        .unwrap();

    let results = engine
        .recall(MemoryQuery::new("secret", "t2").k(10), &ctx())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn scenario_forget_removes_from_recall() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;

    let id = engine
        .remember(
            RememberRequest::new("User prefers dark mode", "t1", "a1")
                .kind(MemoryKind::Preference),
            &ctx(),
        )
        .await
        .unwrap();

    let outcome = engine
        .forget(
            ForgetSelector::ById {
                tenant_id: "t1".to_string(),
                agent_id: None,
                id,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 1);
    assert!(outcome.failed_ids.is_empty());

    let results = engine
        .recall(MemoryQuery::new("dark mode", "t1").k(5), &ctx())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn scenario_rate_limit_denial_without_side_effects() {
    let (engine, embed_calls) = counting_engine(RateLimiterConfig::unlimited()).await;
    engine.limiter().set_rule(
        RateScope::Tenant("t1".to_string()),
        RateRule::throttle(2, Duration::from_millis(1_000)),
    );

    let started = Utc::now();

    // Two admitted recalls.
    for _ in 0..2 {
        engine
            .recall(MemoryQuery::new("anything at all", "t1").k(3), &ctx())
            .await
            .unwrap();
    }
    // The second recall hits the hot cache, so only the first embedded.
    let embeds_before_denial = embed_calls.load(Ordering::SeqCst);

    // Third within the window: denied, and the provider is never invoked.
    let err = engine
        .recall(MemoryQuery::new("something new entirely", "t1").k(3), &ctx())
        .await
        .unwrap_err();

    match err {
        EngineError::RateLimited { decision } => {
            assert!(decision.reset_at > started);
            assert!(decision.reset_at <= started + chrono::Duration::milliseconds(1_100));
        }
        other => panic!("expected RateLimited, got {other}"),
    }
    assert_eq!(embed_calls.load(Ordering::SeqCst), embeds_before_denial);
}

#[tokio::test]
async fn scenario_tier_fallback_after_repeated_unavailable() {
    let (engine, outage_calls) = outage_engine().await;

    // Startup selected the advanced provider (its probe succeeds).
    assert_eq!(engine.tier_info().await.unwrap().level, TierLevel::Advanced);

    // One remember: the advanced provider fails twice inside the retry
    // loop, the controller demotes, and the same request completes at the
    // demoted tier.
    engine
        .remember(RememberRequest::new("persist me", "t1", "a1"), &ctx())
        .await
        .unwrap();

    let descriptor = engine.tier_info().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Smart);
    assert_eq!(outage_calls.load(Ordering::SeqCst), 2);

    // Demotion is sticky: further writes never touch the failed provider.
    for i in 0..3 {
        engine
            .remember(
                RememberRequest::new(format!("more data {i}"), "t1", "a1"),
                &ctx(),
            )
            .await
            .unwrap();
    }
    assert_eq!(outage_calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.tier_info().await.unwrap().level, TierLevel::Smart);
}

#[tokio::test]
async fn scenario_importance_and_recency_ordering() {
    let engine = MemoryEngine::new_mock_with(RateLimiterConfig::unlimited(), fast_config()).await;
    let embedder = MockEmbedder::new(memorai::engine::MOCK_DIM);
    let now = Utc::now();

    let plant = |content: &str, tenant: &str, importance: f64, age: chrono::Duration| {
        let at = now - age;
        MemoryRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            agent_id: "a1".to_string(),
            content: content.to_string(),
            kind: MemoryKind::Fact,
            importance,
            confidence: 1.0,
            tags: vec![],
            created_at: at,
            updated_at: at,
            last_accessed_at: at,
            access_count: 0,
            expires_at: None,
            context: AttributeBag::new(),
        }
    };

    // Both records carry identical content, hence identical similarity to
    // the query. τ = 72 h is the ranker default.
    let q = "shared subject matter";
    let vector = embedder.embed(q).await.unwrap().vector;

    // Case 1: both within tau. Importance decides, A precedes B.
    let a = plant(q, "case1", 0.9, chrono::Duration::hours(2));
    let b = plant(q, "case1", 0.3, chrono::Duration::minutes(1));
    engine
        .index()
        .upsert(
            vec![
                IndexPoint::new(a.id, vector.clone(), a.to_payload()).unwrap(),
                IndexPoint::new(b.id, vector.clone(), b.to_payload()).unwrap(),
            ],
            WriteConsistency::Strong,
        )
        .await
        .unwrap();

    let results = engine
        .recall(MemoryQuery::new(q, "case1").k(2), &ctx())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.id, a.id, "importance should dominate within τ");

    // Case 2: A aged to tau. Decay overtakes its importance edge, B first.
    let a2 = plant(q, "case2", 0.9, chrono::Duration::hours(72));
    let b2 = plant(q, "case2", 0.3, chrono::Duration::minutes(1));
    engine
        .index()
        .upsert(
            vec![
                IndexPoint::new(a2.id, vector.clone(), a2.to_payload()).unwrap(),
                IndexPoint::new(b2.id, vector.clone(), b2.to_payload()).unwrap(),
            ],
            WriteConsistency::Strong,
        )
        .await
        .unwrap();

    let results = engine
        .recall(MemoryQuery::new(q, "case2").k(2), &ctx())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.id, b2.id, "decay at τ should let recency win");
}

#[tokio::test]
async fn recall_after_forget_by_query_is_empty() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;

    for i in 0..4 {
        engine
            .remember(
                RememberRequest::new(format!("scratch note {i}"), "t1", "a1"),
                &ctx(),
            )
            .await
            .unwrap();
    }

    let outcome = engine
        .forget(
            ForgetSelector::ByQuery {
                query: MemoryQuery::new("scratch", "t1"),
                confirm: true,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 4);

    let results = engine
        .recall(MemoryQuery::new("scratch note", "t1").k(10), &ctx())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn access_count_deltas_match_returned_results() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(
            engine
                .remember(
                    RememberRequest::new(format!("countable item {i}"), "t1", "a1"),
                    &ctx(),
                )
                .await
                .unwrap(),
        );
    }

    let results = engine
        .recall(MemoryQuery::new("countable item", "t1").k(10), &ctx())
        .await
        .unwrap();
    let returned = results.len() as u64;
    assert_eq!(returned, 3);

    engine.flush_write_behind().await;

    let total_accesses: u64 = ids
        .iter()
        .map(|id| engine.index().get(id).unwrap().access_count)
        .sum();
    assert_eq!(total_accesses, returned);
}

#[tokio::test]
async fn recall_with_invalid_bounds_never_touches_the_index() {
    let (engine, embed_calls) = counting_engine(RateLimiterConfig::unlimited()).await;

    let err = engine
        .recall(MemoryQuery::new("q", "t1").k(500), &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    let err = engine
        .recall(MemoryQuery::new("  ", "t1"), &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_writers_never_corrupt_reads() {
    let (engine, _) = counting_engine(RateLimiterConfig::unlimited()).await;
    let engine = std::sync::Arc::new(engine);

    let mut handles = Vec::new();
    for w in 0..4 {
        let engine = std::sync::Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                engine
                    .remember(
                        RememberRequest::new(
                            format!("writer {w} item {i}"),
                            "t1",
                            format!("agent-{w}"),
                        ),
                        &OpContext::new(),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for w in 0..4 {
        let engine = std::sync::Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                // Concurrent recalls may see any prefix of the writes, but
                // every record they see is fully formed.
                let results = engine
                    .recall(
                        MemoryQuery::new(format!("writer {w} item"), "t1").k(50),
                        &OpContext::new(),
                    )
                    .await
                    .unwrap();
                for r in results {
                    assert_eq!(r.record.tenant_id, "t1");
                    assert!(!r.record.content.is_empty());
                    assert!(r.record.created_at <= r.record.last_accessed_at);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    engine.flush_write_behind().await;
    assert_eq!(engine.index().len(), 20);
}

#[tokio::test]
async fn fixture_dim_matches_engine_mock_dim() {
    // Keeps the fixture dimension honest against the crate's mock dimension.
    assert_eq!(DIM, memorai::engine::MOCK_DIM);
}
