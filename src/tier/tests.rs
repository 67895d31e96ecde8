use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::embedding::{Embedder, Embedding, EmbeddingError, ProbeReport};

/// Test double that fails its first `fail_first` embed calls.
struct ScriptedEmbedder {
    dimension: usize,
    fail_first: usize,
    probe_available: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEmbedder {
    fn new(dimension: usize, fail_first: usize, probe_available: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                dimension,
                fail_first,
                probe_available,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait::async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(EmbeddingError::Unavailable {
                provider: "scripted",
                reason: "scripted failure".to_string(),
            });
        }
        let mut vector = vec![0.0; self.dimension];
        vector[0] = 1.0;
        Ok(Embedding {
            vector,
            token_estimate: 1,
            model_tag: "scripted".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        if self.probe_available {
            Ok(ProbeReport {
                model_tag: "scripted".to_string(),
                dimension: self.dimension,
            })
        } else {
            Err(EmbeddingError::Unavailable {
                provider: "scripted",
                reason: "probe refused".to_string(),
            })
        }
    }
}

const DIM: usize = 8;

fn chain(
    advanced: ScriptedEmbedder,
    basic_dim: usize,
) -> Vec<(TierLevel, Box<dyn Embedder>)> {
    vec![
        (TierLevel::Advanced, Box::new(advanced) as Box<dyn Embedder>),
        (
            TierLevel::Basic,
            Box::new(crate::embedding::LexicalEmbedder::new(basic_dim)),
        ),
        (
            TierLevel::Mock,
            Box::new(crate::embedding::MockEmbedder::new(basic_dim)),
        ),
    ]
}

#[tokio::test]
async fn test_startup_selects_first_available() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 0, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    let descriptor = controller.probe().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Advanced);
    assert_eq!(
        descriptor.fallback_chain,
        vec![TierLevel::Basic, TierLevel::Mock]
    );
}

#[tokio::test]
async fn test_startup_skips_unavailable_provider() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 0, false);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    let descriptor = controller.probe().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Basic);
}

#[tokio::test]
async fn test_not_ready_before_probe() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 0, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    assert_eq!(controller.state().await, TierState::Probing);
    assert!(matches!(
        controller.embed("hi").await.unwrap_err(),
        TierError::NotReady
    ));
}

#[tokio::test]
async fn test_dimension_mismatch_rejected_at_construction() {
    let (advanced, _) = ScriptedEmbedder::new(4, 0, true);
    let err = TierController::new(chain(advanced, DIM), DIM).unwrap_err();
    assert!(matches!(err, TierError::DimensionMismatch { .. }));
}

#[tokio::test]
async fn test_two_failures_demote_and_retry_succeeds() {
    let (advanced, calls) = ScriptedEmbedder::new(DIM, usize::MAX, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    controller.probe().await.unwrap();
    // Probe counts one embed? No: ScriptedEmbedder::probe does not embed.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // First failure: under the threshold, surfaces the error.
    assert!(controller.embed("hello").await.is_err());
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Advanced));

    // Second failure within the window: demote to basic and retry there.
    let embedding = controller.embed("hello").await.unwrap();
    assert_eq!(embedding.vector.len(), DIM);
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Basic));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_demotion_sticks_no_automatic_promotion() {
    let (advanced, calls) = ScriptedEmbedder::new(DIM, usize::MAX, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    controller.probe().await.unwrap();
    assert!(!controller.demotion_held().await);

    let _ = controller.embed("a").await;
    controller.embed("a").await.unwrap();
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Basic));
    assert!(controller.demotion_held().await);

    // Subsequent embeds bypass the failed advanced provider entirely.
    for _ in 0..5 {
        controller.embed("again").await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Basic));
}

#[tokio::test]
async fn test_re_probe_restores_recovered_provider() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 2, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    controller.probe().await.unwrap();

    let _ = controller.embed("x").await;
    controller.embed("x").await.unwrap();
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Basic));

    // The scripted provider now succeeds; only an explicit re-probe promotes.
    let descriptor = controller.re_probe().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Advanced);
    controller.embed("x").await.unwrap();
}

#[tokio::test]
async fn test_success_resets_failure_window() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 1, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    controller.probe().await.unwrap();

    // One failure, then success: window resets, no demotion.
    assert!(controller.embed("a").await.is_err());
    controller.embed("a").await.unwrap();
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Advanced));

    // A later single failure still does not demote.
    // (provider now always succeeds, so simply confirm the tier held)
    controller.embed("b").await.unwrap();
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Advanced));
}

#[tokio::test]
async fn test_explicit_demote_walks_the_chain() {
    let (advanced, _) = ScriptedEmbedder::new(DIM, 0, true);
    let controller = TierController::new(chain(advanced, DIM), DIM).unwrap();
    controller.probe().await.unwrap();

    assert_eq!(controller.demote().await, Some(TierLevel::Basic));
    assert_eq!(controller.demote().await, Some(TierLevel::Mock));
    assert_eq!(controller.demote().await, None);
    assert_eq!(controller.state().await, TierState::Active(TierLevel::Mock));
}

#[tokio::test]
async fn test_test_mode_chain_is_mock_only() {
    let spec = TierChainSpec {
        remote: None,
        local: None,
        dimension: DIM,
        preferred: None,
        test_mode: true,
    };
    let controller = TierController::from_spec(&spec).unwrap();
    let descriptor = controller.probe().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Mock);
    assert!(descriptor.fallback_chain.is_empty());
}

#[tokio::test]
async fn test_preferred_tier_caps_the_chain() {
    let spec = TierChainSpec {
        remote: Some(crate::embedding::RemoteConfig::new("http://127.0.0.1:1", "key")),
        local: None,
        dimension: crate::constants::DEFAULT_EMBEDDING_DIM,
        preferred: Some(TierLevel::Basic),
        test_mode: false,
    };
    let chain = build_chain(&spec).unwrap();
    let levels: Vec<TierLevel> = chain.iter().map(|(l, _)| *l).collect();
    assert_eq!(levels, vec![TierLevel::Basic, TierLevel::Mock]);
}

#[tokio::test]
async fn test_probe_timeout_counts_as_unavailable() {
    struct HangingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for HangingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            std::future::pending().await
        }
        fn dimension(&self) -> usize {
            DIM
        }
        fn name(&self) -> &'static str {
            "hanging"
        }
        async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
            std::future::pending().await
        }
    }

    let providers: Vec<(TierLevel, Box<dyn Embedder>)> = vec![
        (TierLevel::Advanced, Box::new(HangingEmbedder)),
        (
            TierLevel::Mock,
            Box::new(crate::embedding::MockEmbedder::new(DIM)),
        ),
    ];
    let controller = TierController::new(providers, DIM)
        .unwrap()
        .with_probe_budget(Duration::from_millis(50));
    let descriptor = controller.probe().await.unwrap();
    assert_eq!(descriptor.level, TierLevel::Mock);
}
