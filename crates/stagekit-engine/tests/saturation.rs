//! Saturation test - 150 requests through a 100-slot queue
//!
//! Run with: cargo test --package stagekit-engine --test saturation
//!
//! Floods the front-end with more requests than the queue holds and checks
//! that every one completes (some via the synchronous fallback) and that
//! the aggregator's counters converge to the submitted total.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagekit_engine::{AsyncStagingEngine, EngineConfig};
use stagekit_model::{Apply, OperationKind, Session, SessionId, Stage, StageId};
use stagekit_store::{MemoryStore, RecordStore, StoreError, TxnFn};
use std::sync::Arc;
use std::time::Duration;

/// Store wrapper that makes creations slow enough to fill the queue.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn create_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_stage(stage).await
    }

    async fn stage(&self, id: &StageId) -> Result<Stage, StoreError> {
        self.inner.stage(id).await
    }

    async fn update_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        self.inner.update_stage(stage).await
    }

    async fn pending_stages(&self, session: Option<&SessionId>) -> Result<Vec<Stage>, StoreError> {
        self.inner.pending_stages(session).await
    }

    async fn pending_stage_count(&self, session: &SessionId) -> Result<u64, StoreError> {
        self.inner.pending_stage_count(session).await
    }

    async fn expire_stages_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.expire_stages_before(cutoff).await
    }

    async fn delete_stage(&self, id: &StageId) -> Result<(), StoreError> {
        self.inner.delete_stage(id).await
    }

    async fn delete_applied_stages(&self, session: &SessionId) -> Result<u64, StoreError> {
        self.inner.delete_applied_stages(session).await
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.create_session(session).await
    }

    async fn session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.inner.session(id).await
    }

    async fn transaction(&self, f: TxnFn<'_>) -> Result<(), StoreError> {
        self.inner.transaction(f).await
    }
}

fn proposed(n: usize) -> Stage {
    Stage::new("rust", OperationKind::Replace, "function", format!("target_{n}"))
}

#[tokio::test]
async fn all_150_requests_complete_under_saturation() {
    tracing_subscriber::fmt()
        .with_env_filter("stagekit_engine=debug")
        .try_init()
        .ok();

    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(10),
    });
    let config = EngineConfig::new()
        .with_workers(10)
        .with_queue_capacity(100);
    let front = AsyncStagingEngine::new(store, config);

    let mut handles = Vec::with_capacity(150);
    for n in 0..150 {
        handles.push(front.create_stage_async(proposed(n)).await);
    }

    let mut ok = 0usize;
    for handle in handles {
        handle.wait().await.expect("every request should complete");
        ok += 1;
    }
    assert_eq!(ok, 150);

    // The aggregator drains events asynchronously; give it a bounded
    // window to converge.
    let mut metrics = front.metrics();
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.borrow().total_stages < 150 {
            if metrics.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("aggregator should observe all 150 completions");

    let summary = metrics.borrow().clone();
    assert_eq!(summary.total_stages, 150);
    assert_eq!(summary.error_count, 0);
    assert!(summary.max_latency >= summary.avg_latency);

    let pending = front
        .lifecycle()
        .list_pending_stages(None)
        .await
        .unwrap();
    assert_eq!(pending.len(), 150);

    front.close().await;
}

#[tokio::test]
async fn batch_of_mixed_outcomes_is_ordered() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    // Stage limit 1: the second request on the limited session must fail.
    let config = EngineConfig::new().with_session_limits(1, 0);
    let front = AsyncStagingEngine::new(store, config);
    let session = SessionId::generate();

    front
        .create_stage_async(proposed(0).with_session(session.clone()))
        .await
        .wait()
        .await?;

    let mut batch = Vec::new();
    for n in 1..=5 {
        batch.push(proposed(n));
    }
    batch.insert(3, proposed(99).with_session(session));

    let outcomes = front.batch_create_stages(batch).await;
    assert_eq!(outcomes.len(), 6);
    for (index, outcome) in outcomes.iter().enumerate() {
        if index == 3 {
            assert!(outcome.is_err(), "limited session slot must fail");
        } else {
            assert!(outcome.is_ok(), "slot {index} should succeed");
        }
    }

    front.close().await;
    Ok(())
}

#[tokio::test]
async fn apply_record_attribution_survives_the_pool() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let front = AsyncStagingEngine::new(store, EngineConfig::new());

    let stage = front.create_stage_async(proposed(0)).await.wait().await?;
    let apply: Apply = front.lifecycle().apply_stage(&stage.id, true).await?;
    assert!(apply.auto_applied);
    assert_eq!(apply.applied_by, "auto");

    front.close().await;
    Ok(())
}
