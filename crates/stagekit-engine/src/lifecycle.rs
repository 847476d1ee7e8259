//! Transactional stage lifecycle
//!
//! [`StagingEngine`] owns the semantics of a single stage: creation with
//! engine-controlled defaults, status-gated application, expiration sweeps
//! and session-scoped listing. It is stateless between calls; all state
//! lives behind the [`RecordStore`] contract, and every status transition
//! happens inside one store transaction.

use crate::config::EngineConfig;
use crate::error::EngineError;
use chrono::Utc;
use stagekit_model::{Apply, SessionId, Stage, StageId, StageStatus};
use stagekit_store::{RecordStore, StoreError};
use std::sync::Arc;

/// Stage lifecycle manager.
///
/// Cheap to share; clones of the inner `Arc` point at the same store.
#[derive(Debug)]
pub struct StagingEngine<S: RecordStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: RecordStore> StagingEngine<S> {
    /// Create a lifecycle manager over `store`.
    #[inline]
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// The engine's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persist a new staged transformation.
    ///
    /// Assigns an id when the caller left it empty, forces the status to
    /// `pending`, and stamps `expires_at = created_at + TTL` unless the
    /// caller pre-set a deadline. Rejects the stage when its session is at
    /// the pending-stage ceiling.
    pub async fn create_stage(&self, mut stage: Stage) -> Result<Stage, EngineError> {
        if let Some(session) = &stage.session_id {
            let limit = self.config.max_stages_per_session;
            if limit > 0 {
                let pending = self.store.pending_stage_count(session).await?;
                if pending >= limit {
                    return Err(EngineError::StageLimit { pending, limit });
                }
            }
        }

        if stage.id.is_empty() {
            stage.id = StageId::generate();
        }
        stage.status = StageStatus::Pending;
        if stage.expires_at.is_none() {
            stage.expires_at = Some(stage.created_at + self.config.staging_ttl);
        }

        self.store.create_stage(&stage).await?;
        tracing::debug!(stage = %stage.id, operation = %stage.operation, "staged transformation");
        Ok(stage)
    }

    /// Load a stage by id.
    pub async fn get_stage(&self, id: &StageId) -> Result<Stage, EngineError> {
        self.store.stage(id).await.map_err(|err| match err {
            StoreError::NotFound(_) => EngineError::NotFound(id.clone()),
            other => EngineError::Store(other),
        })
    }

    /// Apply a pending stage, producing its [`Apply`] record.
    ///
    /// Runs as one store transaction: load, gate on status and TTL, insert
    /// the apply record, flip the stage to `applied`, and bump the owning
    /// session's applies counter. Concurrent applies on the same id race at
    /// the transaction layer; exactly one wins and the others observe
    /// [`EngineError::AlreadyApplied`].
    ///
    /// An apply that finds the stage past its deadline commits the
    /// `expired` status and still fails with [`EngineError::Expired`], so
    /// later reads see the terminal status instead of a stale `pending`.
    pub async fn apply_stage(
        &self,
        id: &StageId,
        auto_applied: bool,
    ) -> Result<Apply, EngineError> {
        let now = Utc::now();
        let stage_id = id.clone();
        let max_applies = self.config.max_applies_per_session;
        let mut outcome: Option<Result<Apply, EngineError>> = None;
        let outcome_slot = &mut outcome;

        self.store
            .transaction(Box::new(move |txn| {
                let mut stage = match txn.stage(&stage_id) {
                    Ok(stage) => stage,
                    Err(StoreError::NotFound(_)) => {
                        *outcome_slot = Some(Err(EngineError::NotFound(stage_id.clone())));
                        return Ok(());
                    }
                    Err(other) => return Err(other),
                };

                if stage.status != StageStatus::Pending {
                    *outcome_slot = Some(Err(EngineError::AlreadyApplied {
                        id: stage_id.clone(),
                        status: stage.status,
                    }));
                    return Ok(());
                }

                if stage.is_expired_at(now) {
                    // The one failure that mutates state: mark the stale
                    // stage dead and commit.
                    stage.status = StageStatus::Expired;
                    txn.put_stage(&stage)?;
                    *outcome_slot = Some(Err(EngineError::Expired {
                        id: stage_id.clone(),
                        expired_at: stage.expires_at.unwrap_or(now),
                    }));
                    return Ok(());
                }

                if let Some(session) = stage.session_id.clone() {
                    if max_applies > 0 {
                        let applied = txn.session_apply_count(&session)?;
                        if applied >= max_applies {
                            *outcome_slot = Some(Err(EngineError::ApplyLimit {
                                applied,
                                limit: max_applies,
                            }));
                            return Ok(());
                        }
                    }
                }

                let apply = Apply::new(stage_id.clone(), auto_applied);
                txn.insert_apply(&apply)?;

                stage.status = StageStatus::Applied;
                stage.applied_at = Some(now);
                txn.put_stage(&stage)?;

                if let Some(session) = &stage.session_id {
                    txn.increment_session_applies(session, 1)?;
                }

                *outcome_slot = Some(Ok(apply));
                Ok(())
            }))
            .await?;

        match outcome {
            Some(Ok(apply)) => {
                tracing::info!(
                    stage = %id,
                    apply = %apply.id,
                    auto = auto_applied,
                    "applied stage"
                );
                Ok(apply)
            }
            Some(Err(err)) => Err(err),
            None => Err(EngineError::Store(StoreError::Backend(
                "apply transaction committed without an outcome".into(),
            ))),
        }
    }

    /// All pending stages, newest first. `None` lists across sessions.
    ///
    /// The head of this listing is what "apply latest" commits.
    pub async fn list_pending_stages(
        &self,
        session: Option<&SessionId>,
    ) -> Result<Vec<Stage>, EngineError> {
        Ok(self.store.pending_stages(session).await?)
    }

    /// Flip every pending stage past its deadline to `expired`.
    ///
    /// Idempotent; safe to run on an interval or on demand. Creates no
    /// apply records and touches no session counters.
    pub async fn cleanup_expired_stages(&self) -> Result<u64, EngineError> {
        let swept = self.store.expire_stages_before(Utc::now()).await?;
        if swept > 0 {
            tracing::debug!(swept, "expired stale stages");
        }
        Ok(swept)
    }

    /// Apply the most recent pending stage, if any.
    pub async fn apply_latest(
        &self,
        session: Option<&SessionId>,
    ) -> Result<Option<Apply>, EngineError> {
        let pending = self.list_pending_stages(session).await?;
        match pending.first() {
            Some(stage) => Ok(Some(self.apply_stage(&stage.id, false).await?)),
            None => Ok(None),
        }
    }

    /// Apply every pending stage, reporting a per-stage outcome.
    ///
    /// Stages already past their deadline are reported as expired without
    /// an apply attempt; the periodic sweep flips their status. The batch
    /// never fails atomically.
    pub async fn apply_all(
        &self,
        session: Option<&SessionId>,
    ) -> Result<Vec<(StageId, Result<Apply, EngineError>)>, EngineError> {
        let pending = self.list_pending_stages(session).await?;
        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(pending.len());
        for stage in pending {
            if stage.is_expired_at(now) {
                let expired_at = stage.expires_at.unwrap_or(now);
                outcomes.push((
                    stage.id.clone(),
                    Err(EngineError::Expired {
                        id: stage.id,
                        expired_at,
                    }),
                ));
                continue;
            }
            let outcome = self.apply_stage(&stage.id, false).await;
            outcomes.push((stage.id, outcome));
        }
        Ok(outcomes)
    }

    /// Remove a stage by id.
    pub async fn delete_stage(&self, id: &StageId) -> Result<(), EngineError> {
        Ok(self.store.delete_stage(id).await?)
    }

    /// Remove every applied stage owned by a session.
    pub async fn delete_applied_stages(&self, session: &SessionId) -> Result<u64, EngineError> {
        Ok(self.store.delete_applied_stages(session).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use stagekit_model::{OperationKind, Session};
    use stagekit_store::MemoryStore;

    fn engine() -> StagingEngine<MemoryStore> {
        StagingEngine::new(Arc::new(MemoryStore::new()), EngineConfig::new())
    }

    fn engine_with(config: EngineConfig) -> StagingEngine<MemoryStore> {
        StagingEngine::new(Arc::new(MemoryStore::new()), config)
    }

    fn proposed() -> Stage {
        Stage::new("rust", OperationKind::Replace, "function", "handler")
    }

    #[tokio::test]
    async fn create_assigns_defaults() {
        let engine = engine();
        let stage = engine.create_stage(proposed()).await.unwrap();

        assert!(!stage.id.is_empty());
        assert_eq!(stage.status, StageStatus::Pending);
        let expires_at = stage.expires_at.unwrap();
        assert_eq!(expires_at - stage.created_at, Duration::minutes(15));
    }

    #[tokio::test]
    async fn create_respects_preset_deadline() {
        let engine = engine();
        let mut stage = proposed();
        let deadline = Utc::now() + Duration::hours(2);
        stage.expires_at = Some(deadline);

        let stage = engine.create_stage(stage).await.unwrap();
        assert_eq!(stage.expires_at, Some(deadline));
    }

    #[tokio::test]
    async fn create_enforces_session_stage_limit() {
        let engine = engine_with(EngineConfig::new().with_session_limits(2, 0));
        let session = SessionId::generate();

        for _ in 0..2 {
            engine
                .create_stage(proposed().with_session(session.clone()))
                .await
                .unwrap();
        }
        let err = engine
            .create_stage(proposed().with_session(session))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::StageLimit {
                pending: 2,
                limit: 2
            }
        ));
    }

    #[tokio::test]
    async fn get_unknown_stage_is_not_found() {
        let err = engine()
            .get_stage(&StageId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn apply_commits_stage_and_session_counter() {
        let store = Arc::new(MemoryStore::new());
        let engine = StagingEngine::new(store.clone(), EngineConfig::new());
        let session = Session::new();
        store.create_session(&session).await.unwrap();

        let stage = engine
            .create_stage(proposed().with_session(session.id.clone()))
            .await
            .unwrap();
        let apply = engine.apply_stage(&stage.id, false).await.unwrap();

        assert_eq!(apply.stage_id, stage.id);
        assert_eq!(apply.applied_by, "mcp");

        let committed = engine.get_stage(&stage.id).await.unwrap();
        assert_eq!(committed.status, StageStatus::Applied);
        assert!(committed.applied_at.is_some());

        let row = store.session(&session.id).await.unwrap();
        assert_eq!(row.applies_count, 1);
    }

    #[tokio::test]
    async fn auto_apply_is_attributed() {
        let engine = engine();
        let stage = engine.create_stage(proposed()).await.unwrap();
        let apply = engine.apply_stage(&stage.id, true).await.unwrap();
        assert!(apply.auto_applied);
        assert_eq!(apply.applied_by, "auto");
    }

    #[tokio::test]
    async fn second_apply_sees_terminal_status() {
        let store = Arc::new(MemoryStore::new());
        let engine = StagingEngine::new(store.clone(), EngineConfig::new());
        let stage = engine.create_stage(proposed()).await.unwrap();

        engine.apply_stage(&stage.id, false).await.unwrap();
        let err = engine.apply_stage(&stage.id, false).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyApplied {
                status: StageStatus::Applied,
                ..
            }
        ));
        assert_eq!(store.apply_count(), 1);
    }

    #[tokio::test]
    async fn apply_of_missing_stage_is_not_found() {
        let err = engine()
            .apply_stage(&StageId::generate(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn expired_apply_commits_terminal_status() {
        let engine = engine();
        let mut stage = proposed();
        stage.expires_at = Some(Utc::now() - Duration::minutes(1));
        let stage = engine.create_stage(stage).await.unwrap();

        let err = engine.apply_stage(&stage.id, true).await.unwrap_err();
        assert!(matches!(err, EngineError::Expired { .. }));

        // The expiry mark survives the failed apply.
        let observed = engine.get_stage(&stage.id).await.unwrap();
        assert_eq!(observed.status, StageStatus::Expired);
    }

    #[tokio::test]
    async fn apply_enforces_session_apply_limit() {
        let store = Arc::new(MemoryStore::new());
        let engine = StagingEngine::new(
            store.clone(),
            EngineConfig::new().with_session_limits(0, 1),
        );
        let session = Session::new();
        store.create_session(&session).await.unwrap();

        let first = engine
            .create_stage(proposed().with_session(session.id.clone()))
            .await
            .unwrap();
        let second = engine
            .create_stage(proposed().with_session(session.id.clone()))
            .await
            .unwrap();

        engine.apply_stage(&first.id, false).await.unwrap();
        let err = engine.apply_stage(&second.id, false).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::ApplyLimit {
                applied: 1,
                limit: 1
            }
        ));

        // The rejected apply left the stage untouched.
        let untouched = engine.get_stage(&second.id).await.unwrap();
        assert_eq!(untouched.status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_session_scoped() {
        let engine = engine();
        let session = SessionId::generate();
        let mut created = Vec::new();
        for _ in 0..3 {
            let stage = engine
                .create_stage(proposed().with_session(session.clone()))
                .await
                .unwrap();
            created.push(stage.id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        engine.create_stage(proposed()).await.unwrap();

        let listed = engine.list_pending_stages(Some(&session)).await.unwrap();
        assert_eq!(listed.len(), 3);
        created.reverse();
        let listed_ids: Vec<StageId> = listed.into_iter().map(|s| s.id).collect();
        assert_eq!(listed_ids, created);
    }

    #[tokio::test]
    async fn apply_latest_matches_head_of_listing() {
        let engine = engine();
        let session = SessionId::generate();
        for _ in 0..3 {
            engine
                .create_stage(proposed().with_session(session.clone()))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let head = engine.list_pending_stages(Some(&session)).await.unwrap()[0]
            .id
            .clone();
        let apply = engine.apply_latest(Some(&session)).await.unwrap().unwrap();
        assert_eq!(apply.stage_id, head);
    }

    #[tokio::test]
    async fn apply_latest_with_nothing_pending() {
        let engine = engine();
        assert!(engine.apply_latest(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_all_reports_per_stage_outcomes() {
        let engine = engine();
        let session = SessionId::generate();

        let mut stale = proposed().with_session(session.clone());
        stale.expires_at = Some(Utc::now() - Duration::minutes(1));
        let stale = engine.create_stage(stale).await.unwrap();
        let fresh = engine
            .create_stage(proposed().with_session(session.clone()))
            .await
            .unwrap();

        let outcomes = engine.apply_all(Some(&session)).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        for (id, outcome) in outcomes {
            if id == stale.id {
                assert!(matches!(outcome, Err(EngineError::Expired { .. })));
            } else {
                assert_eq!(id, fresh.id);
                assert!(outcome.is_ok());
            }
        }
    }

    #[tokio::test]
    async fn cleanup_sweeps_only_stale_pending_stages() {
        let engine = engine();
        let mut stale = proposed();
        stale.expires_at = Some(Utc::now() - Duration::minutes(1));
        let stale = engine.create_stage(stale).await.unwrap();
        engine.create_stage(proposed()).await.unwrap();

        assert_eq!(engine.cleanup_expired_stages().await.unwrap(), 1);
        assert_eq!(engine.cleanup_expired_stages().await.unwrap(), 0);
        let swept = engine.get_stage(&stale.id).await.unwrap();
        assert_eq!(swept.status, StageStatus::Expired);
    }

    #[tokio::test]
    async fn concurrent_applies_elect_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(StagingEngine::new(store.clone(), EngineConfig::new()));
        let stage = engine.create_stage(proposed()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let id = stage.id.clone();
            tasks.push(tokio::spawn(
                async move { engine.apply_stage(&id, false).await },
            ));
        }

        let mut wins = 0;
        let mut already = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(EngineError::AlreadyApplied { .. }) => already += 1,
                Err(other) => panic!("unexpected outcome: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(already, 7);
        assert_eq!(store.apply_count(), 1);
    }

    #[tokio::test]
    async fn delete_applied_stages_clears_terminal_rows() {
        let engine = engine();
        let session = SessionId::generate();
        let stage = engine
            .create_stage(proposed().with_session(session.clone()))
            .await
            .unwrap();
        engine.apply_stage(&stage.id, false).await.unwrap();

        assert_eq!(engine.delete_applied_stages(&session).await.unwrap(), 1);
        assert!(matches!(
            engine.get_stage(&stage.id).await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }
}
