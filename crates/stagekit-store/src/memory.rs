//! In-memory record store
//!
//! Reference implementation of [`RecordStore`] backed by hash maps under a
//! single lock. Transactions snapshot the whole state and restore it on
//! error, which gives the same all-or-nothing guarantee a database provides
//! at a scale where a full clone is cheap. Two concurrent transactions on
//! the same stage serialize on the lock, so exactly one observes the other's
//! terminal status.

use crate::contract::{RecordStore, StoreTxn, TxnFn};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stagekit_model::{Apply, ApplyId, Session, SessionId, Stage, StageId, StageStatus};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct State {
    stages: HashMap<StageId, Stage>,
    applies: HashMap<ApplyId, Apply>,
    // Unique index mirroring the one-apply-per-stage constraint.
    applied_stages: HashSet<StageId>,
    sessions: HashMap<SessionId, Session>,
}

impl StoreTxn for State {
    fn stage(&mut self, id: &StageId) -> Result<Stage, StoreError> {
        self.stages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put_stage(&mut self, stage: &Stage) -> Result<(), StoreError> {
        self.stages.insert(stage.id.clone(), stage.clone());
        Ok(())
    }

    fn insert_apply(&mut self, apply: &Apply) -> Result<(), StoreError> {
        if !self.applied_stages.insert(apply.stage_id.clone()) {
            return Err(StoreError::Duplicate(format!(
                "apply for stage {}",
                apply.stage_id
            )));
        }
        self.applies.insert(apply.id.clone(), apply.clone());
        Ok(())
    }

    fn session_apply_count(&mut self, session: &SessionId) -> Result<u64, StoreError> {
        let count = self
            .applies
            .values()
            .filter(|apply| {
                self.stages
                    .get(&apply.stage_id)
                    .is_some_and(|stage| stage.session_id.as_ref() == Some(session))
            })
            .count();
        Ok(count as u64)
    }

    fn increment_session_applies(
        &mut self,
        session: &SessionId,
        delta: u64,
    ) -> Result<(), StoreError> {
        if let Some(row) = self.sessions.get_mut(session) {
            row.applies_count += delta;
        }
        Ok(())
    }
}

/// Hash-map backed [`RecordStore`] with snapshot-rollback transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of apply records, across all stages.
    #[must_use]
    pub fn apply_count(&self) -> u64 {
        self.state.lock().applies.len() as u64
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.stages.contains_key(&stage.id) {
            return Err(StoreError::Duplicate(stage.id.to_string()));
        }
        state.stages.insert(stage.id.clone(), stage.clone());
        if let Some(session) = &stage.session_id {
            if let Some(row) = state.sessions.get_mut(session) {
                row.stages_count += 1;
            }
        }
        Ok(())
    }

    async fn stage(&self, id: &StageId) -> Result<Stage, StoreError> {
        self.state
            .lock()
            .stages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.stages.contains_key(&stage.id) {
            return Err(StoreError::NotFound(stage.id.to_string()));
        }
        state.stages.insert(stage.id.clone(), stage.clone());
        Ok(())
    }

    async fn pending_stages(&self, session: Option<&SessionId>) -> Result<Vec<Stage>, StoreError> {
        let state = self.state.lock();
        let mut stages: Vec<Stage> = state
            .stages
            .values()
            .filter(|stage| stage.status == StageStatus::Pending)
            .filter(|stage| match session {
                Some(session) => stage.session_id.as_ref() == Some(session),
                None => true,
            })
            .cloned()
            .collect();
        // Newest first; ULID ids break creation-timestamp ties.
        stages.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(stages)
    }

    async fn pending_stage_count(&self, session: &SessionId) -> Result<u64, StoreError> {
        let state = self.state.lock();
        let count = state
            .stages
            .values()
            .filter(|stage| {
                stage.status == StageStatus::Pending
                    && stage.session_id.as_ref() == Some(session)
            })
            .count();
        Ok(count as u64)
    }

    async fn expire_stages_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let mut changed = 0u64;
        for stage in state.stages.values_mut() {
            if stage.status == StageStatus::Pending
                && stage.expires_at.is_some_and(|deadline| deadline < cutoff)
            {
                stage.status = StageStatus::Expired;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_stage(&self, id: &StageId) -> Result<(), StoreError> {
        self.state.lock().stages.remove(id);
        Ok(())
    }

    async fn delete_applied_stages(&self, session: &SessionId) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let before = state.stages.len();
        state.stages.retain(|_, stage| {
            !(stage.status == StageStatus::Applied
                && stage.session_id.as_ref() == Some(session))
        });
        Ok((before - state.stages.len()) as u64)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate(session.id.to_string()));
        }
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.state
            .lock()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn transaction(&self, f: TxnFn<'_>) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let snapshot = state.clone();
        match f(&mut *state) {
            Ok(()) => Ok(()),
            Err(err) => {
                *state = snapshot;
                Err(err)
            }
        }
    }
}
