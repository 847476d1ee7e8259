//! Persistence contract
//!
//! The engine never talks to a database directly; it depends on
//! [`RecordStore`], an atomic key-record store over the three record kinds
//! (stage, apply, session). Implementations must provide all-or-nothing
//! semantics for [`RecordStore::transaction`]: if the closure returns an
//! error, none of its writes may be visible afterwards.
//!
//! The ordering contract on [`RecordStore::pending_stages`] is load-bearing:
//! "apply latest" picks the head of that listing, so implementations must
//! guarantee creation-time-descending order at the query layer rather than
//! relying on insertion order.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagekit_model::{Apply, Session, SessionId, Stage, StageId};

/// Mutable view of an open transaction.
///
/// Handed to the closure passed to [`RecordStore::transaction`]. All reads
/// observe writes made earlier in the same transaction.
pub trait StoreTxn {
    /// Load a stage by id.
    fn stage(&mut self, id: &StageId) -> Result<Stage, StoreError>;

    /// Insert or overwrite a stage.
    fn put_stage(&mut self, stage: &Stage) -> Result<(), StoreError>;

    /// Insert an apply record. Fails with [`StoreError::Duplicate`] when an
    /// apply already exists for the same stage.
    fn insert_apply(&mut self, apply: &Apply) -> Result<(), StoreError>;

    /// Count apply records attributed to a session (joined through the
    /// owning stage).
    fn session_apply_count(&mut self, session: &SessionId) -> Result<u64, StoreError>;

    /// Atomically add `delta` to a session's applies counter.
    ///
    /// A missing session is a no-op, matching an UPDATE that affects zero
    /// rows. This must be an in-place increment at the store layer, never a
    /// read-modify-write in the caller.
    fn increment_session_applies(
        &mut self,
        session: &SessionId,
        delta: u64,
    ) -> Result<(), StoreError>;
}

/// Boxed transaction body.
///
/// Returning `Err` rolls back every write the closure made; returning `Ok`
/// commits them. Domain outcomes (as opposed to store faults) travel through
/// captured state, which lets a committing transaction still report a domain
/// error to its caller.
pub type TxnFn<'a> = Box<dyn FnOnce(&mut dyn StoreTxn) -> Result<(), StoreError> + Send + 'a>;

/// Atomic, transactional key-record store over stages, applies and sessions.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Persist a new stage. Fails with [`StoreError::Duplicate`] if the id
    /// is already taken.
    async fn create_stage(&self, stage: &Stage) -> Result<(), StoreError>;

    /// Load a stage by id.
    async fn stage(&self, id: &StageId) -> Result<Stage, StoreError>;

    /// Overwrite an existing stage.
    async fn update_stage(&self, stage: &Stage) -> Result<(), StoreError>;

    /// All pending stages, newest first (creation time descending, id
    /// descending as the tie-break). `None` lists across all sessions.
    async fn pending_stages(&self, session: Option<&SessionId>) -> Result<Vec<Stage>, StoreError>;

    /// Number of pending stages owned by a session.
    async fn pending_stage_count(&self, session: &SessionId) -> Result<u64, StoreError>;

    /// Bulk-flip every pending stage whose deadline precedes `cutoff` to
    /// `expired`, returning how many rows changed. Idempotent.
    async fn expire_stages_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Remove a stage by id. Removing an absent stage is not an error.
    async fn delete_stage(&self, id: &StageId) -> Result<(), StoreError>;

    /// Remove every applied stage owned by a session, returning the count.
    async fn delete_applied_stages(&self, session: &SessionId) -> Result<u64, StoreError>;

    /// Persist a new session.
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Load a session by id.
    async fn session(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Run `f` atomically: commit its writes when it returns `Ok`, discard
    /// them all when it returns `Err`.
    async fn transaction(&self, f: TxnFn<'_>) -> Result<(), StoreError>;
}
