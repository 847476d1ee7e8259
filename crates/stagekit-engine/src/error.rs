//! Error types for the staging engine
//!
//! The taxonomy distinguishes permanent failures (not found, already
//! applied) from timing ones (expired, cancelled) so that callers and
//! automated retries can tell them apart. Each variant maps to a stable
//! numeric code consumed by the protocol layer.

use chrono::{DateTime, Utc};
use stagekit_model::{StageId, StageStatus};
use stagekit_store::StoreError;

/// Stable protocol error codes.
///
/// The 10xxx range is shared with the wire layer; codes must never be
/// renumbered once released.
pub mod codes {
    /// Stage id unknown to persistence.
    pub const STAGE_NOT_FOUND: i32 = 10005;
    /// Apply attempted past the stage's TTL.
    pub const STAGE_EXPIRED: i32 = 10006;
    /// Apply attempted on a non-pending stage.
    pub const ALREADY_APPLIED: i32 = 10007;
    /// Persistence-layer failure.
    pub const STORE_FAILURE: i32 = 10008;
    /// Session stage or apply limit reached.
    pub const LIMIT_EXCEEDED: i32 = 10012;
    /// Async request aborted before a worker accepted it.
    pub const REQUEST_CANCELLED: i32 = 10013;
}

/// Errors surfaced by the staging engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No stage exists under the given id.
    #[error("stage not found: {0}")]
    NotFound(StageId),

    /// The stage is already in a terminal status.
    #[error("stage {id} already {status}")]
    AlreadyApplied {
        /// The stage that was targeted.
        id: StageId,
        /// Its observed terminal status.
        status: StageStatus,
    },

    /// The stage's TTL passed before it could be applied. The failed apply
    /// commits the `expired` status as a side effect.
    #[error("stage {id} expired at {expired_at}")]
    Expired {
        /// The stage that was targeted.
        id: StageId,
        /// The deadline that passed.
        expired_at: DateTime<Utc>,
    },

    /// The owning session already has too many pending stages.
    #[error("session stage limit exceeded: {pending} >= {limit}")]
    StageLimit {
        /// Pending stages currently owned by the session.
        pending: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The owning session already has too many applies.
    #[error("session apply limit exceeded: {applied} >= {limit}")]
    ApplyLimit {
        /// Applies already attributed to the session.
        applied: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// An async staging request was cancelled before any worker accepted it.
    #[error("staging request cancelled before acceptance")]
    Cancelled,

    /// The persistence layer failed.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable protocol code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => codes::STAGE_NOT_FOUND,
            Self::Expired { .. } => codes::STAGE_EXPIRED,
            Self::AlreadyApplied { .. } => codes::ALREADY_APPLIED,
            Self::StageLimit { .. } | Self::ApplyLimit { .. } => codes::LIMIT_EXCEEDED,
            Self::Cancelled => codes::REQUEST_CANCELLED,
            Self::Store(_) => codes::STORE_FAILURE,
        }
    }

    /// Whether retrying the same call later could succeed.
    ///
    /// Terminal-state errors are permanent; store faults and cancellations
    /// are timing failures.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Cancelled)
    }
}
