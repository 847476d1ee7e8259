//! Apply and session records
//!
//! An [`Apply`] is the immutable proof that a stage was committed; a
//! [`Session`] is the caller-scoped accounting context the engine reads and
//! increments but never creates.

use crate::ids::{ApplyId, SessionId, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribution label for manually applied stages.
pub const APPLIED_BY_MANUAL: &str = "mcp";
/// Attribution label for automatically applied stages.
pub const APPLIED_BY_AUTO: &str = "auto";

/// Immutable record of a committed stage.
///
/// Created exactly once, inside the same transaction that flips the stage to
/// `applied`; never updated or deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apply {
    /// Unique id.
    pub id: ApplyId,
    /// The stage this record committed. At most one apply exists per stage.
    pub stage_id: StageId,
    /// Whether the apply was triggered automatically.
    pub auto_applied: bool,
    /// Attribution label: [`APPLIED_BY_AUTO`] or [`APPLIED_BY_MANUAL`].
    pub applied_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Apply {
    /// Create an apply record for `stage_id` with a fresh id.
    #[must_use]
    pub fn new(stage_id: StageId, auto_applied: bool) -> Self {
        let applied_by = if auto_applied {
            APPLIED_BY_AUTO
        } else {
            APPLIED_BY_MANUAL
        };
        Self {
            id: ApplyId::generate(),
            stage_id,
            auto_applied,
            applied_by: applied_by.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Caller-scoped accounting context.
///
/// Owned and created by the protocol layer; the engine only reads session
/// rows and bumps `applies_count` on successful applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique id.
    pub id: SessionId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended, if it has.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Number of stages created under this session.
    #[serde(default)]
    pub stages_count: u64,
    /// Number of successful applies attributed to this session.
    #[serde(default)]
    pub applies_count: u64,
}

impl Session {
    /// Create an open session with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            started_at: Utc::now(),
            ended_at: None,
            stages_count: 0,
            applies_count: 0,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
