//! Staged transformations
//!
//! A [`Stage`] is a proposed, not-yet-committed code transformation. It is
//! born `pending` and reaches exactly one terminal status: `applied` on a
//! successful apply, or `expired` once its TTL has passed.

use crate::ids::{SessionId, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stage.
///
/// Valid transitions are `pending → applied` and `pending → expired`; a stage
/// observed in a terminal status never changes again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Awaiting application or expiry.
    #[default]
    Pending,
    /// Successfully committed (terminal).
    Applied,
    /// Timed out before application (terminal).
    Expired,
}

impl StageStatus {
    /// Whether the status admits no further transitions.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Expired)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Applied => write!(f, "applied"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Kind of transformation an operation performs on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read-only match, staged for inspection.
    Query,
    /// Replace the target with new content.
    Replace,
    /// Remove the target.
    Delete,
    /// Insert new content before or after the target.
    Insert,
    /// Append content at the end of the enclosing scope.
    Append,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Replace => write!(f, "replace"),
            Self::Delete => write!(f, "delete"),
            Self::Insert => write!(f, "insert"),
            Self::Append => write!(f, "append"),
        }
    }
}

/// Categorical confidence signal attached to a stage by its producer.
///
/// Consumed by policy outside the engine (e.g. auto-apply thresholds); the
/// engine stores it verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Transformation is very likely safe.
    High,
    /// Transformation should be reviewed.
    #[default]
    Medium,
    /// Transformation is risky.
    Low,
}

/// A proposed, not-yet-committed transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Unique id, assigned by the engine when empty.
    #[serde(default)]
    pub id: StageId,
    /// Owning session, when the caller is session-scoped.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Source language of the target code.
    pub language: String,
    /// What the transformation does.
    pub operation: OperationKind,
    /// Kind of node targeted (function, struct, class, …).
    pub target_type: String,
    /// Name pattern of the target.
    pub target_name: String,
    /// Human-readable diff of the proposed change.
    #[serde(default)]
    pub diff: String,
    /// Numeric confidence in `0.0..=1.0`.
    pub confidence_score: f64,
    /// Categorical confidence level.
    pub confidence_level: ConfidenceLevel,
    /// Lifecycle status; engine-controlled.
    #[serde(default)]
    pub status: StageStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry deadline, stamped at creation as `created_at + TTL`.
    ///
    /// `None` only before the engine has persisted the stage; callers may
    /// pre-set it to override the configured TTL.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// When the stage was applied, for terminal `applied` stages.
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Stage {
    /// Create a pending stage with a fresh id and creation timestamp.
    #[must_use]
    pub fn new(
        language: impl Into<String>,
        operation: OperationKind,
        target_type: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            id: StageId::generate(),
            session_id: None,
            language: language.into(),
            operation,
            target_type: target_type.into(),
            target_name: target_name.into(),
            diff: String::new(),
            confidence_score: 0.0,
            confidence_level: ConfidenceLevel::default(),
            status: StageStatus::Pending,
            created_at: Utc::now(),
            expires_at: None,
            applied_at: None,
        }
    }

    /// Scope the stage to a session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach the rendered diff.
    #[inline]
    #[must_use]
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = diff.into();
        self
    }

    /// Attach confidence scoring. The score is clamped to `0.0..=1.0`.
    #[inline]
    #[must_use]
    pub fn with_confidence(mut self, level: ConfidenceLevel, score: f64) -> Self {
        self.confidence_level = level;
        self.confidence_score = score.clamp(0.0, 1.0);
        self
    }

    /// Whether the stage's deadline has passed as of `now`.
    ///
    /// A stage without a stamped deadline is never considered expired.
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_stage_is_pending() {
        let stage = Stage::new("rust", OperationKind::Replace, "function", "parse");
        assert_eq!(stage.status, StageStatus::Pending);
        assert!(stage.id.as_str().starts_with("stg_"));
        assert!(stage.expires_at.is_none());
        assert!(stage.applied_at.is_none());
    }

    #[test]
    fn builder_attaches_metadata() {
        let session = SessionId::generate();
        let stage = Stage::new("go", OperationKind::Delete, "function", "legacyHandler")
            .with_session(session.clone())
            .with_diff("- func legacyHandler() {}")
            .with_confidence(ConfidenceLevel::High, 0.95);

        assert_eq!(stage.session_id, Some(session));
        assert_eq!(stage.confidence_level, ConfidenceLevel::High);
        assert_eq!(stage.confidence_score, 0.95);
    }

    #[test]
    fn confidence_score_is_clamped() {
        let stage = Stage::new("rust", OperationKind::Insert, "struct", "Config")
            .with_confidence(ConfidenceLevel::Low, 1.7);
        assert_eq!(stage.confidence_score, 1.0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(StageStatus::Applied.is_terminal());
        assert!(StageStatus::Expired.is_terminal());
    }

    #[test]
    fn expiry_check_uses_deadline() {
        let mut stage = Stage::new("rust", OperationKind::Replace, "function", "run");
        let now = Utc::now();
        assert!(!stage.is_expired_at(now));

        stage.expires_at = Some(now - Duration::minutes(1));
        assert!(stage.is_expired_at(now));

        stage.expires_at = Some(now + Duration::minutes(1));
        assert!(!stage.is_expired_at(now));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&StageStatus::Applied).unwrap();
        assert_eq!(json, "\"applied\"");
    }
}
