//! Prefix-tagged record identifiers
//!
//! Every record kind carries an opaque string identifier tagged with a short
//! prefix (`stg_`, `apl_`, `ses_`) so that ids remain self-describing in logs
//! and protocol payloads. The payload after the prefix is a ULID, which keeps
//! ids of one kind lexicographically sortable by creation time.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a staged transformation (`stg_…`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Generate a fresh stage id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("stg_{}", Ulid::new().to_string().to_lowercase()))
    }

    /// View the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has been assigned yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for StageId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an apply record (`apl_…`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplyId(String);

impl ApplyId {
    /// Generate a fresh apply id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("apl_{}", Ulid::new().to_string().to_lowercase()))
    }

    /// View the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ApplyId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ApplyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a caller session (`ses_…`).
///
/// Sessions are created by the protocol layer; the engine only references
/// them for scoping and accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ses_{}", Ulid::new().to_string().to_lowercase()))
    }

    /// View the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
