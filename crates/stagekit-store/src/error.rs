//! Error types for the persistence contract

/// Errors surfaced by [`RecordStore`](crate::RecordStore) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists under the given id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The backend failed (connectivity, transaction machinery, corruption).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error reports a missing record rather than a fault.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(StoreError::NotFound("stg_x".into()).is_not_found());
        assert!(!StoreError::Backend("disk full".into()).is_not_found());
    }

    #[test]
    fn display_includes_id() {
        let err = StoreError::Duplicate("apl_1".into());
        assert!(err.to_string().contains("apl_1"));
    }
}
