//! stagekit-model - Record types for the staging-and-apply engine
//!
//! Defines the three record kinds the engine operates on:
//! - [`Stage`]: a proposed, not-yet-committed transformation
//! - [`Apply`]: the immutable record of a committed stage
//! - [`Session`]: the caller-scoped accounting context
//!
//! plus their prefix-tagged identifiers and supporting enums. All types are
//! plain serde-serializable data; behavior lives in `stagekit-engine`.

#![warn(unreachable_pub)]

pub mod ids;
pub mod records;
pub mod stage;

// Re-exports for convenience
pub use ids::{ApplyId, SessionId, StageId};
pub use records::{Apply, Session, APPLIED_BY_AUTO, APPLIED_BY_MANUAL};
pub use stage::{ConfidenceLevel, OperationKind, Stage, StageStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
