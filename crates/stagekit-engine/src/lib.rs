//! stagekit-engine - Staging-and-apply engine
//!
//! The part of a code-transformation service that moves a proposed edit
//! safely from "proposed" to "committed or discarded" under concurrent
//! load:
//! - [`StagingEngine`]: transactional stage lifecycle (create, apply,
//!   expire, list)
//! - [`AsyncStagingEngine`]: bounded worker pool with backpressure and
//!   synchronous fallback
//! - [`StagingSummary`]: throughput metrics from the aggregation loop
//! - [`paginate`]: cursor pagination for listing callers
//!
//! # Example
//!
//! ```rust,ignore
//! use stagekit_engine::{AsyncStagingEngine, EngineConfig};
//! use stagekit_model::{OperationKind, Stage};
//! use stagekit_store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let front = AsyncStagingEngine::new(Arc::new(MemoryStore::new()), EngineConfig::new());
//!
//! let stage = Stage::new("rust", OperationKind::Replace, "function", "handler");
//! let stage = front.create_stage_async(stage).await.wait().await?;
//!
//! let apply = front.lifecycle().apply_stage(&stage.id, false).await?;
//! println!("applied as {}", apply.id);
//! front.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod error;
pub mod front;
pub mod lifecycle;
pub mod metrics;
pub mod pagination;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{codes, EngineError};
pub use front::{AsyncStagingEngine, StageHandle};
pub use lifecycle::StagingEngine;
pub use metrics::StagingSummary;
pub use pagination::{paginate, PageError, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the staging engine
    pub use crate::{
        AsyncStagingEngine, EngineConfig, EngineError, StageHandle, StagingEngine, StagingSummary,
    };
    pub use stagekit_model::{
        Apply, ConfidenceLevel, OperationKind, SessionId, Stage, StageId, StageStatus,
    };
    pub use stagekit_store::{MemoryStore, RecordStore};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
