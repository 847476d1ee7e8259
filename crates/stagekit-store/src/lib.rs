//! stagekit-store - Persistence contract for the staging-and-apply engine
//!
//! The engine reaches durable state exclusively through the [`RecordStore`]
//! trait defined here: create/read/update operations over stage, apply and
//! session records, plus all-or-nothing transactions through [`StoreTxn`].
//!
//! [`MemoryStore`] is the bundled reference implementation; database-backed
//! stores implement the same trait out of tree.

#![warn(unreachable_pub)]

pub mod contract;
pub mod error;
pub mod memory;

// Re-exports for convenience
pub use contract::{RecordStore, StoreTxn, TxnFn};
pub use error::StoreError;
pub use memory::MemoryStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
