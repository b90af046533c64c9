//! Batch persistence layer.
//!
//! # Responsibility
//! - Plan object graphs into ordered statement batches.
//! - Execute batches atomically under an owned or inherited transaction.
//! - Isolate SQLite connection handling from lifecycle orchestration.
//!
//! # Invariants
//! - Everything in the core propagates `RepoResult`; `OperationResult` is only
//!   produced by the legacy-style `save`/`save_ex` entry points.

pub mod batch;
pub mod command;
pub mod error;
pub mod planner;
pub mod result;

pub(crate) use batch::UnkeyedNodes;
pub use batch::{BoRepository, DbSource, TransactionListener, TransactionOutcome};
pub use command::DbCommand;
pub use error::{RepoError, RepoResult};
pub use planner::plan_save;
pub use result::OperationResult;
