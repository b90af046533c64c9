//! Lifecycle orchestration around batch persistence.
//!
//! # Responsibility
//! - Dispatch save-action events to rules, approvals and business logics.
//! - Drive whole object graphs through those events and the batch repository.

pub mod dispatcher;
pub mod repository_service;

pub use dispatcher::{BasePersistenceHook, LifecycleDispatcher, SaveActionHook};
pub use repository_service::BoRepositoryService;
