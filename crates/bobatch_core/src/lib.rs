//! Business-object graph batch persistence with lifecycle logic.
//! Saves object graphs atomically and runs rules, approvals and per-transaction
//! business logic around each save.

pub mod adapter;
pub mod approval;
pub mod config;
pub mod db;
pub mod logging;
pub mod logic;
pub mod model;
pub mod repo;
pub mod rules;
pub mod service;

pub use adapter::{BoAdapter, KeysManager, SqliteBoAdapter, SqliteKeysManager};
pub use approval::{ApprovalManager, ApprovalProcess, NoApprovalManager, User};
pub use config::{ConfigError, RepositoryConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use logic::{
    BusinessLogic, LogicChain, LogicChainRegistry, LogicError, LogicManager, LogicState,
    LogicsProvider, LogicsRegistry,
};
pub use model::business_object::{BusinessObject, Capabilities, FieldValue, InstanceId};
pub use model::save_action::SaveActionType;
pub use model::statement::{SqlStatement, StatementKind, TransactionType};
pub use repo::{
    plan_save, BoRepository, DbSource, OperationResult, RepoError, RepoResult,
    TransactionListener, TransactionOutcome,
};
pub use rules::{BusinessRules, RequiredFieldsRule, RuleViolation, RulesEngine, RulesRegistry};
pub use service::{BasePersistenceHook, BoRepositoryService, LifecycleDispatcher, SaveActionHook};

/// Minimal health-check API for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
