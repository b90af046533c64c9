//! Business-logic contracts and the per-transaction logic chain.
//!
//! # Responsibility
//! - Define forward/reverse logic bodies and how they are looked up.
//! - Provide the chain that accumulates logic state for one transaction.
//! - Provide the registry that owns chains by transaction id.
//!
//! # Invariants
//! - A chain lives at most as long as its transaction.
//! - Logic bodies only mutate chain state; persistence goes through
//!   `LogicChain::commit`.

use crate::model::business_object::BusinessObject;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod chain;
pub mod registry;

pub use chain::{lock_chain, LogicChain, LogicState};
pub use registry::{LogicChainRegistry, LogicManager};

/// Failure raised by one logic body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("business logic `{logic}` failed on {object}: {message}")]
pub struct LogicError {
    pub logic: String,
    pub object: String,
    pub message: String,
}

impl LogicError {
    pub fn new(logic: impl Into<String>, bo: &BusinessObject, message: impl Into<String>) -> Self {
        Self {
            logic: logic.into(),
            object: bo.to_string(),
            message: message.into(),
        }
    }
}

/// One reversible piece of business logic.
///
/// `forward` applies the effect of the trigger object onto logic targets;
/// `reverse` takes it back (before updates and deletes).
pub trait BusinessLogic: Send + Sync {
    fn name(&self) -> &str;

    fn forward(&self, trigger: &BusinessObject, state: &mut LogicState) -> Result<(), LogicError>;

    fn reverse(&self, trigger: &BusinessObject, state: &mut LogicState) -> Result<(), LogicError>;
}

/// Looks up the logics that apply to one object.
pub trait LogicsProvider: Send + Sync {
    fn logics_for(&self, bo: &BusinessObject) -> Vec<Arc<dyn BusinessLogic>>;
}

/// In-process logic lookup keyed by object code.
#[derive(Default)]
pub struct LogicsRegistry {
    logics: HashMap<String, Vec<Arc<dyn BusinessLogic>>>,
}

impl LogicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one logic for an object code; forward runs in registration order,
    /// reverse in the opposite order.
    pub fn register(&mut self, object_code: impl Into<String>, logic: Arc<dyn BusinessLogic>) {
        self.logics.entry(object_code.into()).or_default().push(logic);
    }
}

impl LogicsProvider for LogicsRegistry {
    fn logics_for(&self, bo: &BusinessObject) -> Vec<Arc<dyn BusinessLogic>> {
        self.logics
            .get(bo.object_code())
            .cloned()
            .unwrap_or_default()
    }
}
