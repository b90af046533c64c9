//! Logic chains keyed by transaction id.
//!
//! # Responsibility
//! - Create, share and remove logic chains for concurrent transactions.
//! - Drop any chain left behind when its transaction ends.
//!
//! # Invariants
//! - At most one chain exists per transaction id.
//! - Poisoned locks are recovered; a panicking logic body never wedges the registry.

use super::chain::LogicChain;
use super::LogicsProvider;
use crate::repo::{TransactionListener, TransactionOutcome};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Chain lifecycle operations used by the lifecycle dispatcher.
pub trait LogicManager: Send + Sync {
    fn get_chain(&self, transaction_id: &str) -> Option<Arc<Mutex<LogicChain>>>;

    /// Returns the chain for `transaction_id`, creating it when absent.
    fn register_chain(&self, transaction_id: &str) -> Arc<Mutex<LogicChain>>;

    /// Removes the chain; returns whether one was registered.
    fn close_chain(&self, transaction_id: &str) -> bool;
}

/// Shared, thread-safe chain registry.
pub struct LogicChainRegistry {
    provider: Arc<dyn LogicsProvider>,
    chains: Mutex<HashMap<String, Arc<Mutex<LogicChain>>>>,
}

impl LogicChainRegistry {
    pub fn new(provider: Arc<dyn LogicsProvider>) -> Self {
        Self {
            provider,
            chains: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_chains().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_chains().is_empty()
    }

    fn lock_chains(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<LogicChain>>>> {
        self.chains.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogicManager for LogicChainRegistry {
    fn get_chain(&self, transaction_id: &str) -> Option<Arc<Mutex<LogicChain>>> {
        self.lock_chains().get(transaction_id).cloned()
    }

    fn register_chain(&self, transaction_id: &str) -> Arc<Mutex<LogicChain>> {
        let mut chains = self.lock_chains();
        chains
            .entry(transaction_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LogicChain::new(
                    transaction_id,
                    Arc::clone(&self.provider),
                )))
            })
            .clone()
    }

    fn close_chain(&self, transaction_id: &str) -> bool {
        self.lock_chains().remove(transaction_id).is_some()
    }
}

impl TransactionListener for LogicChainRegistry {
    fn on_transaction_end(&self, transaction_id: &str, outcome: TransactionOutcome) {
        if self.close_chain(transaction_id) {
            info!(
                "event=logic_chain_removed module=logic status=ok transaction_id={} reason=transaction_end outcome={:?}",
                transaction_id, outcome
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogicChainRegistry, LogicManager};
    use crate::logic::LogicsRegistry;
    use crate::repo::{TransactionListener, TransactionOutcome};
    use std::sync::Arc;

    fn registry() -> LogicChainRegistry {
        LogicChainRegistry::new(Arc::new(LogicsRegistry::new()))
    }

    #[test]
    fn register_returns_the_same_chain_for_one_transaction() {
        let registry = registry();
        let first = registry.register_chain("tx-1");
        let second = registry.register_chain("tx-1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        registry.register_chain("tx-2");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn transaction_end_closes_chain() {
        let registry = registry();
        registry.register_chain("tx-1");
        registry.on_transaction_end("tx-1", TransactionOutcome::RolledBack);
        assert!(registry.get_chain("tx-1").is_none());
        assert!(!registry.close_chain("tx-1"));
    }
}
