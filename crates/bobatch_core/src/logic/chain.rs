//! Logic chain scoped to one transaction.
//!
//! # Invariants
//! - `trigger` is the instance that created the chain; only that instance's
//!   terminal event tears the chain down on success.
//! - Targets are keyed by string and kept in first-touch order.
//! - Once bound, targets are only committed through a repository with the same sign.

use super::{LogicError, LogicsProvider};
use crate::model::business_object::{BusinessObject, InstanceId};
use crate::repo::{BoRepository, RepoError, RepoResult};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Objects touched by logic bodies during one transaction.
#[derive(Debug, Default)]
pub struct LogicState {
    targets: Vec<BusinessObject>,
    index: BTreeMap<String, usize>,
}

impl LogicState {
    pub fn target(&self, key: &str) -> Option<&BusinessObject> {
        self.index.get(key).map(|position| &self.targets[*position])
    }

    pub fn target_mut(&mut self, key: &str) -> Option<&mut BusinessObject> {
        let position = *self.index.get(key)?;
        self.targets.get_mut(position)
    }

    /// Returns the target under `key`, creating it on first use.
    pub fn target_or_insert_with(
        &mut self,
        key: &str,
        create: impl FnOnce() -> BusinessObject,
    ) -> &mut BusinessObject {
        let position = match self.index.get(key) {
            Some(position) => *position,
            None => {
                self.targets.push(create());
                let position = self.targets.len() - 1;
                self.index.insert(key.to_string(), position);
                position
            }
        };
        &mut self.targets[position]
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn targets_mut(&mut self) -> &mut [BusinessObject] {
        &mut self.targets
    }
}

/// Forward/reverse logic accumulated for one transaction id.
pub struct LogicChain {
    transaction_id: String,
    trigger: Option<InstanceId>,
    repository_sign: Option<String>,
    provider: Arc<dyn LogicsProvider>,
    state: LogicState,
}

impl LogicChain {
    pub fn new(transaction_id: impl Into<String>, provider: Arc<dyn LogicsProvider>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            trigger: None,
            repository_sign: None,
            provider,
            state: LogicState::default(),
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn trigger(&self) -> Option<InstanceId> {
        self.trigger
    }

    pub fn set_trigger(&mut self, trigger: &BusinessObject) {
        self.trigger = Some(trigger.instance_id());
    }

    /// Binds the chain to the repository whose transaction it belongs to.
    pub fn use_repository(&mut self, repository: &BoRepository) {
        self.repository_sign = Some(repository.sign().to_string());
    }

    /// Runs every applicable logic forward, in registration order.
    pub fn forward_logics(&mut self, trigger: &BusinessObject) -> Result<usize, LogicError> {
        let logics = self.provider.logics_for(trigger);
        for logic in &logics {
            logic.forward(trigger, &mut self.state)?;
        }
        Ok(logics.len())
    }

    /// Runs every applicable logic in reverse, last registered first.
    pub fn reverse_logics(&mut self, trigger: &BusinessObject) -> Result<usize, LogicError> {
        let logics = self.provider.logics_for(trigger);
        for logic in logics.iter().rev() {
            logic.reverse(trigger, &mut self.state)?;
        }
        Ok(logics.len())
    }

    /// Persists dirty targets inside the repository's open transaction.
    ///
    /// Returns the number of targets written.
    ///
    /// # Errors
    /// - `InvalidInput` when `repository` is not the one the chain is bound to.
    pub fn commit(&mut self, repository: &mut BoRepository) -> RepoResult<usize> {
        if let Some(sign) = &self.repository_sign {
            if sign != repository.sign() {
                return Err(RepoError::InvalidInput(format!(
                    "logic chain {} is bound to repository {sign}, not {}",
                    self.transaction_id,
                    repository.sign()
                )));
            }
        }
        let targets = self.state.targets_mut();
        if !targets.iter().any(BusinessObject::is_persistable) {
            return Ok(0);
        }
        let saved = repository.save_batch(targets, true)?;
        let written = saved.len();
        for target in saved {
            target.mark_old();
        }
        debug!(
            "event=logic_chain_commit module=logic status=ok transaction_id={} targets={}",
            self.transaction_id, written
        );
        Ok(written)
    }
}

/// Locks one chain, recovering the guard if a previous holder panicked.
pub fn lock_chain(chain: &Mutex<LogicChain>) -> MutexGuard<'_, LogicChain> {
    chain.lock().unwrap_or_else(PoisonError::into_inner)
}
