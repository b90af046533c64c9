//! Lifecycle event dispatcher.
//!
//! # Responsibility
//! - React to each save-action phase of one object: referenced-object guard,
//!   rule check, approval trigger, logic chain step, base hook.
//! - Create, reuse and tear down the transaction's logic chain.
//!
//! # Invariants
//! - Steps run in a fixed order and the first failure stops the event.
//! - Logic steps require an active transaction; the chain is keyed by its id.
//! - A failing logic step always removes the chain before the error propagates.

use crate::approval::{trigger_approvals, ApprovalManager, NoApprovalManager, User};
use crate::logic::{lock_chain, LogicChain, LogicManager};
use crate::model::business_object::BusinessObject;
use crate::model::save_action::SaveActionType;
use crate::repo::{BoRepository, RepoError, RepoResult, TransactionListener};
use crate::rules::{RulesEngine, RulesRegistry};
use log::{info, warn};
use std::sync::Arc;

/// Hook invoked for every save-action phase of one object.
pub trait SaveActionHook: Send + Sync {
    fn on_save_action(
        &self,
        action: SaveActionType,
        trigger: &mut BusinessObject,
        repository: &mut BoRepository,
    ) -> RepoResult<bool>;

    /// Listener the owning repository must notify when a transaction ends.
    fn transaction_listener(&self) -> Option<Arc<dyn TransactionListener>> {
        None
    }
}

/// Terminal hook accepting every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasePersistenceHook;

impl SaveActionHook for BasePersistenceHook {
    fn on_save_action(
        &self,
        _action: SaveActionType,
        _trigger: &mut BusinessObject,
        _repository: &mut BoRepository,
    ) -> RepoResult<bool> {
        Ok(true)
    }
}

/// Hook running rules, approvals and business logics around persistence.
///
/// Feature switches are read from the repository's configuration.
pub struct LifecycleDispatcher {
    user: User,
    rules: Arc<dyn RulesEngine>,
    approvals: Arc<dyn ApprovalManager>,
    logics: Arc<dyn LogicManager>,
    chain_closer: Arc<dyn TransactionListener>,
    base: Arc<dyn SaveActionHook>,
}

impl LifecycleDispatcher {
    /// `logics` also closes chains left open when their transaction ends.
    pub fn new<M>(logics: Arc<M>) -> Self
    where
        M: LogicManager + TransactionListener + 'static,
    {
        Self {
            user: User::default(),
            rules: Arc::new(RulesRegistry::new()),
            approvals: Arc::new(NoApprovalManager),
            logics: logics.clone(),
            chain_closer: logics,
            base: Arc::new(BasePersistenceHook),
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    pub fn with_rules(mut self, rules: Arc<dyn RulesEngine>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalManager>) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn with_base_hook(mut self, base: Arc<dyn SaveActionHook>) -> Self {
        self.base = base;
        self
    }

    fn check_rules(&self, bo: &mut BusinessObject) -> RepoResult<()> {
        if let Some(rules) = self.rules.rules_for(bo.object_code()) {
            rules.execute(bo)?;
        }
        if let Some(self_check) = bo.capabilities.self_check {
            self_check(bo)?;
        }
        Ok(())
    }

    fn run_logics(
        &self,
        action: SaveActionType,
        bo: &mut BusinessObject,
        repository: &mut BoRepository,
    ) -> RepoResult<()> {
        let transaction_id = repository
            .transaction_id()
            .map(str::to_string)
            .ok_or(RepoError::NoActiveTransaction)?;

        let chain = match self.logics.get_chain(&transaction_id) {
            Some(chain) => chain,
            None => {
                let chain = self.logics.register_chain(&transaction_id);
                {
                    let mut guard = lock_chain(&chain);
                    guard.use_repository(repository);
                    guard.set_trigger(bo);
                }
                info!(
                    "event=logic_chain_created module=logic status=ok transaction_id={} trigger={}",
                    transaction_id, bo
                );
                chain
            }
        };

        let step = {
            let mut guard = lock_chain(&chain);
            run_step(&mut guard, action, bo, repository)
        };
        if let Err(err) = step {
            self.logics.close_chain(&transaction_id);
            warn!(
                "event=logic_chain_removed module=logic status=error transaction_id={} action={} error_code={} error={}",
                transaction_id,
                action,
                err.code(),
                err
            );
            return Err(err);
        }

        if action.is_terminal() && lock_chain(&chain).trigger() == Some(bo.instance_id()) {
            self.logics.close_chain(&transaction_id);
            info!(
                "event=logic_chain_removed module=logic status=ok transaction_id={} reason=done",
                transaction_id
            );
        }
        Ok(())
    }
}

impl SaveActionHook for LifecycleDispatcher {
    fn on_save_action(
        &self,
        action: SaveActionType,
        trigger: &mut BusinessObject,
        repository: &mut BoRepository,
    ) -> RepoResult<bool> {
        let config = *repository.config();

        if action == SaveActionType::BeforeDeleting && trigger.capabilities.referenced == Some(true)
        {
            return Err(RepoError::NotAllowedDelete(trigger.to_string()));
        }
        if action.is_before() {
            if config.check_rules {
                self.check_rules(trigger)?;
            }
            if config.check_approval_process {
                trigger_approvals(self.approvals.as_ref(), &self.user, trigger, repository)?;
            }
        }
        if action != SaveActionType::BeforeAdding && config.check_logics {
            self.run_logics(action, trigger, repository)?;
        }
        self.base.on_save_action(action, trigger, repository)
    }

    fn transaction_listener(&self) -> Option<Arc<dyn TransactionListener>> {
        Some(self.chain_closer.clone())
    }
}

fn run_step(
    chain: &mut LogicChain,
    action: SaveActionType,
    bo: &BusinessObject,
    repository: &mut BoRepository,
) -> RepoResult<()> {
    match action {
        SaveActionType::Added | SaveActionType::Updated => {
            chain.forward_logics(bo)?;
            chain.commit(repository)?;
        }
        SaveActionType::BeforeDeleting => {
            chain.reverse_logics(bo)?;
            chain.commit(repository)?;
        }
        SaveActionType::BeforeUpdating => {
            chain.reverse_logics(bo)?;
        }
        SaveActionType::BeforeAdding | SaveActionType::Deleted => {}
    }
    Ok(())
}
