//! Repository service driving one object graph through its full lifecycle.
//!
//! # Responsibility
//! - Fire before-phase events, save the graph, then fire after-phase events,
//!   all inside one owned or inherited transaction.
//! - Wire the hook's transaction listener to the repository.
//!
//! # Invariants
//! - Before-phase events run pre-order (parent first); after-phase events run
//!   post-order, so a root's terminal event is the last one fired.
//! - Objects are marked old only after their transaction work succeeded.

use super::dispatcher::{LifecycleDispatcher, SaveActionHook};
use crate::model::business_object::BusinessObject;
use crate::model::save_action::SaveActionType;
use crate::repo::{BoRepository, OperationResult, RepoError, RepoResult, UnkeyedNodes};
use log::warn;
use std::sync::Arc;

pub struct BoRepositoryService {
    repository: BoRepository,
    hook: Arc<dyn SaveActionHook>,
}

impl BoRepositoryService {
    pub fn new(repository: BoRepository, dispatcher: LifecycleDispatcher) -> Self {
        Self::with_hook(repository, Arc::new(dispatcher))
    }

    /// Builds a service around any hook; the hook's transaction listener, if
    /// it has one, is registered with `repository`.
    pub fn with_hook(mut repository: BoRepository, hook: Arc<dyn SaveActionHook>) -> Self {
        if let Some(listener) = hook.transaction_listener() {
            repository.add_transaction_listener(listener);
        }
        Self { repository, hook }
    }

    pub fn repository(&self) -> &BoRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut BoRepository {
        &mut self.repository
    }

    /// Saves one graph with lifecycle processing.
    ///
    /// Returns `false` when the root had nothing to persist.
    pub fn save(&mut self, bo: &mut BusinessObject) -> RepoResult<bool> {
        if !bo.is_persistable() {
            return Ok(false);
        }
        let unkeyed = self.capture_if_owned(std::slice::from_ref(bo));
        if let Err(err) = self.with_transaction(|service| service.save_graph(bo)) {
            if let Some(unkeyed) = unkeyed {
                unkeyed.release(std::slice::from_mut(bo));
            }
            return Err(err);
        }
        bo.mark_old();
        Ok(true)
    }

    /// Saves every persistable root inside one transaction.
    ///
    /// The first failure rolls back all roots when the transaction is owned here.
    pub fn save_all(&mut self, roots: &mut [BusinessObject]) -> OperationResult<BusinessObject> {
        let unkeyed = self.capture_if_owned(roots);
        let outcome = self.with_transaction(|service| {
            let mut saved = vec![false; roots.len()];
            for (index, bo) in roots.iter_mut().enumerate() {
                if bo.is_persistable() {
                    service.save_graph(bo)?;
                    saved[index] = true;
                }
            }
            Ok(saved)
        });
        if let (Err(_), Some(unkeyed)) = (&outcome, &unkeyed) {
            unkeyed.release(roots);
        }
        outcome
            .map(|saved| {
                roots
                    .iter_mut()
                    .zip(saved)
                    .filter(|(_, was_saved)| *was_saved)
                    .map(|(bo, _)| {
                        bo.mark_old();
                        bo.clone()
                    })
                    .collect()
            })
            .into()
    }

    fn save_graph(&mut self, bo: &mut BusinessObject) -> RepoResult<()> {
        fire_before(self.hook.as_ref(), bo, &mut self.repository)?;
        self.repository
            .save_batch(std::slice::from_mut(bo), true)?;
        fire_after(self.hook.as_ref(), bo, &mut self.repository)
    }

    /// Records unkeyed objects when the save will own its transaction; keys
    /// allocated inside it are dropped again if it rolls back.
    fn capture_if_owned(&self, roots: &[BusinessObject]) -> Option<UnkeyedNodes> {
        (!self.repository.in_transaction()).then(|| UnkeyedNodes::capture(roots))
    }

    fn with_transaction<T>(
        &mut self,
        work: impl FnOnce(&mut Self) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let opened_connection = self.repository.open_db_connection()?;
        let opened_transaction = match self.repository.begin_transaction() {
            Ok(opened) => opened,
            Err(err) => {
                if opened_connection {
                    self.repository.close_db_connection();
                }
                return Err(err);
            }
        };

        let outcome = match work(self) {
            Ok(value) if opened_transaction => self.repository.commit_transaction().map(|()| value),
            Ok(value) => Ok(value),
            Err(err) => {
                if opened_transaction {
                    if let Err(rollback_err) = self.repository.rollback_transaction() {
                        warn!(
                            "event=service_save module=service status=rollback_failed error_code={} error={}",
                            rollback_err.code(),
                            rollback_err
                        );
                    }
                }
                Err(err)
            }
        };
        if opened_connection {
            self.repository.close_db_connection();
        }
        outcome
    }
}

fn fire_before(
    hook: &dyn SaveActionHook,
    bo: &mut BusinessObject,
    repository: &mut BoRepository,
) -> RepoResult<()> {
    if !bo.is_persistable() {
        return Ok(());
    }
    let action = SaveActionType::before_for(bo);
    if !hook.on_save_action(action, bo, repository)? {
        return Err(RepoError::InvalidInput(format!(
            "{action} event rejected save of {bo}"
        )));
    }
    for child in bo.savable_children_mut() {
        fire_before(hook, child, repository)?;
    }
    Ok(())
}

fn fire_after(
    hook: &dyn SaveActionHook,
    bo: &mut BusinessObject,
    repository: &mut BoRepository,
) -> RepoResult<()> {
    if !bo.is_persistable() {
        return Ok(());
    }
    for child in bo.savable_children_mut() {
        fire_after(hook, child, repository)?;
    }
    let action = SaveActionType::after_for(bo);
    hook.on_save_action(action, bo, repository)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::BoRepositoryService;
    use crate::config::RepositoryConfig;
    use crate::model::business_object::BusinessObject;
    use crate::repo::{BoRepository, DbSource};
    use crate::service::dispatcher::BasePersistenceHook;
    use std::sync::Arc;

    #[test]
    fn clean_root_is_not_saved() {
        let repo = BoRepository::new(DbSource::Memory, &RepositoryConfig::default());
        let mut service = BoRepositoryService::with_hook(repo, Arc::new(BasePersistenceHook));
        let mut bo = BusinessObject::existing("Item", 1);
        assert!(!service.save(&mut bo).expect("no-op save"));
        assert!(!service.repository().is_connected());
    }

    #[test]
    fn save_marks_graph_old_and_releases_owned_context() {
        let repo = BoRepository::new(DbSource::Memory, &RepositoryConfig::default());
        let mut service = BoRepositoryService::with_hook(repo, Arc::new(BasePersistenceHook));
        let mut order = BusinessObject::new("SalesOrder");
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));

        assert!(service.save(&mut order).expect("save succeeds"));
        assert!(!order.is_new());
        assert!(order.savable_children().all(|line| !line.is_dirty()));
        assert!(!service.repository().in_transaction());
        assert!(!service.repository().is_connected());
    }
}
