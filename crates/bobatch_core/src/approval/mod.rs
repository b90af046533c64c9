//! Approval-process collaborators and the approval trigger.
//!
//! # Responsibility
//! - Define the approval manager/process seams consulted before a save.
//! - Cancel running processes when their data is deleted or canceled.
//!
//! # Invariants
//! - Processes are saved through the caller's repository, inside the
//!   transaction that saves the data they approve.
//! - The approval workflow's own state machine lives outside this crate.

use crate::model::business_object::BusinessObject;
use crate::repo::{BoRepository, RepoResult};
use log::info;

/// User on whose behalf lifecycle processing runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub id: i64,
    pub code: String,
    pub token: String,
}

impl User {
    pub fn new(id: i64, code: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            token: token.into(),
        }
    }
}

/// One approval process instance bound to a business object.
pub trait ApprovalProcess {
    fn is_new(&self) -> bool;

    /// Fails with `RepoError::ApprovalAuthorization` when `user` may not save
    /// changes to the approved data.
    fn check_to_save(&self, user: &User) -> RepoResult<()>;

    fn cancel(&mut self, token: &str, reason: &str) -> RepoResult<()>;

    fn save(&mut self, repository: &mut BoRepository) -> RepoResult<()>;
}

/// Creates or loads the approval process for an object.
pub trait ApprovalManager: Send + Sync {
    fn check_process(
        &self,
        bo: &mut BusinessObject,
        repository: &mut BoRepository,
    ) -> RepoResult<Option<Box<dyn ApprovalProcess>>>;
}

/// Manager that never starts a process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoApprovalManager;

impl ApprovalManager for NoApprovalManager {
    fn check_process(
        &self,
        _bo: &mut BusinessObject,
        _repository: &mut BoRepository,
    ) -> RepoResult<Option<Box<dyn ApprovalProcess>>> {
        Ok(None)
    }
}

/// Runs approval processing for one object before it is written.
pub fn trigger_approvals(
    manager: &dyn ApprovalManager,
    user: &User,
    bo: &mut BusinessObject,
    repository: &mut BoRepository,
) -> RepoResult<()> {
    if !bo.capabilities.approval_data {
        return Ok(());
    }
    let Some(mut process) = manager.check_process(bo, repository)? else {
        return Ok(());
    };

    if !bo.is_new() && !process.is_new() {
        process.check_to_save(user)?;
        if should_cancel(bo) {
            process.cancel(&user.token, "approval data was deleted by user")?;
            info!(
                "event=approval_canceled module=approval status=ok object={} user={}",
                bo, user.code
            );
        }
    }
    process.save(repository)
}

/// Deleted data always cancels; otherwise the tag-deleted flag wins over the
/// tag-canceled flag when the object carries it.
fn should_cancel(bo: &BusinessObject) -> bool {
    if bo.is_deleted() {
        return true;
    }
    match bo.capabilities.tag_deleted {
        Some(tag_deleted) => tag_deleted,
        None => bo.capabilities.tag_canceled.unwrap_or(false),
    }
}
