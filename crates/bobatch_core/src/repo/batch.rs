//! Batch persistence executor over one SQLite connection.
//!
//! # Responsibility
//! - Own the connection and transaction lifecycle of one repository.
//! - Translate a root set into one ordered batch and execute it atomically.
//! - Tell transaction listeners how each transaction ended.
//!
//! # Invariants
//! - Only the call that opened a connection or transaction may close, commit
//!   or roll it back; an inherited context is left untouched.
//! - Keys for the whole root set are allocated before any statement is planned.
//! - At most one transaction notification is appended per root, never per child.
//! - The command handle is closed before the transaction is committed or
//!   rolled back, on every exit path.
//! - Keys handed out inside a transaction this call rolls back are taken off
//!   the objects again, so a retry allocates fresh ones.

use crate::adapter::{BoAdapter, KeysManager, SqliteBoAdapter, SqliteKeysManager};
use crate::config::RepositoryConfig;
use crate::db::{open_db, open_db_in_memory};
use crate::model::business_object::{BusinessObject, InstanceId};
use crate::model::statement::TransactionType;
use crate::repo::command::DbCommand;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::planner::plan_save;
use crate::repo::result::OperationResult;
use log::{error, info, warn};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Where the repository opens its connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSource {
    File(PathBuf),
    /// Every open yields a fresh, empty database.
    Memory,
}

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

/// Observer told the outcome once a transaction has been committed or rolled back.
pub trait TransactionListener: Send + Sync {
    fn on_transaction_end(&self, transaction_id: &str, outcome: TransactionOutcome);
}

/// Business-object repository executing batched saves.
pub struct BoRepository {
    source: DbSource,
    config: RepositoryConfig,
    conn: Option<Connection>,
    transaction_id: Option<String>,
    adapter: Arc<dyn BoAdapter>,
    keys: Arc<dyn KeysManager>,
    listeners: Vec<Arc<dyn TransactionListener>>,
}

impl BoRepository {
    /// Creates a repository with the SQLite adapter and key manager.
    pub fn new(source: DbSource, config: &RepositoryConfig) -> Self {
        Self {
            source,
            config: *config,
            conn: None,
            transaction_id: None,
            adapter: Arc::new(SqliteBoAdapter::default()),
            keys: Arc::new(SqliteKeysManager),
            listeners: Vec::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn BoAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_keys_manager(mut self, keys: Arc<dyn KeysManager>) -> Self {
        self.keys = keys;
        self
    }

    pub fn add_transaction_listener(&mut self, listener: Arc<dyn TransactionListener>) {
        self.listeners.push(listener);
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Storage tag stamped onto every object this repository writes.
    pub fn sign(&self) -> &str {
        self.adapter.sign()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Opens a connection unless one is already open.
    ///
    /// Returns `true` when this call opened it and therefore owns closing it.
    pub fn open_db_connection(&mut self) -> RepoResult<bool> {
        if self.conn.is_some() {
            return Ok(false);
        }
        let conn = match &self.source {
            DbSource::File(path) => open_db(path)?,
            DbSource::Memory => open_db_in_memory()?,
        };
        self.conn = Some(conn);
        Ok(true)
    }

    /// Drops the connection; an active transaction is rolled back first.
    pub fn close_db_connection(&mut self) {
        if self.in_transaction() {
            if let Err(err) = self.rollback_transaction() {
                warn!(
                    "event=db_close module=repo status=rollback_failed error_code={} error={}",
                    err.code(),
                    err
                );
            }
        }
        self.conn = None;
    }

    /// Begins an immediate transaction unless one is already active.
    ///
    /// Returns `true` when this call began it and therefore owns ending it.
    pub fn begin_transaction(&mut self) -> RepoResult<bool> {
        if self.transaction_id.is_some() {
            return Ok(false);
        }
        let conn = self.conn.as_ref().ok_or(RepoError::ConnectionClosed)?;
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        let transaction_id = Uuid::new_v4().to_string();
        info!(
            "event=transaction_begin module=repo status=ok transaction_id={}",
            transaction_id
        );
        self.transaction_id = Some(transaction_id);
        Ok(true)
    }

    /// Commits the active transaction.
    ///
    /// A failed `COMMIT` is followed by a `ROLLBACK`, and listeners hear
    /// `RolledBack`.
    pub fn commit_transaction(&mut self) -> RepoResult<()> {
        let conn = self.conn.as_ref().ok_or(RepoError::ConnectionClosed)?;
        let transaction_id = self
            .transaction_id
            .take()
            .ok_or(RepoError::NoActiveTransaction)?;
        if let Err(err) = conn.execute_batch("COMMIT;") {
            error!(
                "event=transaction_commit module=repo status=error transaction_id={} error={}",
                transaction_id, err
            );
            // A failed COMMIT may leave the transaction open.
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=transaction_rollback module=repo status=error transaction_id={} error={}",
                    transaction_id, rollback_err
                );
            }
            self.notify_listeners(&transaction_id, TransactionOutcome::RolledBack);
            return Err(err.into());
        }
        info!(
            "event=transaction_commit module=repo status=ok transaction_id={}",
            transaction_id
        );
        self.notify_listeners(&transaction_id, TransactionOutcome::Committed);
        Ok(())
    }

    pub fn rollback_transaction(&mut self) -> RepoResult<()> {
        let conn = self.conn.as_ref().ok_or(RepoError::ConnectionClosed)?;
        let transaction_id = self
            .transaction_id
            .take()
            .ok_or(RepoError::NoActiveTransaction)?;
        let outcome = conn.execute_batch("ROLLBACK;");
        match &outcome {
            Ok(()) => info!(
                "event=transaction_rollback module=repo status=ok transaction_id={}",
                transaction_id
            ),
            Err(err) => error!(
                "event=transaction_rollback module=repo status=error transaction_id={} error={}",
                transaction_id, err
            ),
        }
        self.notify_listeners(&transaction_id, TransactionOutcome::RolledBack);
        outcome.map_err(Into::into)
    }

    fn notify_listeners(&self, transaction_id: &str, outcome: TransactionOutcome) {
        for listener in &self.listeners {
            listener.on_transaction_end(transaction_id, outcome);
        }
    }

    /// Persists every eligible root (and, with `recurse`, its savable
    /// descendants) as one atomic batch.
    ///
    /// Returns the roots that were eligible and written. Status flags are not
    /// touched; callers mark the returned objects old.
    ///
    /// # Errors
    /// - `InvalidInput` when `roots` is empty.
    /// - Any key allocation, planning or execution failure. A transaction
    ///   opened by this call is rolled back first; an inherited one is not.
    pub fn save_batch<'a>(
        &mut self,
        roots: &'a mut [BusinessObject],
        recurse: bool,
    ) -> RepoResult<Vec<&'a mut BusinessObject>> {
        if roots.is_empty() {
            return Err(RepoError::InvalidInput(
                "no business objects to save".to_string(),
            ));
        }

        let started_at = Instant::now();
        let opened_connection = self.open_db_connection()?;
        let opened_transaction = match self.begin_transaction() {
            Ok(opened) => opened,
            Err(err) => {
                if opened_connection {
                    self.close_db_connection();
                }
                return Err(err);
            }
        };

        let unkeyed = opened_transaction.then(|| UnkeyedNodes::capture(roots));
        let outcome = match self.execute_save(roots, recurse) {
            Ok(saved) => {
                if opened_transaction {
                    self.commit_transaction().map(|()| saved)
                } else {
                    Ok(saved)
                }
            }
            Err(err) => {
                if opened_transaction {
                    if let Err(rollback_err) = self.rollback_transaction() {
                        warn!(
                            "event=batch_save module=repo status=rollback_failed error_code={} error={}",
                            rollback_err.code(),
                            rollback_err
                        );
                    }
                }
                if let Some(unkeyed) = &unkeyed {
                    unkeyed.release(roots);
                }
                Err(err)
            }
        };
        if opened_connection {
            self.close_db_connection();
        }

        match outcome {
            Ok(saved) => {
                info!(
                    "event=batch_save module=repo status=ok roots={} saved={} recurse={} duration_ms={}",
                    roots.len(),
                    saved.iter().filter(|flag| **flag).count(),
                    recurse,
                    started_at.elapsed().as_millis()
                );
                Ok(roots
                    .iter_mut()
                    .zip(saved)
                    .filter_map(|(bo, was_saved)| was_saved.then_some(bo))
                    .collect())
            }
            Err(err) => {
                error!(
                    "event=batch_save module=repo status=error roots={} recurse={} duration_ms={} error_code={} error={}",
                    roots.len(),
                    recurse,
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Saves roots without recursion and marks the saved ones old.
    pub fn save(&mut self, roots: &mut [BusinessObject]) -> OperationResult<BusinessObject> {
        self.save_and_mark(roots, false)
    }

    /// Saves roots with their savable descendants and marks the saved graphs old.
    pub fn save_ex(&mut self, roots: &mut [BusinessObject]) -> OperationResult<BusinessObject> {
        self.save_and_mark(roots, true)
    }

    fn save_and_mark(
        &mut self,
        roots: &mut [BusinessObject],
        recurse: bool,
    ) -> OperationResult<BusinessObject> {
        self.save_batch(roots, recurse)
            .map(|saved| {
                saved
                    .into_iter()
                    .map(|bo| {
                        if recurse {
                            bo.mark_old();
                        } else {
                            bo.mark_self_old();
                        }
                        bo.clone()
                    })
                    .collect()
            })
            .into()
    }

    /// Plans and executes the batch; returns a saved flag per root.
    fn execute_save(&self, roots: &mut [BusinessObject], recurse: bool) -> RepoResult<Vec<bool>> {
        let conn = self.conn.as_ref().ok_or(RepoError::ConnectionClosed)?;
        let mut command = DbCommand::new(conn);
        let outcome = self.fill_batch(&mut command, roots, recurse).and_then(|saved| {
            command.execute_batch()?;
            Ok(saved)
        });
        command.clear_batch();
        command.close();
        outcome
    }

    fn fill_batch(
        &self,
        command: &mut DbCommand<'_>,
        roots: &mut [BusinessObject],
        recurse: bool,
    ) -> RepoResult<Vec<bool>> {
        self.keys.use_primary_keys(roots, command)?;
        self.keys.use_series_keys(roots, command)?;

        let mut saved = vec![false; roots.len()];
        for (index, root) in roots.iter_mut().enumerate() {
            if !root.is_persistable() {
                continue;
            }
            let kind = TransactionType::classify(root);
            for statement in plan_save(self.adapter.as_ref(), root, recurse)? {
                command.add_batch(statement);
            }
            if self.config.post_transaction {
                command.add_batch(self.adapter.render_transaction_notification(kind, root)?);
            }
            saved[index] = true;
        }
        Ok(saved)
    }
}

/// Objects that had no primary key or series number before allocation.
#[derive(Debug, Default)]
pub(crate) struct UnkeyedNodes {
    primary: HashSet<InstanceId>,
    series: HashSet<InstanceId>,
}

impl UnkeyedNodes {
    pub(crate) fn capture(roots: &[BusinessObject]) -> Self {
        let mut nodes = Self::default();
        for root in roots {
            nodes.collect(root);
        }
        nodes
    }

    fn collect(&mut self, bo: &BusinessObject) {
        if !bo.is_persistable() {
            return;
        }
        if bo.primary_key.is_none() {
            self.primary.insert(bo.instance_id());
        }
        if bo.series_key.is_none() {
            self.series.insert(bo.instance_id());
        }
        for child in bo.savable_children() {
            self.collect(child);
        }
    }

    /// Drops keys allocated since `capture`; their reservation was rolled back.
    pub(crate) fn release(&self, roots: &mut [BusinessObject]) {
        for root in roots.iter_mut() {
            self.clear(root);
        }
    }

    fn clear(&self, bo: &mut BusinessObject) {
        if !bo.is_persistable() {
            return;
        }
        if self.primary.contains(&bo.instance_id()) {
            bo.primary_key = None;
        }
        if self.series.contains(&bo.instance_id()) {
            bo.series_key = None;
        }
        for child in bo.savable_children_mut() {
            self.clear(child);
        }
    }
}

impl Drop for BoRepository {
    fn drop(&mut self) {
        if self.in_transaction() {
            self.close_db_connection();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BoRepository, DbSource};
    use crate::config::RepositoryConfig;
    use crate::model::business_object::BusinessObject;
    use crate::repo::RepoError;

    fn memory_repository() -> BoRepository {
        let mut repo = BoRepository::new(DbSource::Memory, &RepositoryConfig::default());
        repo.open_db_connection().expect("open in-memory db");
        repo
    }

    fn count(repo: &BoRepository, sql: &str) -> i64 {
        repo.connection()
            .expect("connection open")
            .query_row(sql, [], |row| row.get(0))
            .expect("count query")
    }

    #[test]
    fn empty_root_set_is_invalid_input() {
        let mut repo = memory_repository();
        let err = repo.save_batch(&mut [], true).expect_err("empty input");
        assert!(matches!(err, RepoError::InvalidInput(_)));
    }

    #[test]
    fn begin_is_reentrant_and_only_first_call_owns_transaction() {
        let mut repo = memory_repository();
        assert!(repo.begin_transaction().expect("begin"));
        assert!(!repo.begin_transaction().expect("nested begin"));
        let transaction_id = repo.transaction_id().map(str::to_string);
        assert!(transaction_id.is_some());
        repo.commit_transaction().expect("commit");
        assert!(!repo.in_transaction());
        assert!(matches!(
            repo.commit_transaction(),
            Err(RepoError::NoActiveTransaction)
        ));
    }

    #[test]
    fn begin_without_connection_fails() {
        let mut repo = BoRepository::new(DbSource::Memory, &RepositoryConfig::default());
        assert!(matches!(
            repo.begin_transaction(),
            Err(RepoError::ConnectionClosed)
        ));
    }

    #[test]
    fn save_skips_clean_roots_and_marks_saved_ones_old() {
        let mut repo = memory_repository();
        let mut roots = vec![
            BusinessObject::new("Item"),
            BusinessObject::existing("Item", 99),
        ];
        let result = repo.save(&mut roots);
        assert!(result.is_ok(), "{}", result.message);
        assert_eq!(result.result_objects.len(), 1);
        assert!(!roots[0].is_new());
        assert!(!roots[0].is_dirty());
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM bo_records"), 1);
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM bo_transactions"), 1);
    }

    #[test]
    fn disabled_post_transaction_writes_no_notifications() {
        let config = RepositoryConfig {
            post_transaction: false,
            ..RepositoryConfig::default()
        };
        let mut repo = BoRepository::new(DbSource::Memory, &config);
        repo.open_db_connection().expect("open in-memory db");
        let mut roots = vec![BusinessObject::new("Item")];
        repo.save_batch(&mut roots, false).expect("save succeeds");
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM bo_transactions"), 0);
    }
}
