//! Batched command bound to one open connection.
//!
//! # Invariants
//! - Entries execute in the order they were added.
//! - A command never begins, commits or rolls back a transaction; atomicity
//!   comes from the transaction the caller holds.

use crate::model::statement::{Batch, BatchEntry};
use crate::repo::error::RepoResult;
use log::{debug, error};
use rusqlite::{params_from_iter, Connection};
use std::time::Instant;

pub struct DbCommand<'conn> {
    conn: &'conn Connection,
    batch: Batch,
}

impl<'conn> DbCommand<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            batch: Batch::new(),
        }
    }

    /// Connection used for immediate (non-batched) work such as key allocation.
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn add_batch(&mut self, entry: impl Into<BatchEntry>) {
        self.batch.push(entry);
    }

    /// Runs every pending entry and returns the number of affected rows.
    ///
    /// Stops at the first failing entry; earlier entries stay applied inside
    /// the caller's transaction.
    pub fn execute_batch(&mut self) -> RepoResult<usize> {
        let started_at = Instant::now();
        let mut affected = 0;
        for (index, entry) in self.batch.entries().iter().enumerate() {
            let mut stmt = self.conn.prepare_cached(entry.sql())?;
            match stmt.execute(params_from_iter(entry.params().iter())) {
                Ok(rows) => affected += rows,
                Err(err) => {
                    error!(
                        "event=batch_execute module=repo status=error entry_index={} entries={} error={}",
                        index,
                        self.batch.len(),
                        err
                    );
                    return Err(err.into());
                }
            }
        }
        debug!(
            "event=batch_execute module=repo status=ok entries={} notifications={} rows={} duration_ms={}",
            self.batch.len(),
            self.batch.notification_count(),
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    pub fn clear_batch(&mut self) {
        self.batch.clear();
    }

    /// Releases the command; pending entries are discarded.
    pub fn close(mut self) {
        if !self.batch.is_empty() {
            debug!(
                "event=command_close module=repo discarded_entries={}",
                self.batch.len()
            );
        }
        self.batch.clear();
    }
}
