//! Storage collaborators consumed by the batch repository.
//!
//! # Responsibility
//! - Define the SQL-adapter seam that renders statements for one object.
//! - Define the key-allocation seam run once per batch before planning.
//! - Ship SQLite reference implementations of both.
//!
//! # Invariants
//! - Adapters only render; they never execute statements themselves.

use crate::model::business_object::BusinessObject;
use crate::model::statement::{SqlStatement, TransactionNotification, TransactionType};
use crate::repo::RepoResult;

pub mod keys;
pub mod sqlite;

pub use keys::{KeysManager, SqliteKeysManager};
pub use sqlite::SqliteBoAdapter;

/// Renders persistence statements for business objects.
pub trait BoAdapter: Send + Sync {
    /// Storage tag identifying the repository this adapter writes for.
    fn sign(&self) -> &str;

    /// Stamps storage metadata onto the object right before rendering.
    fn tag_storage(&self, _bo: &mut BusinessObject) {}

    fn render_insert(&self, bo: &BusinessObject) -> RepoResult<SqlStatement>;

    fn render_delete(&self, bo: &BusinessObject) -> RepoResult<SqlStatement>;

    fn render_transaction_notification(
        &self,
        kind: TransactionType,
        bo: &BusinessObject,
    ) -> RepoResult<TransactionNotification>;
}
