//! SQLite reference adapter over the generic `bo_records` schema.
//!
//! # Responsibility
//! - Render one row per business object with its savable scalars as JSON.
//! - Render one `bo_transactions` audit row per notification.
//!
//! # Invariants
//! - Every rendered statement is keyed by `(object_code, object_key)`; objects
//!   without a primary key cannot be rendered.
//! - Child objects are stored as their own rows, never inside the parent payload.

use super::BoAdapter;
use crate::model::business_object::BusinessObject;
use crate::model::statement::{
    SqlStatement, StatementKind, TransactionNotification, TransactionType,
};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use serde_json::Map;

const INSERT_SQL: &str = "INSERT INTO bo_records (
    object_code,
    object_key,
    series,
    series_key,
    storage_tag,
    payload
) VALUES (?1, ?2, ?3, ?4, ?5, ?6);";

const DELETE_SQL: &str = "DELETE FROM bo_records
WHERE object_code = ?1
  AND object_key = ?2;";

const NOTIFICATION_SQL: &str = "INSERT INTO bo_transactions (
    transaction_type,
    object_code,
    object_key,
    storage_tag
) VALUES (?1, ?2, ?3, ?4);";

/// Default storage tag when the repository is not given a sign.
pub const DEFAULT_SIGN: &str = "bobatch";

/// SQLite statement renderer.
#[derive(Debug, Clone)]
pub struct SqliteBoAdapter {
    sign: String,
}

impl SqliteBoAdapter {
    pub fn new(sign: impl Into<String>) -> Self {
        Self { sign: sign.into() }
    }
}

impl Default for SqliteBoAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SIGN)
    }
}

impl BoAdapter for SqliteBoAdapter {
    fn sign(&self) -> &str {
        &self.sign
    }

    fn tag_storage(&self, bo: &mut BusinessObject) {
        bo.storage_tag = Some(self.sign.clone());
    }

    fn render_insert(&self, bo: &BusinessObject) -> RepoResult<SqlStatement> {
        let key = require_key(bo)?;
        let payload = render_payload(bo)?;
        Ok(SqlStatement {
            kind: StatementKind::Insert,
            object_code: bo.object_code().to_string(),
            instance_id: bo.instance_id(),
            sql: INSERT_SQL.to_string(),
            params: vec![
                Value::Text(bo.object_code().to_string()),
                Value::Integer(key),
                optional_integer(bo.series),
                optional_integer(bo.series_key),
                optional_text(bo.storage_tag.as_deref()),
                Value::Text(payload),
            ],
        })
    }

    fn render_delete(&self, bo: &BusinessObject) -> RepoResult<SqlStatement> {
        let key = require_key(bo)?;
        Ok(SqlStatement {
            kind: StatementKind::Delete,
            object_code: bo.object_code().to_string(),
            instance_id: bo.instance_id(),
            sql: DELETE_SQL.to_string(),
            params: vec![
                Value::Text(bo.object_code().to_string()),
                Value::Integer(key),
            ],
        })
    }

    fn render_transaction_notification(
        &self,
        kind: TransactionType,
        bo: &BusinessObject,
    ) -> RepoResult<TransactionNotification> {
        let key = require_key(bo)?;
        Ok(TransactionNotification {
            kind,
            object_code: bo.object_code().to_string(),
            instance_id: bo.instance_id(),
            sql: NOTIFICATION_SQL.to_string(),
            params: vec![
                Value::Text(kind.as_code().to_string()),
                Value::Text(bo.object_code().to_string()),
                Value::Integer(key),
                optional_text(bo.storage_tag.as_deref()),
            ],
        })
    }
}

fn require_key(bo: &BusinessObject) -> RepoResult<i64> {
    if bo.object_code().trim().is_empty() {
        return Err(RepoError::parsing(bo, "object code is empty"));
    }
    bo.primary_key
        .ok_or_else(|| RepoError::parsing(bo, "primary key is not assigned"))
}

fn render_payload(bo: &BusinessObject) -> RepoResult<String> {
    let payload: Map<String, serde_json::Value> = bo
        .savable_scalars()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    serde_json::to_string(&payload)
        .map_err(|err| RepoError::parsing(bo, format!("payload serialization failed: {err}")))
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::SqliteBoAdapter;
    use crate::adapter::BoAdapter;
    use crate::model::business_object::BusinessObject;
    use crate::model::statement::{StatementKind, TransactionType};
    use crate::repo::RepoError;
    use rusqlite::types::Value;

    #[test]
    fn insert_requires_primary_key() {
        let adapter = SqliteBoAdapter::default();
        let err = adapter
            .render_insert(&BusinessObject::new("Item"))
            .expect_err("unkeyed object cannot be rendered");
        assert!(matches!(err, RepoError::Parsing { .. }));
    }

    #[test]
    fn insert_payload_contains_only_savable_scalars() {
        let adapter = SqliteBoAdapter::new("test");
        let mut bo = BusinessObject::existing("Item", 9);
        bo.set_value("code", "I-9");
        bo.set_value("draft_note", "scratch");
        bo.set_field_savable("draft_note", false);
        bo.push_child("lines", BusinessObject::new("ItemLine"));
        adapter.tag_storage(&mut bo);

        let statement = adapter.render_insert(&bo).expect("keyed object renders");
        assert_eq!(statement.kind, StatementKind::Insert);
        assert_eq!(statement.params[4], Value::Text("test".to_string()));
        assert_eq!(statement.params[5], Value::Text(r#"{"code":"I-9"}"#.to_string()));
    }

    #[test]
    fn notification_carries_transaction_code() {
        let adapter = SqliteBoAdapter::default();
        let bo = BusinessObject::existing("Item", 2);
        let notification = adapter
            .render_transaction_notification(TransactionType::Delete, &bo)
            .expect("notification renders");
        assert_eq!(notification.params[0], Value::Text("D".to_string()));
    }
}
