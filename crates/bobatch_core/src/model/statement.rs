//! Planned SQL statements and the batch they are accumulated into.
//!
//! # Invariants
//! - Entry order inside a `Batch` is execution order.
//! - Transaction notifications are only ever created for root objects.

use crate::model::business_object::{BusinessObject, InstanceId};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Row-level operation planned for one business object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Insert,
    Delete,
}

/// High-level operation reported by a transaction notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Add,
    Update,
    Delete,
}

impl TransactionType {
    /// Classifies the pending change of one object.
    pub fn classify(bo: &BusinessObject) -> Self {
        if bo.is_new() {
            Self::Add
        } else if bo.is_deleted() {
            Self::Delete
        } else {
            Self::Update
        }
    }

    /// Stable storage code.
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Add => "A",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }
}

/// One rendered insert/delete statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub kind: StatementKind,
    pub object_code: String,
    pub instance_id: InstanceId,
    pub sql: String,
    pub params: Vec<Value>,
}

/// One rendered audit/trigger statement for a root object.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionNotification {
    pub kind: TransactionType,
    pub object_code: String,
    pub instance_id: InstanceId,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Statement(SqlStatement),
    Notification(TransactionNotification),
}

impl BatchEntry {
    pub fn sql(&self) -> &str {
        match self {
            Self::Statement(statement) => &statement.sql,
            Self::Notification(notification) => &notification.sql,
        }
    }

    pub fn params(&self) -> &[Value] {
        match self {
            Self::Statement(statement) => &statement.params,
            Self::Notification(notification) => &notification.params,
        }
    }
}

impl From<SqlStatement> for BatchEntry {
    fn from(value: SqlStatement) -> Self {
        Self::Statement(value)
    }
}

impl From<TransactionNotification> for BatchEntry {
    fn from(value: TransactionNotification) -> Self {
        Self::Notification(value)
    }
}

/// Ordered statements executed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<BatchEntry>) {
        self.entries.push(entry.into());
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn notification_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, BatchEntry::Notification(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::TransactionType;
    use crate::model::business_object::BusinessObject;

    #[test]
    fn classify_prefers_new_then_deleted() {
        let mut bo = BusinessObject::new("Item");
        assert_eq!(TransactionType::classify(&bo), TransactionType::Add);

        bo.mark_old();
        bo.mark_deleted();
        assert_eq!(TransactionType::classify(&bo), TransactionType::Delete);

        let mut updated = BusinessObject::existing("Item", 3);
        updated.set_value("name", "bolt");
        assert_eq!(TransactionType::classify(&updated), TransactionType::Update);
    }
}
