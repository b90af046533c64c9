//! Business-object graph model.
//!
//! # Responsibility
//! - Define the node shape persisted by the batch repository.
//! - Track new/dirty/deleted/savable status through field mutation.
//! - Describe child composition with explicit field variants.
//!
//! # Invariants
//! - A node is eligible for persistence iff `is_dirty && is_savable`.
//! - `instance_id` identifies one in-memory instance for trigger comparison;
//!   it is never persisted and never reused for another object.
//! - Child traversal only follows fields whose own `savable` flag is set.

use crate::rules::RuleViolation;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// In-memory identity of one business-object instance.
pub type InstanceId = Uuid;

/// Object-supplied rule check run after the rules engine.
pub type SelfCheck = fn(&BusinessObject) -> Result<(), RuleViolation>;

/// Persistence tracking flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStatus {
    pub is_new: bool,
    pub is_dirty: bool,
    pub is_deleted: bool,
    pub is_savable: bool,
}

impl ObjectStatus {
    /// Status of an object created by application code and never stored.
    pub fn created() -> Self {
        Self {
            is_new: true,
            is_dirty: true,
            is_deleted: false,
            is_savable: true,
        }
    }

    /// Status of an object loaded from storage without pending changes.
    pub fn loaded() -> Self {
        Self {
            is_new: false,
            is_dirty: false,
            is_deleted: false,
            is_savable: true,
        }
    }
}

/// Optional capabilities an object may expose to lifecycle processing.
///
/// `None` means the object does not carry the corresponding flag at all,
/// which is different from carrying it with value `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// Set when other documents reference this object; blocks hard delete.
    pub referenced: Option<bool>,
    /// Soft-delete tag.
    pub tag_deleted: Option<bool>,
    /// Cancel tag.
    pub tag_canceled: Option<bool>,
    /// Object participates in approval processes.
    pub approval_data: bool,
    pub self_check: Option<SelfCheck>,
}

/// Value held by one named field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    /// Single composed child; `None` is an absent child.
    Child(Option<Box<BusinessObject>>),
    /// Fixed-size child collection.
    ChildArray(Vec<BusinessObject>),
    /// Ordered, growable child collection.
    ChildList(Vec<BusinessObject>),
}

impl FieldValue {
    /// Business-object children held by this value, in iteration order.
    pub fn children(&self) -> &[BusinessObject] {
        match self {
            Self::Scalar(_) | Self::Child(None) => &[],
            Self::Child(Some(child)) => std::slice::from_ref(child.as_ref()),
            Self::ChildArray(items) | Self::ChildList(items) => items,
        }
    }

    pub fn children_mut(&mut self) -> &mut [BusinessObject] {
        match self {
            Self::Scalar(_) | Self::Child(None) => Default::default(),
            Self::Child(Some(child)) => std::slice::from_mut(child.as_mut()),
            Self::ChildArray(items) | Self::ChildList(items) => items,
        }
    }
}

/// One named field with its own persistence flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub name: String,
    /// Fields with `savable = false` are neither stored nor recursed into.
    pub savable: bool,
    pub value: FieldValue,
}

/// A node of the business-object graph.
#[derive(Debug, Clone)]
pub struct BusinessObject {
    instance_id: InstanceId,
    object_code: String,
    pub primary_key: Option<i64>,
    pub series: Option<i64>,
    pub series_key: Option<i64>,
    /// Stamp applied by the storage adapter right before planning.
    pub storage_tag: Option<String>,
    pub status: ObjectStatus,
    pub capabilities: Capabilities,
    fields: Vec<FieldData>,
}

impl PartialEq for BusinessObject {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
    }
}

impl BusinessObject {
    /// Creates a new, dirty, savable object of the given type.
    pub fn new(object_code: impl Into<String>) -> Self {
        Self::with_status(object_code, ObjectStatus::created())
    }

    /// Creates an object representing an already-stored row.
    ///
    /// The result is clean; mutate it (or call `mark_dirty`) to schedule an update.
    pub fn existing(object_code: impl Into<String>, primary_key: i64) -> Self {
        let mut bo = Self::with_status(object_code, ObjectStatus::loaded());
        bo.primary_key = Some(primary_key);
        bo
    }

    fn with_status(object_code: impl Into<String>, status: ObjectStatus) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            object_code: object_code.into(),
            primary_key: None,
            series: None,
            series_key: None,
            storage_tag: None,
            status,
            capabilities: Capabilities::default(),
            fields: Vec::new(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn object_code(&self) -> &str {
        &self.object_code
    }

    pub fn is_new(&self) -> bool {
        self.status.is_new
    }

    pub fn is_dirty(&self) -> bool {
        self.status.is_dirty
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted
    }

    pub fn is_savable(&self) -> bool {
        self.status.is_savable
    }

    /// Returns whether the repository would persist this node.
    pub fn is_persistable(&self) -> bool {
        self.status.is_dirty && self.status.is_savable
    }

    pub fn set_savable(&mut self, savable: bool) {
        self.status.is_savable = savable;
    }

    pub fn mark_dirty(&mut self) {
        self.status.is_dirty = true;
    }

    /// Schedules the row for hard deletion.
    pub fn mark_deleted(&mut self) {
        self.status.is_deleted = true;
        self.status.is_dirty = true;
    }

    /// Marks this node and every savable descendant as persisted.
    pub fn mark_old(&mut self) {
        self.mark_self_old();
        for child in self.savable_children_mut() {
            child.mark_old();
        }
    }

    /// Marks only this node as persisted; children keep their status.
    pub fn mark_self_old(&mut self) {
        self.status.is_new = false;
        self.status.is_dirty = false;
        self.status.is_deleted = false;
    }

    /// Sets one scalar field and marks the object dirty.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) {
        self.put_field(name, FieldValue::Scalar(value.into()));
    }

    /// Sets one single-child field and marks the object dirty.
    pub fn set_child(&mut self, name: &str, child: Option<BusinessObject>) {
        self.put_field(name, FieldValue::Child(child.map(Box::new)));
    }

    /// Replaces one fixed child collection and marks the object dirty.
    pub fn set_child_array(&mut self, name: &str, children: Vec<BusinessObject>) {
        self.put_field(name, FieldValue::ChildArray(children));
    }

    /// Appends one child to an ordered list field, creating the field if needed.
    ///
    /// Replaces the field when it currently holds a non-list value.
    pub fn push_child(&mut self, name: &str, child: BusinessObject) {
        self.status.is_dirty = true;
        match self.field_mut(name).map(|field| &mut field.value) {
            Some(FieldValue::ChildList(items)) => items.push(child),
            _ => self.put_field(name, FieldValue::ChildList(vec![child])),
        }
    }

    /// Changes the persistence flag of one field, if present.
    pub fn set_field_savable(&mut self, name: &str, savable: bool) {
        if let Some(field) = self.field_mut(name) {
            field.savable = savable;
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldData> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn fields(&self) -> &[FieldData] {
        &self.fields
    }

    /// Returns one scalar value by field name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.field(name).map(|field| &field.value) {
            Some(FieldValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Iterates scalar fields that are persisted with the row.
    pub fn savable_scalars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter(|field| field.savable)
            .filter_map(|field| match &field.value {
                FieldValue::Scalar(value) => Some((field.name.as_str(), value)),
                _ => None,
            })
    }

    /// Iterates children reachable through savable fields, in field order.
    pub fn savable_children(&self) -> impl Iterator<Item = &BusinessObject> {
        self.fields
            .iter()
            .filter(|field| field.savable)
            .flat_map(|field| field.value.children())
    }

    /// Mutable counterpart of [`BusinessObject::savable_children`].
    pub fn savable_children_mut(&mut self) -> impl Iterator<Item = &mut BusinessObject> {
        self.fields
            .iter_mut()
            .filter(|field| field.savable)
            .flat_map(|field| field.value.children_mut())
    }

    fn put_field(&mut self, name: &str, value: FieldValue) {
        self.status.is_dirty = true;
        match self.field_mut(name) {
            Some(field) => field.value = value,
            None => self.fields.push(FieldData {
                name: name.to_string(),
                savable: true,
                value,
            }),
        }
    }
}

impl Display for BusinessObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.primary_key {
            Some(key) => write!(f, "{{[{}].[key = {}]}}", self.object_code, key),
            None => write!(f, "{{[{}].[new {}]}}", self.object_code, self.instance_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BusinessObject, FieldValue};

    #[test]
    fn new_object_is_persistable_and_existing_is_clean() {
        let created = BusinessObject::new("SalesOrder");
        assert!(created.is_new());
        assert!(created.is_persistable());

        let loaded = BusinessObject::existing("SalesOrder", 7);
        assert!(!loaded.is_new());
        assert!(!loaded.is_persistable());
        assert_eq!(loaded.primary_key, Some(7));
    }

    #[test]
    fn field_setters_mark_object_dirty() {
        let mut bo = BusinessObject::existing("Customer", 1);
        bo.set_value("name", "ACME");
        assert!(bo.is_dirty());
        assert_eq!(bo.value("name"), Some(&serde_json::json!("ACME")));
    }

    #[test]
    fn savable_children_skip_unsavable_fields_and_absent_values() {
        let mut order = BusinessObject::new("SalesOrder");
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));
        order.set_child("shipping", None);
        order.set_child("memo", Some(BusinessObject::new("Memo")));
        order.set_field_savable("memo", false);

        assert_eq!(order.savable_children().count(), 2);
        assert!(matches!(
            order.field("lines").map(|f| &f.value),
            Some(FieldValue::ChildList(items)) if items.len() == 2
        ));
    }

    #[test]
    fn mark_old_clears_status_recursively() {
        let mut order = BusinessObject::new("SalesOrder");
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));
        order.mark_old();

        assert!(!order.is_new());
        assert!(!order.is_dirty());
        assert!(order.savable_children().all(|child| !child.is_new() && !child.is_dirty()));
    }

    #[test]
    fn equality_follows_instance_identity() {
        let bo = BusinessObject::new("Item");
        let copy = bo.clone();
        assert_eq!(bo, copy);
        assert_ne!(bo, BusinessObject::new("Item"));
    }
}
