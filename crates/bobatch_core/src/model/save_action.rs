//! Save-action phases fired around persistence of one object.

use crate::model::business_object::BusinessObject;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Ordered lifecycle phase of one object save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveActionType {
    BeforeAdding,
    BeforeUpdating,
    BeforeDeleting,
    Added,
    Updated,
    Deleted,
}

impl SaveActionType {
    /// Phase fired before the object's statements run.
    pub fn before_for(bo: &BusinessObject) -> Self {
        if bo.is_new() {
            Self::BeforeAdding
        } else if bo.is_deleted() {
            Self::BeforeDeleting
        } else {
            Self::BeforeUpdating
        }
    }

    /// Phase fired after the object's statements ran.
    pub fn after_for(bo: &BusinessObject) -> Self {
        if bo.is_new() {
            Self::Added
        } else if bo.is_deleted() {
            Self::Deleted
        } else {
            Self::Updated
        }
    }

    pub fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeAdding | Self::BeforeUpdating | Self::BeforeDeleting
        )
    }

    /// Phases after which the object's part of the transaction is complete.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Added | Self::Updated | Self::Deleted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAdding => "BEFORE_ADDING",
            Self::BeforeUpdating => "BEFORE_UPDATING",
            Self::BeforeDeleting => "BEFORE_DELETING",
            Self::Added => "ADDED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }
}

impl Display for SaveActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
