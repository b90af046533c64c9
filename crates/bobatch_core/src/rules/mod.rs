//! Business-rule contracts checked before an object is written.
//!
//! # Responsibility
//! - Define the rules-engine seam consulted by the lifecycle dispatcher.
//! - Provide an in-process registry keyed by object code.
//!
//! # Invariants
//! - Rule evaluation never touches storage; it only inspects (and may
//!   normalize) the object under check.

use crate::model::business_object::BusinessObject;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A failed business rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("business rule `{rule}` violated by {object}: {message}")]
pub struct RuleViolation {
    pub rule: String,
    pub object: String,
    pub message: String,
}

impl RuleViolation {
    pub fn new(rule: impl Into<String>, bo: &BusinessObject, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            object: bo.to_string(),
            message: message.into(),
        }
    }
}

/// Rule set executed for one object type.
pub trait BusinessRules: Send + Sync {
    fn execute(&self, bo: &mut BusinessObject) -> Result<(), RuleViolation>;
}

/// Rules lookup by object code.
pub trait RulesEngine: Send + Sync {
    fn rules_for(&self, object_code: &str) -> Option<Arc<dyn BusinessRules>>;
}

/// In-process rules registry.
#[derive(Default)]
pub struct RulesRegistry {
    rules: HashMap<String, Vec<Arc<dyn BusinessRules>>>,
}

impl RulesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one rule for an object code; rules run in registration order.
    pub fn register(&mut self, object_code: impl Into<String>, rule: Arc<dyn BusinessRules>) {
        self.rules.entry(object_code.into()).or_default().push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RulesEngine for RulesRegistry {
    fn rules_for(&self, object_code: &str) -> Option<Arc<dyn BusinessRules>> {
        let rules = self.rules.get(object_code)?;
        Some(Arc::new(RuleSet(rules.clone())))
    }
}

struct RuleSet(Vec<Arc<dyn BusinessRules>>);

impl BusinessRules for RuleSet {
    fn execute(&self, bo: &mut BusinessObject) -> Result<(), RuleViolation> {
        self.0.iter().try_for_each(|rule| rule.execute(bo))
    }
}

/// Requires scalar fields to be present and non-null.
#[derive(Debug, Clone)]
pub struct RequiredFieldsRule {
    fields: Vec<String>,
}

impl RequiredFieldsRule {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl BusinessRules for RequiredFieldsRule {
    fn execute(&self, bo: &mut BusinessObject) -> Result<(), RuleViolation> {
        // Deleted rows are about to disappear; their content is irrelevant.
        if bo.is_deleted() {
            return Ok(());
        }
        match self
            .fields
            .iter()
            .find(|name| bo.value(name).map_or(true, serde_json::Value::is_null))
        {
            Some(missing) => Err(RuleViolation::new(
                "required",
                bo,
                format!("field `{missing}` is required"),
            )),
            None => Ok(()),
        }
    }
}
