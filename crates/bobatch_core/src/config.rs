//! Repository feature switches.
//!
//! # Responsibility
//! - Hold the switches that enable transaction notifications, rules, logics
//!   and approval processing.
//! - Load them from `BOBATCH_DISABLED_*` environment variables.
//!
//! # Invariants
//! - Every switch defaults to enabled; variables can only disable.
//! - Unparseable values are rejected, never silently ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DISABLED_POST_TRANSACTION: &str = "BOBATCH_DISABLED_POST_TRANSACTION";
pub const ENV_DISABLED_BUSINESS_RULES: &str = "BOBATCH_DISABLED_BUSINESS_RULES";
pub const ENV_DISABLED_BUSINESS_LOGICS: &str = "BOBATCH_DISABLED_BUSINESS_LOGICS";
pub const ENV_DISABLED_BUSINESS_APPROVAL: &str = "BOBATCH_DISABLED_BUSINESS_APPROVAL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid boolean `{value}` for {key}")]
    InvalidBool { key: String, value: String },
}

/// Feature switches consulted by the repository and lifecycle dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Append one transaction notification per saved root.
    pub post_transaction: bool,
    pub check_rules: bool,
    pub check_logics: bool,
    pub check_approval_process: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            post_transaction: true,
            check_rules: true,
            check_logics: true,
            check_approval_process: true,
        }
    }
}

impl RepositoryConfig {
    /// Reads the disable switches from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the disable switches through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let disabled = |key: &str| -> Result<bool, ConfigError> {
            match lookup(key) {
                Some(value) => parse_bool(key, &value),
                None => Ok(false),
            }
        };
        Ok(Self {
            post_transaction: !disabled(ENV_DISABLED_POST_TRANSACTION)?,
            check_rules: !disabled(ENV_DISABLED_BUSINESS_RULES)?,
            check_logics: !disabled(ENV_DISABLED_BUSINESS_LOGICS)?,
            check_approval_process: !disabled(ENV_DISABLED_BUSINESS_APPROVAL)?,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
