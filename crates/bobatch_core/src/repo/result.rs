//! Result-capturing envelope returned by the legacy-style save entry points.
//!
//! Everything inside the crate propagates `RepoResult`; this type exists for
//! callers that expect a value carrying either objects or a captured error.

use super::error::{RepoError, RepoResult};

/// Outcome of one repository operation with the error captured, not raised.
#[derive(Debug)]
pub struct OperationResult<T> {
    pub result_code: i32,
    pub message: String,
    pub error: Option<RepoError>,
    pub result_objects: Vec<T>,
}

impl<T> OperationResult<T> {
    pub fn success(result_objects: Vec<T>) -> Self {
        Self {
            result_code: 0,
            message: String::new(),
            error: None,
            result_objects,
        }
    }

    pub fn failure(error: RepoError) -> Self {
        Self {
            result_code: -1,
            message: error.to_string(),
            error: Some(error),
            result_objects: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Converts back into the crate-wide propagation convention.
    pub fn into_result(self) -> RepoResult<Vec<T>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result_objects),
        }
    }
}

impl<T> From<RepoResult<Vec<T>>> for OperationResult<T> {
    fn from(value: RepoResult<Vec<T>>) -> Self {
        match value {
            Ok(objects) => Self::success(objects),
            Err(error) => Self::failure(error),
        }
    }
}
