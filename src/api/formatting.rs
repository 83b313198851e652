//! JSON shaping of results
//!
//! Failures become `{"error": "..."}` objects so collaborators branch on the
//! shape of the value rather than on a transport-level error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::algorithms::PositionEstimate;
use crate::processing::ChangeReport;
use crate::validation::{ChangeDetectionError, TriangulationError};

/// Structured error object returned in place of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
}

impl ErrorResult {
    pub fn from_error(error: &impl fmt::Display) -> Self {
        Self { error: error.to_string() }
    }

    pub fn to_json(&self) -> Value {
        json!({ "error": self.error })
    }
}

/// Estimate as JSON, or an error object
pub fn position_result(result: &Result<PositionEstimate, TriangulationError>) -> Value {
    match result {
        Ok(estimate) => serde_json::to_value(estimate).unwrap_or_else(|e| ErrorResult::from_error(&e).to_json()),
        Err(error) => ErrorResult::from_error(error).to_json(),
    }
}

/// Change report figures as JSON, or an error object
///
/// The annotated image never goes into the JSON; callers take it from
/// [`ChangeReport::changes_image`].
pub fn change_result(result: &Result<ChangeReport, ChangeDetectionError>) -> Value {
    match result {
        Ok(report) => serde_json::to_value(report).unwrap_or_else(|e| ErrorResult::from_error(&e).to_json()),
        Err(error) => ErrorResult::from_error(error).to_json(),
    }
}
