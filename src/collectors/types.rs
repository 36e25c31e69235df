//! Common types for the todo collector.
//!
//! This module defines the error type for fetching, the typed [`TodoItem`]
//! record and the validation step that turns an untyped JSON payload into
//! items at the pipeline boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::Teddy360;

/// Errors that can occur while fetching items.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The endpoint answered with a non-success status.
    #[error("Failed to fetch data from API: status {status}")]
    FetchFailed {
        /// HTTP status code returned.
        status: u16,
    },

    /// Failed to parse response data.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Result type alias for collector operations.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Payload shape does not match the item schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// The payload is not a JSON array.
    #[error("Expected a JSON array of items, got {0}")]
    NotAnArray(&'static str),

    /// One element is missing a field or has a field of the wrong type.
    #[error("Item {index} is malformed: {reason}")]
    MalformedItem {
        /// Position of the element in the payload.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// One todo as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i32,
    #[serde(rename = "userId")]
    pub user_id: i32,
    pub title: String,
    pub completed: bool,
}

impl TodoItem {
    /// Creates an item.
    pub fn new(id: i32, user_id: i32, title: impl Into<String>, completed: bool) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            completed,
        }
    }

    /// Converts the item into its persisted form.
    pub fn into_record(self) -> Teddy360 {
        Teddy360 {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            completed: self.completed,
        }
    }
}

/// Validates an untyped payload into items, preserving order.
///
/// Unknown fields are ignored. The first malformed element is reported.
pub fn validate_items(payload: &Value) -> Result<Vec<TodoItem>, StructuralError> {
    let elements = payload
        .as_array()
        .ok_or_else(|| StructuralError::NotAnArray(json_type_name(payload)))?;

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            if !element.is_object() {
                return Err(StructuralError::MalformedItem {
                    index,
                    reason: format!("expected an object, got {}", json_type_name(element)),
                });
            }
            TodoItem::deserialize(element).map_err(|e| StructuralError::MalformedItem {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
