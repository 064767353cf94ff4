//! Core error types used across the system

use std::collections::BTreeMap;

use thiserror::Error;

use crate::identifiers::SakIdError;

/// Structured, string-keyed context attached to an error
///
/// Used to carry things like the permitted values of a field so clients can
/// render field-specific messages.
pub type ErrorContext = BTreeMap<String, String>;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: Option<ErrorContext>,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] SakIdError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            field: None,
            context: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            field: Some(field.into()),
            context: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    /// Attaches a context entry to a validation error; other variants are returned unchanged
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let CoreError::Validation { context, .. } = &mut self {
            context
                .get_or_insert_with(BTreeMap::new)
                .insert(key.into(), value.into());
        }
        self
    }

    /// Returns the offending field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            CoreError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Returns the structured context for validation errors
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            CoreError::Validation { context, .. } => context.as_ref(),
            _ => None,
        }
    }
}
