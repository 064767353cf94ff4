//! Service error types
//!
//! The four outcomes a caller must tell apart:
//!
//! | Variant        | Retry?                      |
//! |----------------|-----------------------------|
//! | `Concurrency`  | yes, after reloading        |
//! | `Validation`   | no, the payload is wrong    |
//! | `BusinessRule` | no, the case forbids it now |
//! | `NotFound`     | no                          |
//!
//! Anything else is a storage failure and fatal for the request.

use thiserror::Error;

use core_kernel::{CoreError, ErrorContext, PortError, SakId};
use domain_koe::{KoeError, Regel, SporType};
use infra_store::StoreError;

/// Errors returned by [`KoeService`](crate::KoeService)
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The case log moved on since the caller read it
    #[error("Case {sak_id} is at version {actual}, not {expected}; reload and retry")]
    Concurrency {
        sak_id: SakId,
        expected: u64,
        actual: u64,
    },

    /// Malformed or forbidden client payload
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        /// Structured detail such as the `event_type` the payload belonged to
        context: Option<ErrorContext>,
    },

    /// The event is well-formed but not allowed in the current case state
    #[error("Business rule {regel} violated: {melding}")]
    BusinessRule {
        regel: Regel,
        melding: String,
        /// Track the violation concerns, for field-specific messages
        spor: Option<SporType>,
    },

    /// No events exist for the case
    #[error("Case not found: {0}")]
    NotFound(SakId),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// A collaborator failed while the service depended on its result
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] PortError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Creates a validation error without a field
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field: None,
            context: None,
        }
    }

    /// Creates a validation error for one field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field: Some(field.into()),
            context: None,
        }
    }

    /// Returns true if reloading the case and resubmitting may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Concurrency { .. } => true,
            ServiceError::Store(e) => e.is_retryable(),
            ServiceError::Collaborator(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    /// Name of the violated rule, if this is a business rule violation
    pub fn regel(&self) -> Option<Regel> {
        match self {
            ServiceError::BusinessRule { regel, .. } => Some(*regel),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Concurrency {
                sak_id,
                expected,
                actual,
            } => ServiceError::Concurrency {
                sak_id,
                expected,
                actual,
            },
            StoreError::InvalidBatch(message) => ServiceError::validation(message),
            other => ServiceError::Store(other),
        }
    }
}

impl From<KoeError> for ServiceError {
    fn from(error: KoeError) -> Self {
        ServiceError::Validation {
            field: error.field().map(str::to_string),
            message: error.to_string(),
            context: None,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(error: CoreError) -> Self {
        ServiceError::Validation {
            field: error.field().map(str::to_string),
            context: error.context().cloned(),
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ServiceError {
    fn from(error: config::ConfigError) -> Self {
        ServiceError::Configuration(error.to_string())
    }
}

impl From<ServiceError> for PortError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Concurrency { .. } => PortError::Conflict {
                message: error.to_string(),
            },
            ServiceError::NotFound(sak_id) => PortError::not_found("Sak", sak_id),
            ServiceError::Validation { message, .. } => PortError::validation(message),
            ServiceError::BusinessRule { .. } => PortError::validation(error.to_string()),
            ServiceError::Store(e) => e.into(),
            ServiceError::Collaborator(e) => e,
            ServiceError::Configuration(message) => PortError::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sak() -> SakId {
        SakId::new("KOE-1").unwrap()
    }

    #[test]
    fn test_store_concurrency_maps_to_concurrency() {
        let error: ServiceError = StoreError::concurrency(&sak(), 2, 3).into();
        assert!(matches!(
            error,
            ServiceError::Concurrency { expected: 2, actual: 3, .. }
        ));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_invalid_batch_maps_to_validation() {
        let error: ServiceError = StoreError::invalid_batch("empty").into();
        assert!(matches!(error, ServiceError::Validation { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_koe_error_keeps_field() {
        let error: ServiceError = KoeError::ServerOwnedField("event_id".into()).into();
        match error {
            ServiceError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("event_id")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_core_error_keeps_context() {
        let core = CoreError::validation_field("Antall dager må oppgis", "antall_dager")
            .with_context("event_type", "frist_krav_sendt");
        let error: ServiceError = core.into();
        match error {
            ServiceError::Validation { field, context, .. } => {
                assert_eq!(field.as_deref(), Some("antall_dager"));
                let context = context.unwrap();
                assert_eq!(context.get("event_type").map(String::as_str), Some("frist_krav_sendt"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_business_rule_reports_rule() {
        let error = ServiceError::BusinessRule {
            regel: Regel::NotLocked,
            melding: "Grunnlag er låst".into(),
            spor: Some(SporType::Grunnlag),
        };
        assert_eq!(error.regel(), Some(Regel::NotLocked));
        assert!(error.to_string().contains("NOT_LOCKED"));
    }

    #[test]
    fn test_port_error_mapping() {
        let port: PortError = ServiceError::NotFound(sak()).into();
        assert!(port.is_not_found());
        let port: PortError = ServiceError::Concurrency {
            sak_id: sak(),
            expected: 0,
            actual: 1,
        }
        .into();
        assert!(matches!(port, PortError::Conflict { .. }));
    }
}
