use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unrecognized value `{value}` for `{field}`")]
    UnknownValue { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("request `{0}` was not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request `{0}` was modified concurrently; reload and retry")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { id, .. } => Self::NotFound(id),
            StoreError::PreconditionFailed { id, .. } => Self::Conflict(id),
            other => Self::Store(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Validation,
    Conflict,
    StoreUnavailable,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl LifecycleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Validation(_) | Self::Domain(_) => ErrorClass::Validation,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::Store(_) => ErrorClass::StoreUnavailable,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.class() {
            ErrorClass::NotFound => "The request no longer exists.",
            ErrorClass::Validation => "The request could not be processed. Check inputs and try again.",
            ErrorClass::Conflict => "The request was changed by someone else. Reload and try again.",
            ErrorClass::StoreUnavailable => {
                "The request store is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, ErrorClass, LifecycleError};
    use crate::store::StoreError;

    #[test]
    fn missing_document_maps_to_not_found() {
        let error = LifecycleError::from(StoreError::NotFound {
            collection: "requests".to_owned(),
            id: "doc-1".to_owned(),
        });

        assert!(matches!(error, LifecycleError::NotFound(ref id) if id == "doc-1"));
        assert_eq!(error.class(), ErrorClass::NotFound);
    }

    #[test]
    fn failed_precondition_maps_to_conflict() {
        let error = LifecycleError::from(StoreError::PreconditionFailed {
            collection: "requests".to_owned(),
            id: "doc-2".to_owned(),
            field: "updatedAt".to_owned(),
        });

        assert_eq!(error.class(), ErrorClass::Conflict);
        assert_eq!(
            error.user_message(),
            "The request was changed by someone else. Reload and try again."
        );
    }

    #[test]
    fn store_outage_keeps_underlying_text() {
        let error = LifecycleError::from(StoreError::Unavailable("permission denied".to_owned()));

        assert_eq!(error.class(), ErrorClass::StoreUnavailable);
        assert!(error.to_string().contains("permission denied"));
    }

    #[test]
    fn domain_errors_are_validation_class() {
        let error = LifecycleError::from(DomainError::UnknownValue {
            field: "status",
            value: "archived".to_owned(),
        });

        assert_eq!(error.class(), ErrorClass::Validation);
    }
}
