use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::RepositoryError;

/// Error raised by the workflow services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid status '{value}' for {kind}")]
    InvalidStatus { kind: &'static str, value: String },
    #[error("cannot change {kind} status from {from} to {to}")]
    IllegalTransition {
        kind: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    TenantMismatch(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    PermissionDenied(String),
    #[error("a signed-in user is required")]
    Unauthenticated,
    #[error("{0}")]
    Conflict(String),
    #[error("invoice {invoice} already exists for {reference}")]
    AlreadyInvoiced { reference: String, invoice: String },
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidStatus { .. }
            | Self::IllegalTransition { .. }
            | Self::MissingField(_)
            | Self::Validation(_)
            | Self::TenantMismatch(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) | Self::AlreadyInvoiced { .. } => StatusCode::CONFLICT,
            Self::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Repository(RepositoryError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Repository(RepositoryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Repository(other),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_family_to_a_status_code() {
        let cases = [
            (
                ServiceError::InvalidStatus {
                    kind: "OPD Token",
                    value: "Bogus".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::TenantMismatch("parent".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::permission("nope"), StatusCode::FORBIDDEN),
            (ServiceError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                ServiceError::AlreadyInvoiced {
                    reference: "Lab Test LT-1".to_string(),
                    invoice: "SINV-00001".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::from(RepositoryError::Unavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn repository_not_found_surfaces_as_not_found() {
        let error = ServiceError::from(RepositoryError::NotFound {
            kind: "OPD Token",
            id: "TKN-00009".to_string(),
        });
        assert!(matches!(error, ServiceError::NotFound { kind: "OPD Token", .. }));
        assert_eq!(error.to_string(), "OPD Token TKN-00009 not found");
    }
}
