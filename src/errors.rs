use http::StatusCode;
use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

use crate::quantity::Quantity;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Insufficient stock for {context}: requested {requested}, available {available}")]
    InsufficientStock {
        context: String,
        requested: Quantity,
        available: Quantity,
    },

    #[error(
        "Availability {availability_id} has reserved stock: requested {requested}, unreserved {unreserved}"
    )]
    ReservedStock {
        availability_id: Uuid,
        requested: Quantity,
        unreserved: Quantity,
    },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", kind, id))
    }

    /// Returns the HTTP status code callers should surface for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InvalidStatus(_) => StatusCode::CONFLICT,
            Self::InsufficientStock { .. } | Self::ReservedStock { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }

    /// Returns the error message suitable for user-facing responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Short machine-readable code for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::ReservedStock { .. } => "reserved_stock",
            Self::EventError(_) => "event",
            Self::InternalError(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStatus("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                context: "x".into(),
                requested: Quantity::from_units(8),
                available: Quantity::from_units(5),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::db_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::db_error("password=hunter2").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("ledger drift".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Batch B1 not found".into()).response_message(),
            "Not found: Batch B1 not found"
        );
    }

    #[test]
    fn insufficient_stock_message_carries_quantities() {
        let err = ServiceError::InsufficientStock {
            context: "availability 42".into(),
            requested: Quantity::from_units(8),
            available: Quantity::from_units(5),
        };
        let message = err.to_string();
        assert!(message.contains("requested 8.0000"));
        assert!(message.contains("available 5.0000"));
        assert_eq!(err.kind(), "insufficient_stock");
    }
}
