//! Error handling for the stock ledger
//!
//! Every error maps to an HTTP status and a bilingual (English / French) body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{ChainError, RequestStatus, WorkflowAction};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    // Permission errors
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        message_fr: String,
    },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    // Workflow errors
    #[error("Request is locked")]
    Locked,

    #[error("{role} cannot {action} a request in status {status}")]
    RoleNotPermitted {
        role: String,
        status: RequestStatus,
        action: WorkflowAction,
    },

    #[error("Observations are required to {0}")]
    ObservationsRequired(WorkflowAction),

    // Stock errors
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        available: i64,
        requested: i64,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_fr: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_fr: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>, message_fr: impl Into<String>) -> Self {
        AppError::Unauthorized {
            message: message.into(),
            message_fr: message_fr.into(),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
        message_fr: impl Into<String>,
    ) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
            message_fr: message_fr.into(),
        }
    }

    /// Stable machine-readable code, also used for per-item bulk results
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidToken(_) => "INVALID_TOKEN",
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::InvalidStructure(_) => "INVALID_STRUCTURE",
            AppError::Locked => "LOCKED",
            AppError::RoleNotPermitted { .. } => "ROLE_NOT_PERMITTED",
            AppError::ObservationsRequired(_) => "OBSERVATIONS_REQUIRED",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Locked => AppError::Locked,
            ChainError::RoleNotPermitted {
                actor,
                status,
                action,
            } => AppError::RoleNotPermitted {
                role: actor,
                status,
                action,
            },
            ChainError::ObservationsRequired(action) => AppError::ObservationsRequired(action),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_fr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    /// Status and body for this error
    pub fn detail(&self) -> (StatusCode, ErrorDetail) {
        let code = self.code().to_string();
        let (status, message_en, message_fr, field) = match self {
            AppError::InvalidToken(msg) => (
                StatusCode::UNAUTHORIZED,
                msg.clone(),
                "Session invalide ou expirée".to_string(),
                None,
            ),
            AppError::Unauthorized {
                message,
                message_fr,
            } => (StatusCode::FORBIDDEN, message.clone(), message_fr.clone(), None),
            AppError::InvalidStructure(msg) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid structure: {}", msg),
                format!("Structure invalide : {}", msg),
                Some("structure_id".to_string()),
            ),
            AppError::Locked => (
                StatusCode::CONFLICT,
                "This request is locked and can no longer change".to_string(),
                "Cette demande est verrouillée et ne peut plus être modifiée".to_string(),
                None,
            ),
            AppError::RoleNotPermitted {
                role,
                status,
                action,
            } => (
                StatusCode::FORBIDDEN,
                format!("{} cannot {} a request in status {}", role, action, status),
                format!(
                    "Le rôle {} ne peut pas effectuer {} sur une demande au statut {}",
                    role, action, status
                ),
                None,
            ),
            AppError::ObservationsRequired(action) => (
                StatusCode::BAD_REQUEST,
                format!("Observations are required to {}", action),
                format!("Les observations sont obligatoires pour {}", action),
                Some("observations".to_string()),
            ),
            AppError::InsufficientStock {
                available,
                requested,
                ..
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!(
                    "insufficient stock: available {}, requested {}",
                    available, requested
                ),
                format!(
                    "stock insuffisant : disponible {}, demandé {}",
                    available, requested
                ),
                Some("quantity".to_string()),
            ),
            AppError::Validation {
                field,
                message,
                message_fr,
            } => (
                StatusCode::BAD_REQUEST,
                message.clone(),
                message_fr.clone(),
                Some(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                format!("Données invalides : {}", msg),
                None,
            ),
            AppError::Conflict {
                resource,
                message,
                message_fr,
            } => (
                StatusCode::CONFLICT,
                message.clone(),
                message_fr.clone(),
                Some(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                format!("{} not found", resource),
                format!("{} introuvable", resource),
                None,
            ),
            AppError::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("External service error: {}", msg),
                format!("Erreur du service externe : {}", msg),
                None,
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Configuration error: {}", msg),
                format!("Erreur de configuration : {}", msg),
                None,
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "A database error occurred".to_string(),
                "Une erreur de base de données est survenue".to_string(),
                None,
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
                "Erreur interne du serveur".to_string(),
                None,
            ),
        };

        (
            status,
            ErrorDetail {
                code,
                message_en,
                message_fr,
                field,
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = AppError::InsufficientStock {
            product_id: Uuid::nil(),
            available: 3,
            requested: 10,
        };
        let (status, detail) = err.detail();

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(detail.code, "INSUFFICIENT_STOCK");
        assert_eq!(detail.message_en, "insufficient stock: available 3, requested 10");
    }

    #[test]
    fn test_chain_errors_convert() {
        assert!(matches!(AppError::from(ChainError::Locked), AppError::Locked));
        let err = AppError::from(ChainError::ObservationsRequired(WorkflowAction::Reject));
        assert_eq!(err.code(), "OBSERVATIONS_REQUIRED");
        assert_eq!(err.detail().1.field.as_deref(), Some("observations"));
    }
}
