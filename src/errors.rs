use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error taxonomy for the corpus engine. Duplicate skips during
/// import are a counted outcome, not an error, and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote read/write limit hit. Fatal to the current run, surfaced with
    /// a wait-and-retry hint, never retried automatically.
    #[error("Store quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Access-rule problem, distinct from quota so the operator knows this
    /// is configuration rather than load.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Sampling or fetch produced zero usable questions. Terminal for the
    /// session attempt, not a network failure.
    #[error("No questions available: {0}")]
    EmptyResult(String),

    /// The external AI source returned a schema violation. The whole batch
    /// is rejected before any record is constructed.
    #[error("Malformed source data: {0}")]
    MalformedSourceData(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Error context for structured logging at the operation boundary.
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl CorpusError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CorpusError::NotFound(_) | CorpusError::EmptyResult(_) => StatusCode::NOT_FOUND,
            CorpusError::Validation(_) => StatusCode::BAD_REQUEST,
            CorpusError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            CorpusError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CorpusError::MalformedSourceData(_) => StatusCode::BAD_GATEWAY,
            CorpusError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to an HTTP response with structured logging and a message the
    /// operator can act on.
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        let status = self.status_code();
        let message = match &self {
            CorpusError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                format!("{} not found", context.resource_type)
            }
            CorpusError::EmptyResult(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Empty result"
                );
                "Nothing available for this selection.".to_string()
            }
            CorpusError::Validation(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                self.to_string()
            }
            CorpusError::QuotaExceeded(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Store quota exceeded"
                );
                format!("{}. Wait and retry later.", self)
            }
            CorpusError::PermissionDenied(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Permission denied"
                );
                format!("{}. Check the store access rules.", self)
            }
            CorpusError::MalformedSourceData(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Malformed source data"
                );
                self.to_string()
            }
            CorpusError::Database(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                "Database operation failed. Please try again.".to_string()
            }
        };

        (status, Json(ApiResponse::error(message)))
    }
}

impl From<sqlx::Error> for CorpusError {
    fn from(err: sqlx::Error) -> Self {
        CorpusError::Database(anyhow::Error::from(err))
    }
}

/// Maps backend error messages onto the taxonomy so quota and permission
/// failures keep their distinct, user-visible classes.
pub fn classify_store_error(error: &anyhow::Error) -> CorpusError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("quota") || error_str.contains("rate limit") {
        CorpusError::QuotaExceeded(error.to_string())
    } else if error_str.contains("permission denied") || error_str.contains("access denied") {
        CorpusError::PermissionDenied(error.to_string())
    } else if error_str.contains("not found") || error_str.contains("no rows") {
        CorpusError::NotFound(error.to_string())
    } else {
        CorpusError::Database(anyhow::anyhow!("{}", error))
    }
}
