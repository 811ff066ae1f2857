use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::response::Envelope;

/// FieldError
///
/// One violated rule for one input field. A failed validation carries every
/// violation at once so the admin UI can highlight all of them in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// StoreError
///
/// Failures raised by the data-access layer. None of these are shown to the
/// caller verbatim: the HTTP boundary converts them into the generic 500 shape
/// (or a conflict, for unique violations) and logs the cause.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The targeted row does not exist (update/delete of an absent record).
    #[error("no {table} row with id {id}")]
    RowMissing { table: &'static str, id: String },

    /// A unique index rejected the write. Reached when two creators race past
    /// the application-level uniqueness check.
    #[error("unique constraint violated on {table}: {constraint}")]
    UniqueViolation {
        table: &'static str,
        constraint: String,
    },

    /// A stored value could not be decoded into its declared field kind.
    #[error("corrupt value in {table}.{column}: {reason}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        reason: String,
    },

    /// Simulated outage, used by the in-memory store.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// ApiError
///
/// The error taxonomy of the HTTP layer. Every handler returns
/// `Result<_, ApiError>`; `IntoResponse` renders the uniform envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Input failed schema rules (400, field-by-field list).
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Uniqueness violation or a guarded operation that cannot proceed (400).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing session, invalid session or insufficient role (401).
    #[error("unauthorized")]
    Unauthorized,

    /// Absent, or present but not visible to this caller (404).
    #[error("{0} not found")]
    NotFound(String),

    /// Storage failures not otherwise classified (500).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else that must not leak to the caller (500).
    #[error("unexpected: {0}")]
    Unexpected(String),
}

/// Convenience alias for handler and engine return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::UniqueViolation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: Envelope<()> = match self {
            ApiError::Validation(errors) => Envelope::failure("Invalid data").with_errors(errors),
            ApiError::Conflict(message) => Envelope::failure(message),
            ApiError::Unauthorized => Envelope::failure("Unauthorized"),
            ApiError::NotFound(what) => Envelope::failure(format!("{what} not found")),
            ApiError::Store(StoreError::UniqueViolation { table, constraint }) => {
                tracing::warn!(table, constraint = %constraint, "unique violation reached storage");
                Envelope::failure("A record with the same unique value already exists")
            }
            ApiError::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                Envelope::failure("An internal error occurred")
            }
            ApiError::Unexpected(reason) => {
                tracing::error!(error = %reason, "unexpected failure");
                Envelope::failure("An internal error occurred")
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut list: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"));
                    FieldError::new(field.to_string(), message)
                })
            })
            .collect();
        list.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::Validation(list)
    }
}
