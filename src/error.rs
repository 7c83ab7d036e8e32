use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use thiserror::Error;
use tracing::{Span, error, warn};

use crate::validation::ValidationResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::Authentication(msg) => {
                warn!(message = %msg, context = %ctx, "Authentication error");
                "authentication_error"
            }
            AppError::Authorization(msg) => {
                warn!(message = %msg, context = %ctx, "Authorization error");
                "authorization_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::BadRequest(msg) => {
                warn!(message = %msg, context = %ctx, "Business rule violation");
                "bad_request_error"
            }
            AppError::Invalid(errors) => {
                warn!(errors = %errors, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            if let AppError::Database(_) | AppError::Internal(_) = self {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::Authorization(_) => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::Invalid(_) => Status::BadRequest,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Body sent to the client. Storage and internal details stay in the logs.
    pub fn to_response(&self) -> ValidationResponse {
        match self {
            AppError::Database(_) => ValidationResponse::with_error("server", "Database error"),
            AppError::Authentication(msg) => ValidationResponse::with_error("authentication", msg),
            AppError::Authorization(msg) => ValidationResponse::with_error("permission", msg),
            AppError::NotFound(msg) => ValidationResponse::with_error("resource", msg),
            AppError::BadRequest(msg) => ValidationResponse::with_error("request", msg),
            AppError::Invalid(errors) => ValidationResponse::from_validation_errors(errors),
            AppError::Internal(_) => {
                ValidationResponse::with_error("server", "Internal server error")
            }
        }
    }

    pub fn not_found(entity: &str, id: i64) -> Self {
        AppError::NotFound(format!("{} with id {} not found", entity, id))
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log_and_record(&format!("Request to {} {}", req.method(), req.uri()));
        Custom(self.status_code(), Json(self.to_response())).respond_to(req)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Cryptography error: {}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

/// Maps a unique-constraint violation onto a business-rule error, passing every
/// other storage failure through unchanged.
pub fn on_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::BadRequest(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

pub fn on_foreign_key_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            AppError::BadRequest(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
