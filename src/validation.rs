use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }

    pub fn from_validation_errors(errors: &validator::ValidationErrors) -> Self {
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Self::new(error_map)
    }
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

/// Accepts `HH:MM` or `HH:MM:SS` and returns `HH:MM`. Seconds are dropped so that
/// a value round-tripped through a client that appends them compares equal.
pub fn normalize_time(value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    let parsed = chrono::NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| chrono::NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| {
            AppError::BadRequest(format!("Invalid time '{}', expected HH:MM", value))
        })?;

    Ok(parsed.format("%H:%M").to_string())
}
