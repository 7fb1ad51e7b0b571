// Error types shared by the API client, session store and poller

use serde::{Deserialize, Serialize};

/// A single field-level message from a 4xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Structured error object returned with 5xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: no session token found")]
    MissingAuth,

    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Server error: {}", .0.message)]
    Server(ApiErrorBody),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Text shown to the user for this error
    pub fn user_message(&self) -> String {
        match self {
            AppError::MissingAuth => "You are not signed in. Run `payportal login` first.".to_string(),
            AppError::Validation(errors) => join_fields(errors),
            AppError::Server(_) => "Something went wrong on our side. Please try again shortly.".to_string(),
            AppError::Http(e) if e.is_timeout() => "The request timed out.".to_string(),
            AppError::Http(_) => "Could not reach the payments service.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::MissingAuth)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldError {
                    field: Some(field.to_string()),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid value ({})", e.code)),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(fields)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type AppResult<T> = std::result::Result<T, AppError>;
