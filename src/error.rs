//! Error types for the portfolio assistant

use serde::Serialize;
use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Field-level problems found while turning matched text into a command.
///
/// These never surface to the user directly: the classifier treats them as a
/// signal to route the message through the hybrid path.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("{field} is not a number: {raw}")]
    NotANumber { field: &'static str, raw: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("{field} supports at most 2 decimal places")]
    TooPrecise { field: &'static str },

    #[error("invalid ticker symbol: {0}")]
    InvalidSymbol(String),

    #[error("{field} is out of the supported range")]
    OutOfRange { field: &'static str },
}

impl ValidationError {
    /// Name of the field the error refers to, if any.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field)
            | ValidationError::NotANumber { field, .. }
            | ValidationError::NotPositive { field }
            | ValidationError::Negative { field }
            | ValidationError::TooPrecise { field }
            | ValidationError::OutOfRange { field } => field,
            ValidationError::InvalidSymbol(_) => "symbol",
        }
    }
}

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Delegate error: {0}")]
    Delegate(String),

    #[error("Delegate timed out after {0} ms")]
    DelegateTimeout(u64),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Portfolio context error: {0}")]
    Context(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl AssistantError {
    /// Human-readable text safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Validation(ValidationError::OutOfRange { field }) => {
                format!("That {} is too large for this portfolio. Nothing was changed.", field)
            }
            AssistantError::Validation(e) => {
                format!("I couldn't understand the {} in that request.", e.field())
            }
            AssistantError::NotFound(message) => message.clone(),
            AssistantError::Store(_) | AssistantError::DatabaseError(_) => {
                "Sorry, I couldn't reach your portfolio right now. Please try again in a moment."
                    .to_string()
            }
            AssistantError::Delegate(_)
            | AssistantError::DelegateTimeout(_)
            | AssistantError::HttpError(_) => {
                "Sorry, I couldn't get an answer for that right now. Please try again shortly."
                    .to_string()
            }
            AssistantError::Cancelled => "The request was cancelled before anything changed.".to_string(),
            AssistantError::Context(_) => {
                "I couldn't tell which portfolio to use. Please sign in or start a guest session."
                    .to_string()
            }
            AssistantError::Config(_)
            | AssistantError::Internal(_)
            | AssistantError::SerializationError(_)
            | AssistantError::IoError(_)
            | AssistantError::MetricsError(_) => crate::GENERIC_FALLBACK.to_string(),
        }
    }

    /// True for failures of the persistence layer.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AssistantError::Store(_) | AssistantError::DatabaseError(_))
    }
}
