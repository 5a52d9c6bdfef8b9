//! Error types for the Pulse orchestration layer.
//!
//! A single error enum covers every failure category the services can
//! surface: configuration, provider backends, authorization, lookups,
//! validation, web search, serialization and I/O.

use thiserror::Error;

/// Unified error type for all Pulse crates.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing credentials, unknown providers)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backend call failed (auth, rate limit, malformed response, network)
    #[error("Provider error [{provider}/{model}{}]: {message}", org_suffix(.organization))]
    Provider {
        provider: String,
        model: String,
        organization: Option<String>,
        message: String,
    },

    /// Ownership or organization mismatch
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed caller input with no safe default
    #[error("Validation error: {0}")]
    Validation(String),

    /// Web search backend errors
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn org_suffix(organization: &Option<String>) -> String {
    organization
        .as_deref()
        .map(|org| format!(" org={}", org))
        .unwrap_or_default()
}

impl AppError {
    /// Build a provider error with backend context.
    pub fn provider(
        provider: impl Into<String>,
        model: impl Into<String>,
        organization: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        AppError::Provider {
            provider: provider.into(),
            model: model.into(),
            organization: organization.map(str::to_string),
            message: message.into(),
        }
    }

    /// True for outcomes that callers must see as "not found or no permission".
    ///
    /// Absent and foreign entities are reported identically so the response
    /// never reveals that another tenant's (or user's) entity exists.
    pub fn is_hidden_from_caller(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Unauthorized(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
