//! Error types for the API client, the cache and the mutation coordinator.

use reqwest::StatusCode;

/// A payload rejected before any network call was made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("{0} is required")]
  MissingField(&'static str),

  #[error("{field} must be at least {min} characters")]
  TooShort { field: &'static str, min: usize },

  #[error("{field} cannot exceed {max} characters")]
  TooLong { field: &'static str, max: usize },

  #[error("invalid due date '{0}', expected YYYY-MM-DD")]
  InvalidDueDate(String),

  #[error("unknown status '{0}', expected one of TODO, IN_PROGRESS, DONE")]
  UnknownStatus(String),
}

/// Failure talking to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("Authentication required. Please log in.")]
  Unauthenticated,

  /// Non-2xx response. `message` comes from the response body when present.
  #[error("{message}")]
  Status { status: StatusCode, message: String },

  #[error("{0} not found")]
  NotFound(String),

  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("Invalid response format: {0}")]
  InvalidResponse(String),

  #[error("invalid API url: {0}")]
  Url(#[from] url::ParseError),
}

impl ApiError {
  /// Build an error for a non-2xx response, falling back to `API error: <status>`.
  pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
    let message = message
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
    ApiError::Status { status, message }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("failed to encode {key}: {source}")]
  Encode {
    key: String,
    source: serde_json::Error,
  },

  #[error("failed to decode {key}: {source}")]
  Decode {
    key: String,
    source: serde_json::Error,
  },
}

/// Error returned to whoever triggered a mutation.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
  /// The mutation never reached the optimistic phase.
  #[error("invalid input: {0}")]
  Validation(#[from] ValidationError),

  /// The request failed and the cache was rolled back.
  #[error(transparent)]
  Api(#[from] ApiError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

impl MutationError {
  /// Whether re-invoking the same mutation could succeed.
  pub fn is_recoverable(&self) -> bool {
    match self {
      MutationError::Validation(_) => false,
      MutationError::Api(ApiError::Unauthenticated) => false,
      MutationError::Api(_) => true,
      MutationError::Cache(_) => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_error_message_fallback() {
    let err = ApiError::from_status(StatusCode::BAD_GATEWAY, None);
    assert_eq!(err.to_string(), "API error: 502");

    let err = ApiError::from_status(StatusCode::NOT_FOUND, Some("Task not found".to_string()));
    assert_eq!(err.to_string(), "Task not found");

    let err = ApiError::from_status(StatusCode::CONFLICT, Some(String::new()));
    assert_eq!(err.to_string(), "API error: 409");
  }

  #[test]
  fn test_recoverable() {
    let err = MutationError::from(ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, None));
    assert!(err.is_recoverable());
    assert!(!MutationError::from(ValidationError::MissingField("taskId")).is_recoverable());
    assert!(!MutationError::from(ApiError::Unauthenticated).is_recoverable());
  }
}
