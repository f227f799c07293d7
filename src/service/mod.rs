//! Service client facade.
//!
//! Each capability resolves to a ranked pair of providers. The facade
//! calls the primary first and falls back to the secondary on retryable
//! failures, always surfacing a typed [`ServiceFailure`] so callers can
//! branch on the kind of failure.

mod facade;
mod provider;

pub use facade::{InvocationContext, RetryPolicy, ServiceFacade, DEFAULT_FALLBACK_ATTEMPTS};
pub use provider::{Provider, ProviderFn, ProviderPair, ProviderRank};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed failure returned by a provider or the facade.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ServiceFailure {
    /// The provider could not be reached. Retryable.
    #[error("service unavailable ({provider}): {message}")]
    ServiceUnavailable { provider: String, message: String },
    /// The provider reported a failure. Retryable up to the fallback bound.
    #[error("service error ({provider}): {message}")]
    ServiceError { provider: String, message: String },
    /// The payload was rejected. Never retried.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },
    /// The invocation was cancelled before it could finish.
    #[error("cancelled")]
    Cancelled,
}

impl ServiceFailure {
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        ServiceFailure::ServiceUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn error(provider: &str, message: impl Into<String>) -> Self {
        ServiceFailure::ServiceError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        ServiceFailure::InvalidPayload {
            message: message.into(),
        }
    }

    /// Whether trying another provider could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceFailure::ServiceUnavailable { .. } | ServiceFailure::ServiceError { .. }
        )
    }
}
