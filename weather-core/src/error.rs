//! Error types surfaced by provider adapters and the aggregator.

use thiserror::Error;

/// Failure of a single provider for a single request.
///
/// These never fail an aggregated request on their own; the aggregator folds them
/// into the result according to its [`FailurePolicy`](crate::aggregator::FailurePolicy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The outbound request could not be built, usually a misconfigured adapter.
    #[error("{provider}: failed to build request: {message}")]
    RequestConstruction { provider: String, message: String },

    /// Network failure while sending the request or reading the body.
    #[error("{provider}: request failed: {message}")]
    Transport { provider: String, message: String },

    /// The caller's cancellation fired before the call completed. Transport-level.
    #[error("{provider}: request cancelled")]
    Cancelled { provider: String },

    /// Upstream answered with a non-success status.
    #[error("{provider}: upstream returned status {status}: {message}")]
    HttpStatus { provider: String, status: u16, message: String },

    /// Body was not the JSON shape the adapter expects.
    #[error("{provider}: failed to decode response: {message}")]
    Decode { provider: String, message: String },

    /// Parsing and reduction left no usable day.
    #[error("{provider}: no forecast data available")]
    NoData { provider: String },

    /// The provider task ended without reporting an outcome.
    #[error("{provider}: provider task aborted")]
    Aborted { provider: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::RequestConstruction { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Cancelled { provider }
            | ProviderError::HttpStatus { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::NoData { provider }
            | ProviderError::Aborted { provider } => provider,
        }
    }

    /// Network failures, cancellation included.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport { .. } | ProviderError::Cancelled { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled { .. })
    }

    pub(crate) fn request_construction(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::RequestConstruction { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn transport(provider: &str, err: &reqwest::Error) -> Self {
        ProviderError::Transport { provider: provider.to_string(), message: err.to_string() }
    }

    pub(crate) fn cancelled(provider: &str) -> Self {
        ProviderError::Cancelled { provider: provider.to_string() }
    }

    pub(crate) fn decode(provider: &str, err: &serde_json::Error) -> Self {
        ProviderError::Decode { provider: provider.to_string(), message: err.to_string() }
    }

    pub(crate) fn no_data(provider: &str) -> Self {
        ProviderError::NoData { provider: provider.to_string() }
    }
}

/// Request-level failure of [`Aggregator::fetch_forecasts`](crate::Aggregator::fetch_forecasts).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// Every configured provider failed, or none was configured.
    #[error("no provider returned a forecast ({} failed)", failures.len())]
    NoProvidersSucceeded { failures: Vec<ProviderError> },
}

impl AggregateError {
    pub fn failures(&self) -> &[ProviderError] {
        match self {
            AggregateError::NoProvidersSucceeded { failures } => failures,
        }
    }
}
