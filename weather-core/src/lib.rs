//! Core library for the `weather` CLI and HTTP service.
//!
//! This crate defines:
//! - Shared domain models (requests, per-day forecasts, aggregated results)
//! - Abstraction over weather providers and the concrete HTTP adapters
//! - The aggregator that queries every provider concurrently
//! - Query validation, configuration & credentials handling
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod reduce;
pub mod validate;

pub use aggregator::{Aggregator, FailurePolicy};
pub use config::{Config, ForecastConfig, ProviderConfig, ServerConfig};
pub use error::{AggregateError, ProviderError};
pub use model::{
    AggregateResult, Coordinate, DailyForecast, ForecastRequest, ForecastResponse, ProviderResult,
};
pub use provider::{ProviderId, WeatherProvider, providers_from_config};
pub use validate::{ForecastLimits, ForecastQuery, ValidationError};

/// Re-exported so callers can cancel requests without depending on `tokio-util`.
pub use tokio_util::sync::CancellationToken;
