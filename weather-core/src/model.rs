use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

/// Number of forecast days used when the caller does not ask for a specific window.
pub const DEFAULT_DAY_COUNT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One logical forecast request, shared read-only by every provider task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub coordinate: Coordinate,
    pub day_count: u32,
}

impl ForecastRequest {
    pub fn new(latitude: f64, longitude: f64, day_count: u32) -> Self {
        Self { coordinate: Coordinate::new(latitude, longitude), day_count }
    }

    /// Short human-readable form used in log records.
    pub fn params(&self) -> String {
        format!(
            "lat: {:.4} lon: {:.4} days: {}",
            self.coordinate.latitude, self.coordinate.longitude, self.day_count
        )
    }
}

/// High/low pair for a single calendar day, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
}

/// Normalized output of one provider for one request.
///
/// `forecast` is ordered by ascending date and holds at most one entry per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    pub request: ForecastRequest,
    pub forecast: Vec<DailyForecast>,
}

impl ProviderResult {
    /// Placeholder inserted for a provider that failed under
    /// [`FailurePolicy::Placeholder`](crate::aggregator::FailurePolicy::Placeholder).
    pub fn empty(provider: impl Into<String>, request: ForecastRequest) -> Self {
        Self { provider: provider.into(), request, forecast: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.forecast.is_empty()
    }
}

/// Per-provider results of one aggregated request, keyed by provider identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateResult {
    results: HashMap<String, ProviderResult>,
    failures: BTreeMap<String, String>,
}

impl AggregateResult {
    pub(crate) fn insert(&mut self, result: ProviderResult) {
        self.results.insert(result.provider.clone(), result);
    }

    pub(crate) fn record_failure(&mut self, provider: &str, message: String) {
        self.failures.insert(provider.to_string(), message);
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderResult> {
        self.results.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.results.contains_key(provider)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderResult)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Error messages of the providers that failed, keyed by identity.
    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }

    /// Provider identities in a stable order, handy for display.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.results.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Wire shape returned to HTTP callers.
///
/// ```json
/// {"latitude": 40.71, "longitude": -74.0, "forecast_window": 3,
///  "forecasts": {"open-meteo": [{"date": "2025-07-25", "temp_max": 25.0, "temp_min": 15.0}]}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub forecast_window: u32,
    pub forecasts: BTreeMap<String, Vec<DailyForecast>>,
}

impl ForecastResponse {
    pub fn new(request: &ForecastRequest, aggregate: &AggregateResult) -> Self {
        let forecasts = aggregate
            .iter()
            .map(|(provider, result)| (provider.to_string(), result.forecast.clone()))
            .collect();

        Self {
            latitude: request.coordinate.latitude,
            longitude: request.coordinate.longitude,
            forecast_window: request.day_count,
            forecasts,
        }
    }
}
