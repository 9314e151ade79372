//! Validation of raw forecast query parameters before they reach the aggregator.

use serde::Deserialize;
use thiserror::Error;

use crate::{config::ForecastConfig, model::ForecastRequest};

const MIN_LATITUDE: f64 = -90.0;
const MAX_LATITUDE: f64 = 90.0;
const MIN_LONGITUDE: f64 = -180.0;
const MAX_LONGITUDE: f64 = 180.0;

/// Query string as received, before parsing. `lat` and `lon` are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub days: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastLimits {
    pub default_days: u32,
    pub max_days: u32,
}

impl Default for ForecastLimits {
    fn default() -> Self {
        Self::from(&ForecastConfig::default())
    }
}

impl From<&ForecastConfig> for ForecastLimits {
    fn from(cfg: &ForecastConfig) -> Self {
        Self { default_days: cfg.default_days, max_days: cfg.max_days }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    #[error("invalid latitude format: {0}")]
    InvalidLatitude(String),

    #[error("invalid longitude format: {0}")]
    InvalidLongitude(String),

    #[error("latitude must be between -90 and 90, got: {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be between -180 and 180, got: {0}")]
    LongitudeOutOfRange(f64),

    #[error("invalid days parameter: {0}")]
    InvalidDays(String),

    #[error("days must be between 1 and {max}")]
    DaysOutOfRange { max: u32 },
}

impl ForecastQuery {
    pub fn validate(&self, limits: ForecastLimits) -> Result<ForecastRequest, ValidationError> {
        let lat_raw = non_empty(&self.lat).ok_or(ValidationError::Missing("lat"))?;
        let lon_raw = non_empty(&self.lon).ok_or(ValidationError::Missing("lon"))?;

        let lat: f64 = lat_raw
            .parse()
            .map_err(|_| ValidationError::InvalidLatitude(lat_raw.to_string()))?;
        let lon: f64 = lon_raw
            .parse()
            .map_err(|_| ValidationError::InvalidLongitude(lon_raw.to_string()))?;

        validate_coordinate(lat, lon)?;

        let days = match non_empty(&self.days) {
            None => limits.default_days,
            Some(raw) => raw.parse().map_err(|_| ValidationError::InvalidDays(raw.to_string()))?,
        };
        validate_days(days, limits)?;

        Ok(ForecastRequest::new(lat, lon, days))
    }
}

/// Checks already-parsed coordinates; NaN is out of range.
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
        return Err(ValidationError::LatitudeOutOfRange(lat));
    }
    if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lon) {
        return Err(ValidationError::LongitudeOutOfRange(lon));
    }
    Ok(())
}

pub fn validate_days(days: u32, limits: ForecastLimits) -> Result<(), ValidationError> {
    if days < 1 || days > limits.max_days {
        return Err(ValidationError::DaysOutOfRange { max: limits.max_days });
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
