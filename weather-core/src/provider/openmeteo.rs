use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::ProviderError,
    model::{ForecastRequest, ProviderResult},
    provider::execute,
    reduce::{Sample, reduce_daily},
};

use super::WeatherProvider;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const NAME: &str = "open-meteo";

/// Open-Meteo daily forecast. Needs no API key.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self { base_url: OPEN_METEO_URL.to_string(), http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }
}

#[derive(Debug, Deserialize)]
struct OmDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    daily: OmDaily,
}

#[derive(Debug, Deserialize)]
struct OmErrorResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<OmErrorResponse>(body)
        .ok()
        .filter(|e| e.error)
        .and_then(|e| e.reason)
}

/// Zips the parallel daily arrays into samples, skipping entries with a missing
/// value or an unparseable date.
fn samples(daily: &OmDaily) -> Vec<Sample> {
    daily
        .time
        .iter()
        .zip(&daily.temperature_2m_max)
        .zip(&daily.temperature_2m_min)
        .filter_map(|((time, max), min)| {
            let date = match NaiveDate::parse_from_str(time, "%Y-%m-%d") {
                Ok(date) => date,
                Err(err) => {
                    tracing::warn!(provider = NAME, %time, %err, "skipping entry with bad date");
                    return None;
                }
            };
            match (min, max) {
                (Some(temp_min), Some(temp_max)) => {
                    Some(Sample { date, temp_min: *temp_min, temp_max: *temp_max })
                }
                _ => {
                    tracing::warn!(provider = NAME, %date, "skipping entry with missing temperature");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn identity(&self) -> &str {
        NAME
    }

    async fn fetch_forecast(
        &self,
        request: &ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, ProviderError> {
        tracing::info!(provider = NAME, params = %request.params(), "making forecast request");

        let req = Ok(self.http.get(&self.base_url).query(&[
            ("latitude", request.coordinate.latitude.to_string()),
            ("longitude", request.coordinate.longitude.to_string()),
            ("daily", "temperature_2m_max,temperature_2m_min".to_string()),
            ("forecast_days", request.day_count.to_string()),
            ("timezone", "auto".to_string()),
        ]));

        let body = execute(NAME, &self.http, req, cancel, upstream_message).await?;

        let parsed: OmForecastResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::decode(NAME, &e))?;

        tracing::debug!(provider = NAME, days = parsed.daily.time.len(), "parsed forecast response");

        let forecast = reduce_daily(NAME, samples(&parsed.daily), request.day_count as usize);
        if forecast.is_empty() {
            return Err(ProviderError::no_data(NAME));
        }

        Ok(ProviderResult { provider: NAME.to_string(), request: *request, forecast })
    }
}
