use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::ProviderError,
    model::{ForecastRequest, ProviderResult},
    provider::{execute, require_api_key},
    reduce::{Sample, reduce_daily},
};

use super::WeatherProvider;

pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

const NAME: &str = "openweather";

/// OpenWeather 5 day / 3 hour forecast, reduced to one entry per day.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key, base_url: OPENWEATHER_URL.to_string(), http: Client::new() }
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
struct OwMain {
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt_txt: String,
    main: OwMain,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwErrorResponse {
    message: String,
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<OwErrorResponse>(body).ok().map(|e| e.message)
}

/// `dt_txt` is a UTC timestamp such as `2025-07-25 18:00:00`.
fn samples(list: &[OwForecastEntry]) -> Vec<Sample> {
    list.iter()
        .filter_map(|entry| match NaiveDateTime::parse_from_str(&entry.dt_txt, "%Y-%m-%d %H:%M:%S") {
            Ok(ts) => Some(Sample {
                date: ts.date(),
                temp_min: entry.main.temp_min,
                temp_max: entry.main.temp_max,
            }),
            Err(err) => {
                tracing::warn!(provider = NAME, dt_txt = %entry.dt_txt, %err, "skipping entry with bad timestamp");
                None
            }
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn identity(&self) -> &str {
        NAME
    }

    async fn fetch_forecast(
        &self,
        request: &ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, ProviderError> {
        tracing::info!(provider = NAME, params = %request.params(), "making forecast request");

        let req = require_api_key(NAME, &self.api_key).map(|key| {
            self.http.get(&self.base_url).query(&[
                ("lat", request.coordinate.latitude.to_string()),
                ("lon", request.coordinate.longitude.to_string()),
                ("units", "metric".to_string()),
                ("appid", key.to_string()),
            ])
        });

        let body = execute(NAME, &self.http, req, cancel, upstream_message).await?;

        let parsed: OwForecastResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::decode(NAME, &e))?;

        tracing::debug!(provider = NAME, items = parsed.list.len(), "parsed forecast response");

        let forecast = reduce_daily(NAME, samples(&parsed.list), request.day_count as usize);
        if forecast.is_empty() {
            return Err(ProviderError::no_data(NAME));
        }

        Ok(ProviderResult { provider: NAME.to_string(), request: *request, forecast })
    }
}
