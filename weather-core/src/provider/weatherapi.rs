use async_trait::async_trait;
use chrono::NaiveDate;
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

pub const WEATHERAPI_URL: &str = "https://api.weatherapi.com/v1/forecast.json";

const NAME: &str = "weatherapi";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key, base_url: WEATHERAPI_URL.to_string(), http: Client::new() }
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
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: String,
    day: WaDay,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaErrorDetail {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaErrorDetail,
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<WaErrorResponse>(body)
        .ok()
        .map(|e| format!("{} (code {})", e.error.message, e.error.code))
}

fn samples(days: &[WaForecastDay]) -> Vec<Sample> {
    days.iter()
        .filter_map(|fd| match NaiveDate::parse_from_str(&fd.date, "%Y-%m-%d") {
            Ok(date) => Some(Sample { date, temp_min: fd.day.mintemp_c, temp_max: fd.day.maxtemp_c }),
            Err(err) => {
                tracing::warn!(provider = NAME, date = %fd.date, %err, "skipping day with bad date");
                None
            }
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn identity(&self) -> &str {
        NAME
    }

    async fn fetch_forecast(
        &self,
        request: &ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, ProviderError> {
        tracing::info!(provider = NAME, params = %request.params(), "making forecast request");

        let q = format!("{},{}", request.coordinate.latitude, request.coordinate.longitude);
        let days = request.day_count.to_string();
        let req = require_api_key(NAME, &self.api_key).map(|key| {
            self.http.get(&self.base_url).query(&[
                ("key", key),
                ("q", q.as_str()),
                ("days", days.as_str()),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
        });

        let body = execute(NAME, &self.http, req, cancel, upstream_message).await?;

        let parsed: WaForecastResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::decode(NAME, &e))?;

        tracing::debug!(
            provider = NAME,
            days = parsed.forecast.forecastday.len(),
            "parsed forecast response"
        );

        let forecast =
            reduce_daily(NAME, samples(&parsed.forecast.forecastday), request.day_count as usize);
        if forecast.is_empty() {
            return Err(ProviderError::no_data(NAME));
        }

        Ok(ProviderResult { provider: NAME.to_string(), request: *request, forecast })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const BODY: &str = r#"{
        "location": {"name": "New York", "country": "United States of America", "localtime_epoch": 1753452000},
        "forecast": {"forecastday": [
            {"date": "2025-07-25", "day": {"maxtemp_c": 31.2, "mintemp_c": 23.4}, "hour": []},
            {"date": "2025-07-26", "day": {"maxtemp_c": 29.8, "mintemp_c": 22.1}, "hour": []},
            {"date": "2025-07-27", "day": {"maxtemp_c": 27.0, "mintemp_c": 21.0}, "hour": []}
        ]}
    }"#;

    fn provider(server: &mockito::Server) -> WeatherApiProvider {
        WeatherApiProvider::new("KEY".into()).with_base_url(format!("{}/v1/forecast.json", server.url()))
    }

    #[tokio::test]
    async fn parses_forecast_days() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "KEY".into()),
                Matcher::UrlEncoded("q".into(), "40.7128,-74.006".into()),
                Matcher::UrlEncoded("days".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let result = provider(&server)
            .fetch_forecast(&ForecastRequest::new(40.7128, -74.006, 2), &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.provider, "weatherapi");
        assert_eq!(result.forecast.len(), 2);
        assert_eq!(result.forecast[0].temp_max, 31.2);
        assert_eq!(result.forecast[0].temp_min, 23.4);
        assert_eq!(result.forecast[1].date, NaiveDate::from_ymd_opt(2025, 7, 26).unwrap());
    }

    #[tokio::test]
    async fn error_body_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": {"code": 2008, "message": "API key has been disabled."}}"#)
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_forecast(&ForecastRequest::new(0.0, 0.0, 2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::HttpStatus {
                provider: "weatherapi".into(),
                status: 403,
                message: "API key has been disabled. (code 2008)".into(),
            }
        );
    }

    #[tokio::test]
    async fn unparseable_error_body_is_truncated_raw_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_forecast(&ForecastRequest::new(0.0, 0.0, 2), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ProviderError::HttpStatus { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_shape_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"current": {"temp_c": 20.0}}"#)
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_forecast(&ForecastRequest::new(0.0, 0.0, 2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn blank_api_key_is_a_construction_error() {
        let err = WeatherApiProvider::new("  ".into())
            .fetch_forecast(&ForecastRequest::new(0.0, 0.0, 2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RequestConstruction { .. }));
    }

    #[tokio::test]
    async fn cancellation_wins_over_blank_api_key() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = WeatherApiProvider::new(String::new())
            .fetch_forecast(&ForecastRequest::new(0.0, 0.0, 2), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.provider(), "weatherapi");
    }
}
