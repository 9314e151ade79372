use crate::{
    Config, ForecastRequest, ProviderResult,
    error::ProviderError,
    provider::{
        openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::{convert::TryFrom, fmt::Debug, sync::Arc};
use tokio_util::sync::CancellationToken;

pub mod openmeteo;
pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    OpenMeteo,
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "open-meteo",
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::OpenWeather, ProviderId::WeatherApi]
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::OpenMeteo)
    }

    /// Environment variable consulted for this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "OPEN_METEO_API_KEY",
            ProviderId::OpenWeather => "OPENWEATHER_API_KEY",
            ProviderId::WeatherApi => "WEATHERAPI_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: open-meteo, openweather, weatherapi."
            )),
        }
    }
}

/// A single upstream forecast source.
///
/// Implementations issue one HTTP request per call and must not panic; every
/// failure is reported as a [`ProviderError`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Stable, non-empty key under which results appear in the aggregate.
    fn identity(&self) -> &str;

    async fn fetch_forecast(
        &self,
        request: &ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, ProviderError>;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let provider_cfg = config.provider_config(id);
    let api_key = config.provider_api_key(id);

    if id.requires_api_key() && api_key.is_none() {
        return Err(anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
             Hint: run `weather configure {id}` and enter your API key."
        ));
    }

    let base_url = provider_cfg.and_then(|cfg| cfg.base_url.clone());
    let api_key = api_key.unwrap_or_default().to_owned();

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenMeteo => {
            let mut p = OpenMeteoProvider::new().with_client(http);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderId::OpenWeather => {
            let mut p = OpenWeatherProvider::new(api_key).with_client(http);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderId::WeatherApi => {
            let mut p = WeatherApiProvider::new(api_key).with_client(http);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
    };

    Ok(provider)
}

/// Build every provider listed in the config, sharing one HTTP client.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn WeatherProvider>>> {
    let http = Client::builder()
        .user_agent(concat!("weather-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    config
        .enabled_providers()?
        .into_iter()
        .map(|id| provider_from_config(id, config, http.clone()))
        .collect()
}

/// Sends `request` and returns the body of a 200 response.
///
/// Fails fast when `cancel` already fired, before any construction error carried by
/// `request` is reported, and abandons the exchange as soon as it fires mid-flight.
/// `upstream_message` pulls a readable message out of the provider's error body.
pub(crate) async fn execute(
    provider: &str,
    http: &Client,
    request: Result<RequestBuilder, ProviderError>,
    cancel: &CancellationToken,
    upstream_message: fn(&str) -> Option<String>,
) -> Result<String, ProviderError> {
    if cancel.is_cancelled() {
        tracing::debug!(provider, "cancelled before sending request");
        return Err(ProviderError::cancelled(provider));
    }

    let request = request?
        .build()
        .map_err(|e| ProviderError::request_construction(provider, e.to_string()))?;

    tracing::debug!(
        provider,
        host = request.url().host_str().unwrap_or_default(),
        path = request.url().path(),
        "sending forecast request"
    );

    let exchange = async {
        let res = http.execute(request).await.map_err(|e| ProviderError::transport(provider, &e))?;
        let status = res.status();
        let body = res.text().await.map_err(|e| ProviderError::transport(provider, &e))?;
        Ok::<_, ProviderError>((status, body))
    };

    let (status, body) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProviderError::cancelled(provider)),
        outcome = exchange => outcome?,
    };

    tracing::info!(provider, status = status.as_u16(), bytes = body.len(), "received forecast response");

    if status != StatusCode::OK {
        let message = upstream_message(&body).unwrap_or_else(|| truncate_body(&body));
        return Err(ProviderError::HttpStatus {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    Ok(body)
}

/// Rejects a blank API key as adapter misconfiguration.
pub(crate) fn require_api_key<'a>(provider: &str, api_key: &'a str) -> Result<&'a str, ProviderError> {
    if api_key.trim().is_empty() {
        return Err(ProviderError::request_construction(provider, "API key cannot be empty"));
    }
    Ok(api_key)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
