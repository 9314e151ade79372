use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use std::fmt::Write as _;
use weather_core::{
    AggregateResult, Aggregator, CancellationToken, Config, ForecastLimits, ForecastRequest,
    ProviderId, providers_from_config, validate,
};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Multi-provider weather forecast CLI")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enable a provider and store its credentials.
    Configure {
        /// Provider short name, e.g. "open-meteo", "openweather" or "weatherapi".
        provider: String,

        /// API key; prompted for interactively when the provider needs one.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show the forecast of every configured provider for a coordinate.
    Show {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Number of forecast days; defaults to the configured window.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Serve `GET /weather?lat=..&lon=..&days=..` over HTTP.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    pub fn default_log_level(&self) -> &'static str {
        match (&self.command, self.verbose) {
            (_, true) => "debug",
            (Command::Serve { .. }, false) => "info",
            _ => "warn",
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider, api_key } => configure(&provider, api_key),
            Command::Show { lat, lon, days } => show(lat, lon, days).await,
            Command::Serve { host, port } => {
                let mut config = load_config()?;
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
                server::serve(&config).await
            }
        }
    }
}

/// File config with environment overrides layered on top.
fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

pub fn build_aggregator(config: &Config) -> anyhow::Result<Aggregator> {
    let providers = providers_from_config(config)?;
    Ok(Aggregator::new(providers, config.forecast.failure_policy).with_span(service_span()))
}

/// Root span for everything the aggregator logs on behalf of this binary.
fn service_span() -> tracing::Span {
    tracing::info_span!("weather", app = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"))
}

fn configure(provider: &str, api_key: Option<String>) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let key = match api_key {
            Some(key) => key,
            None => Password::new(&format!("API key for {id}:"))
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .prompt()
                .context("Failed to read API key")?,
        };
        if key.trim().is_empty() {
            anyhow::bail!("API key for '{id}' cannot be empty");
        }
        config.upsert_provider_api_key(id, key.trim().to_string());
    } else {
        config.enable_provider(id);
    }

    config.save()?;
    println!("Provider '{id}' enabled. Config saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(lat: f64, lon: f64, days: Option<u32>) -> anyhow::Result<()> {
    let config = load_config()?;
    let limits = ForecastLimits::from(&config.forecast);
    let days = days.unwrap_or(limits.default_days);

    validate::validate_coordinate(lat, lon)?;
    validate::validate_days(days, limits)?;

    let aggregator = build_aggregator(&config)?;
    let request = ForecastRequest::new(lat, lon, days);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let aggregate = aggregator.fetch_forecasts(request, &cancel).await?;
    print!("{}", render(&request, &aggregate));
    Ok(())
}

/// Plain-text table, one block per provider in name order.
fn render(request: &ForecastRequest, aggregate: &AggregateResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Forecast for {:.4}, {:.4} ({} days)",
        request.coordinate.latitude, request.coordinate.longitude, request.day_count
    );

    for name in aggregate.providers() {
        let _ = writeln!(out, "\n{name}");
        let Some(result) = aggregate.get(name) else { continue };

        if result.is_empty() {
            let reason = aggregate.failures().get(name).map(String::as_str).unwrap_or("no data");
            let _ = writeln!(out, "  unavailable: {reason}");
            continue;
        }

        for day in &result.forecast {
            let _ = writeln!(
                out,
                "  {}  max {:>6.1}°C  min {:>6.1}°C",
                day.date, day.temp_max, day.temp_min
            );
        }
    }

    for (name, reason) in aggregate.failures() {
        if !aggregate.contains(name) {
            let _ = writeln!(out, "\n{name}\n  unavailable: {reason}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use weather_core::{
        DailyForecast, FailurePolicy, ProviderError, ProviderResult, WeatherProvider,
    };

    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl WeatherProvider for Fixed {
        fn identity(&self) -> &str {
            self.name
        }

        async fn fetch_forecast(
            &self,
            request: &ForecastRequest,
            _cancel: &CancellationToken,
        ) -> Result<ProviderResult, ProviderError> {
            if self.fail {
                return Err(ProviderError::NoData { provider: self.name.to_string() });
            }
            Ok(ProviderResult {
                provider: self.name.to_string(),
                request: *request,
                forecast: vec![DailyForecast {
                    date: NaiveDate::from_ymd_opt(2025, 7, 25).unwrap(),
                    temp_max: 25.0,
                    temp_min: 15.5,
                }],
            })
        }
    }

    async fn aggregate(policy: FailurePolicy) -> (ForecastRequest, AggregateResult) {
        let providers: Vec<Arc<dyn WeatherProvider>> = vec![
            Arc::new(Fixed { name: "open-meteo", fail: false }),
            Arc::new(Fixed { name: "weatherapi", fail: true }),
        ];
        let request = ForecastRequest::new(40.7128, -74.006, 1);
        let result = Aggregator::new(providers, policy)
            .fetch_forecasts(request, &CancellationToken::new())
            .await
            .unwrap();
        (request, result)
    }

    #[tokio::test]
    async fn render_lists_days_and_failures() {
        let (request, result) = aggregate(FailurePolicy::Placeholder).await;
        let text = render(&request, &result);

        assert!(text.starts_with("Forecast for 40.7128, -74.0060 (1 days)"));
        assert!(text.contains("open-meteo\n  2025-07-25  max   25.0°C  min   15.5°C"));
        assert!(text.contains("weatherapi\n  unavailable: weatherapi: no forecast data available"));
    }

    #[tokio::test]
    async fn render_mentions_omitted_providers() {
        let (request, result) = aggregate(FailurePolicy::Omit).await;
        let text = render(&request, &result);

        assert!(text.contains("weatherapi\n  unavailable:"));
    }

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from(["weather", "show", "--lat", "-33.86", "--lon", "-151.2", "--days", "3"])
            .unwrap();

        match cli.command {
            Command::Show { lat, lon, days } => {
                assert_eq!(lat, -33.86);
                assert_eq!(lon, -151.2);
                assert_eq!(days, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(
            Cli::try_parse_from(["weather", "show", "--lat", "1", "--lon", "2"]).unwrap().default_log_level(),
            "warn"
        );
    }

    #[test]
    fn serve_logs_at_info_by_default() {
        let cli = Cli::try_parse_from(["weather", "serve", "--port", "9000"]).unwrap();
        assert_eq!(cli.default_log_level(), "info");

        let cli = Cli::try_parse_from(["weather", "-v", "serve"]).unwrap();
        assert_eq!(cli.default_log_level(), "debug");
    }

    #[test]
    fn build_aggregator_uses_configured_providers() {
        let mut config = Config::default();
        config.upsert_provider_api_key(ProviderId::OpenWeather, "KEY".into());

        let aggregator = build_aggregator(&config).unwrap();
        let mut names = aggregator.provider_names();
        names.sort_unstable();

        assert_eq!(names, vec!["open-meteo", "openweather"]);
        assert_eq!(aggregator.policy(), FailurePolicy::Placeholder);
    }
}
