//! HTTP front-end: `GET /weather` backed by the aggregator.

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use weather_core::{
    Aggregator, CancellationToken, Config, DailyForecast, ForecastLimits, ForecastQuery,
    ForecastResponse,
};

use crate::cli::build_aggregator;

#[derive(Clone)]
pub struct AppState {
    aggregator: Arc<Aggregator>,
    limits: ForecastLimits,
}

impl AppState {
    pub fn new(aggregator: Aggregator, limits: ForecastLimits) -> Self {
        Self { aggregator: Arc::new(aggregator), limits }
    }
}

#[derive(Debug, Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Weather API", description = "Daily forecasts aggregated across providers"),
    paths(get_weather, health),
    components(schemas(ForecastResponse, DailyForecast, ErrorResponse)),
    tags((name = "Weather", description = "Forecast endpoints"))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    let openapi = ApiDoc::openapi();
    let doc = openapi.clone();

    Router::new()
        .route("/weather", get(get_weather))
        .route("/health", get(health))
        .route("/swagger/doc.json", get(|| async { Json(doc) }))
        .route("/openapi.json", get(|| async { Json(openapi) }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String)),
    tag = "Weather"
)]
async fn health() -> &'static str {
    "ok"
}

/// Daily forecast from every configured provider
#[utoipa::path(
    get,
    path = "/weather",
    params(
        ("lat" = f64, Query, description = "Latitude, between -90 and 90"),
        ("lon" = f64, Query, description = "Longitude, between -180 and 180"),
        ("days" = Option<u32>, Query, description = "Number of days to forecast, 1 to 5 by default"),
    ),
    responses(
        (status = 200, description = "Forecasts keyed by provider", body = ForecastResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "No provider returned a forecast", body = ErrorResponse),
    ),
    tag = "Weather"
)]
async fn get_weather(State(state): State<AppState>, Query(query): Query<ForecastQuery>) -> Response {
    let request = match query.validate(state.limits) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, ?query, "rejected forecast request");
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    // Providers are cancelled if the client goes away and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.aggregator.fetch_forecasts(request, &cancel).await {
        Ok(aggregate) => Json(ForecastResponse::new(&request, &aggregate)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, params = %request.params(), "forecast request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch weather data")
        }
    }
}

pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let aggregator = build_aggregator(config)?;
    tracing::info!(providers = ?aggregator.provider_names(), "providers configured");

    let state = AppState::new(aggregator, ForecastLimits::from(&config.forecast));
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "application started successfully");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::warn!("stopped application services");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}
