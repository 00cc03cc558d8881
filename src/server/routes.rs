// src/server/routes.rs

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::task;
use tracing::warn;

use super::AppState;
use crate::error::ForecastError;
use crate::fetch::fetch_feed;
use crate::forecast::forecast_table;
use crate::graph::render_placeholder_png;
use crate::process::feed::parse_feed;

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub forecast_dates: Vec<String>,
    pub arima_forecast: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ForecastError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(code = self.code(), status = %status, error = %self, "request failed");
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// `GET /forecast`: fetch the feed, parse it, forecast the next seven days of Ap.
pub async fn forecast(
    State(state): State<AppState>,
) -> Result<Json<ForecastResponse>, ForecastError> {
    let text = fetch_feed(&state.client, &state.config.feed_url, &state.config.fetch).await?;

    // parsing and the likelihood search are CPU-bound
    let result = task::spawn_blocking(move || {
        let table = parse_feed(&text)?;
        forecast_table(&table)
    })
    .await
    .map_err(|e| ForecastError::Model(format!("forecast task failed: {}", e)))??;

    Ok(Json(ForecastResponse {
        forecast_dates: result.dates(),
        arima_forecast: result.values(),
    }))
}

/// `GET /graph`: the fixed placeholder chart as a transparent PNG.
pub async fn graph() -> Result<impl IntoResponse, ForecastError> {
    let png = task::spawn_blocking(render_placeholder_png)
        .await
        .map_err(|e| ForecastError::Render(format!("render task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "apforecast",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
