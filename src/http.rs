//! HTTP transport module for risk-predictor
//!
//! Axum server exposing `POST /predict` and `GET /health`, with a CORS
//! allow-list for the front-end origins.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::error::{Result, RiskError};
use crate::models::ModelProvider;
use crate::prediction::{ResponseBatch, predict_records};

/// Shared state for HTTP server
#[derive(Clone)]
pub struct HttpState {
    pub config: Arc<Config>,
    pub models: Arc<ModelProvider>,
}

fn default_include_id() -> Option<bool> {
    Some(true)
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub data: Value,
    /// Explicit `null` disables id passthrough, same as `false`.
    #[serde(default = "default_include_id")]
    pub include_id: Option<bool>,
}

/// Error body in `{"detail": ...}` form.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    fn bad_request(detail: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail,
        }
    }

    fn internal(detail: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Health check endpoint
pub async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "model_load_error": state.models.load_error().await,
    }))
}

/// Prediction endpoint
pub async fn predict_handler(
    State(state): State<HttpState>,
    body: Bytes,
) -> std::result::Result<Json<ResponseBatch>, ApiError> {
    let request: PredictRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;

    let models = state
        .models
        .get_models()
        .await
        .map_err(|e| ApiError::internal(format!("Model load error: {}", e)))?;

    let include_id = request.include_id.unwrap_or(false);
    let outcome = tokio::task::spawn_blocking(move || {
        predict_records(
            request.data,
            models.classifier.as_ref(),
            models.regressor.as_ref(),
            include_id,
        )
    })
    .await
    .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e)))?;

    match outcome {
        Ok(batch) => {
            tracing::debug!("Predicted {} record(s)", batch.len());
            Ok(Json(batch))
        }
        Err(e) => {
            tracing::warn!("Prediction failed: {}", e);
            Err(ApiError::bad_request(format!("Prediction failed: {}", e)))
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Skipping invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let resp = next.run(req).await;
    tracing::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        resp.status().as_u16(),
        start.elapsed().as_millis()
    );
    resp
}

/// Build the application router around `state`.
pub fn router(state: HttpState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(config: Arc<Config>, models: Arc<ModelProvider>) -> Result<()> {
    let bind = config.server.bind;
    let app = router(HttpState { config, models });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| RiskError::Internal {
            message: format!("Failed to bind HTTP listener on {}: {}", bind, e),
        })?;

    tracing::info!("Starting HTTP server on {}", bind);

    axum::serve(listener, app)
        .await
        .map_err(|e| RiskError::Internal {
            message: format!("HTTP server error: {}", e),
        })?;

    Ok(())
}
