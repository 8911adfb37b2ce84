//! HTTP surface: health, price and metrics routes

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::aggregator::GlobalPrice;
use crate::error::PriceIndexError;
use crate::service::PriceIndex;
use crate::venue::normalize_pair;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<PriceIndexError> for ApiError {
    fn from(err: PriceIndexError) -> Self {
        match err {
            PriceIndexError::InvalidPair(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(index: Arc<PriceIndex>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/price/:pair", get(price))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(index)
}

async fn health_check(State(index): State<Arc<PriceIndex>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "component": "price-index",
        "venues": index.connection_states(),
        "tracked_pairs": index.tracked_pairs().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Track the pair if needed and answer with its global price
async fn price(
    State(index): State<Arc<PriceIndex>>,
    Path(pair): Path<String>,
) -> Result<Json<GlobalPrice>, ApiError> {
    let pair = normalize_pair(&pair)?;

    let price = if index.ensure_tracked(&pair).await? {
        index
            .wait_for_price(&pair, index.config().first_quote_wait())
            .await
    } else {
        index.global_price(&pair).await
    };

    if !price.is_available() {
        return Err(ApiError::NotFound(format!(
            "Price not found for pair {}",
            pair
        )));
    }
    Ok(Json(price))
}

async fn metrics(State(index): State<Arc<PriceIndex>>) -> Result<Response, ApiError> {
    let body = index.metrics().encode()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
