//! Knowledge index publishing.

use super::ApiError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use folio_core::{build_corpus, IndexStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    #[serde(default)]
    pub clear_first: bool,
}

/// POST /api/index-portfolio: rebuild the corpus from the profile and publish it.
pub async fn index_portfolio(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IndexRequest>>,
) -> Result<Json<Value>, ApiError> {
    if !state.publisher.is_configured() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Knowledge index not configured",
        ));
    }
    let clear_first = body.map(|Json(b)| b.clear_first).unwrap_or(false);
    let docs = build_corpus(&state.profile);
    tracing::info!(target: "folio::publish", documents = docs.len(), clear_first, "Publishing corpus");

    let report = state
        .publisher
        .publish(&docs, clear_first)
        .await
        .map_err(|e| {
            tracing::error!(target: "folio::publish", "Publish failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    if !report.success {
        let error = report
            .error
            .unwrap_or_else(|| "Publishing failed".to_string());
        return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Portfolio indexed successfully",
        "stats": report.stats,
        "failed": report.failed,
        "cleared": report.cleared,
    })))
}

/// GET /api/index-portfolio
pub async fn index_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let index = state.publisher.status().await;
    Json(json!({
        "success": index.status != IndexStatus::NotConfigured,
        "count": index.count,
        "status": index.status,
    }))
}
