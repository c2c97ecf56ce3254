//! Contact form intake and the admin inbox.

use super::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use folio_core::contact::DEFAULT_LIST_LIMIT;
use folio_core::{ContactError, ContactStatus, ContactStore, NewContact};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Run a SQLite call on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&ContactStore) -> Result<T, ContactError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.contacts.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| {
            tracing::error!(target: "folio::contact", "Contact task failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Contact storage unavailable")
        })?
        .map_err(ApiError::from)
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(form): Json<NewContact>,
) -> Result<Json<Value>, ApiError> {
    let contact = form.validate()?;
    let row = with_store(&state, move |store| store.save(&contact)).await?;

    // The row is stored; a failed email only gets logged.
    if let Err(e) = state.notifier.notify(&row).await {
        tracing::warn!(target: "folio::contact", id = row.id, "Notification failed: {}", e);
    }
    Ok(Json(json!({
        "success": true,
        "message": "Your message has been sent successfully!",
        "id": row.id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = query
        .status
        .filter(|s| !s.is_empty() && s != "all")
        .map(|s| s.parse::<ContactStatus>())
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let rows = with_store(&state, move |store| store.list(status, limit)).await?;
    Ok(Json(json!({ "success": true, "data": rows })))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let stats = with_store(&state, |store| store.stats()).await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, ApiError> {
    let status: ContactStatus = update.status.parse()?;
    with_store(&state, move |store| store.update_status(id, status)).await?;
    Ok(Json(json!({ "success": true, "message": "Contact status updated" })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    with_store(&state, move |store| store.delete(id)).await?;
    Ok(Json(json!({ "success": true, "message": "Contact deleted" })))
}
