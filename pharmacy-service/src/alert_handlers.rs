use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common_http_errors::{ApiError, ApiResult};

use crate::models::{AlertSummary, InventoryAlert};
use crate::store::AlertStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub by: String,
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

fn actor(payload: &ActorPayload) -> Result<&str, ApiError> {
    let by = payload.by.trim();
    if by.is_empty() {
        return Err(ApiError::bad_request("missing_actor", None));
    }
    Ok(by)
}

/// Active alerts, critical first, oldest first within a severity.
pub async fn list_alerts(State(state): State<AppState>) -> ApiResult<Json<Vec<InventoryAlert>>> {
    let alerts = state.store.list_active().await?;
    Ok(Json(alerts))
}

pub async fn alert_summary(State(state): State<AppState>) -> ApiResult<Json<AlertSummary>> {
    let summary = state.store.active_summary().await?;
    Ok(Json(summary))
}

pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<Json<InventoryAlert>> {
    let by = actor(&payload)?;
    let alert = state.store.acknowledge(alert_id, by).await?;
    Ok(Json(alert))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<Json<InventoryAlert>> {
    let by = actor(&payload)?;
    let alert = state.store.resolve_by_id(alert_id, by).await?;
    Ok(Json(alert))
}

pub async fn purge_resolved(
    State(state): State<AppState>,
    Query(params): Query<PurgeParams>,
) -> ApiResult<Json<PurgeResponse>> {
    let days = params.older_than_days.unwrap_or(state.alert_retention_days);
    if days < 0 {
        return Err(ApiError::bad_request("invalid_retention", None));
    }
    let cutoff = Utc::now() - Duration::days(days);
    let purged = state.store.purge_resolved_older_than(cutoff).await?;
    Ok(Json(PurgeResponse { purged }))
}
