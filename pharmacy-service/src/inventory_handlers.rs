use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common_http_errors::{ApiError, ApiResult};

use crate::evaluator::{self, NEAR_EXPIRY_WINDOW_DAYS};
use crate::models::{AvailabilityReport, DispenseReport, InventoryAlert, Medicine, PrescriptionLine};
use crate::reconciler::{ReconcileOutcome, SweepReport};
use crate::store::{AlertStore, StockLedger};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LinesPayload {
    pub lines: Vec<PrescriptionLine>,
}

#[derive(Debug, Deserialize)]
pub struct DispensePayload {
    pub lines: Vec<PrescriptionLine>,
    pub dispensed_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RestockPayload {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct InventoryStatus {
    pub total_medicines: usize,
    pub out_of_stock: usize,
    pub low_stock: usize,
    pub expired: usize,
    pub near_expiry: usize,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub medicine: Medicine,
    pub reconcile: ReconcileOutcome,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub outcome: ReconcileOutcome,
    pub active_alerts: Vec<InventoryAlert>,
}

fn validate_lines(lines: &[PrescriptionLine], empty_code: &'static str) -> Result<(), ApiError> {
    if lines.is_empty() {
        return Err(ApiError::bad_request(empty_code, None));
    }
    if lines.iter().any(|l| l.quantity <= 0) {
        return Err(ApiError::BadRequest {
            code: "invalid_quantity",
            trace_id: None,
            message: Some("line quantity must be positive".into()),
        });
    }
    Ok(())
}

pub async fn list_inventory(State(state): State<AppState>) -> ApiResult<Json<Vec<Medicine>>> {
    let medicines = state.store.list().await?;
    Ok(Json(medicines))
}

/// Dashboard counts derived from the same evaluator the reconciler uses, so
/// the status view and the alert table cannot disagree about thresholds.
pub async fn inventory_status(State(state): State<AppState>) -> ApiResult<Json<InventoryStatus>> {
    let medicines = state.store.list().await?;
    let today = Utc::now().date_naive();
    let mut status = InventoryStatus {
        total_medicines: medicines.len(),
        out_of_stock: 0,
        low_stock: 0,
        expired: 0,
        near_expiry: 0,
    };
    for medicine in &medicines {
        if medicine.quantity <= 0 {
            status.out_of_stock += 1;
        } else if medicine.quantity <= medicine.min_stock {
            status.low_stock += 1;
        }
        if medicine.expiry < today {
            status.expired += 1;
        } else if medicine.expiry < today + chrono::Duration::days(NEAR_EXPIRY_WINDOW_DAYS) {
            status.near_expiry += 1;
        }
    }
    Ok(Json(status))
}

pub async fn check_availability(
    State(state): State<AppState>,
    Json(payload): Json<LinesPayload>,
) -> ApiResult<Json<AvailabilityReport>> {
    validate_lines(&payload.lines, "empty_lines")?;
    let report = state.engine.check_availability(&payload.lines).await?;
    Ok(Json(report))
}

pub async fn dispense(
    State(state): State<AppState>,
    Json(payload): Json<DispensePayload>,
) -> ApiResult<Json<DispenseReport>> {
    validate_lines(&payload.lines, "empty_dispense")?;
    if payload.dispensed_by.trim().is_empty() {
        return Err(ApiError::bad_request("missing_actor", None));
    }
    let report = state
        .engine
        .dispense(&payload.lines, payload.dispensed_by.trim())
        .await?;
    Ok(Json(report))
}

pub async fn restock(
    State(state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
    Json(payload): Json<RestockPayload>,
) -> ApiResult<Json<RestockResponse>> {
    if payload.quantity <= 0 {
        return Err(ApiError::BadRequest {
            code: "invalid_quantity",
            trace_id: None,
            message: Some("restock quantity must be positive".into()),
        });
    }
    state.store.increment(medicine_id, payload.quantity).await?;
    let reconcile = state.reconciler.reconcile_one(medicine_id).await?;
    let medicine = state
        .store
        .get(medicine_id)
        .await?
        .ok_or_else(|| ApiError::not_found("medicine_not_found"))?;
    Ok(Json(RestockResponse {
        medicine,
        reconcile,
    }))
}

pub async fn reconcile_medicine(
    State(state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
) -> ApiResult<Json<ReconcileResponse>> {
    let outcome = state.reconciler.reconcile_one(medicine_id).await?;
    let active_alerts = state.store.list_active_for_medicine(medicine_id).await?;
    Ok(Json(ReconcileResponse {
        outcome,
        active_alerts,
    }))
}

pub async fn reconcile_inventory(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let report = state
        .reconciler
        .reconcile_all(state.reconcile_timeout)
        .await?;
    Ok(Json(report))
}

/// Suggested reorder quantities for everything at or below half its
/// threshold.
#[derive(Debug, Serialize)]
pub struct ReorderLine {
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub current_quantity: i32,
    pub min_stock: i32,
    pub suggested_quantity: i32,
}

pub async fn reorder_suggestions(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ReorderLine>>> {
    let medicines = state.store.list().await?;
    let suggestions = medicines
        .into_iter()
        .filter_map(|m| {
            evaluator::reorder_suggestion(&m).map(|suggested| ReorderLine {
                medicine_id: m.id,
                medicine_name: m.name,
                current_quantity: m.quantity,
                min_stock: m.min_stock,
                suggested_quantity: suggested,
            })
        })
        .collect();
    Ok(Json(suggestions))
}
