pub mod alert_handlers;
pub mod dispensing;
pub mod evaluator;
pub mod inventory_handlers;
pub mod models;
pub mod notifications;
pub mod pg;
pub mod reconciler;
pub mod store;

pub use crate::alert_handlers::*;
pub use crate::inventory_handlers::*;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use common_http_errors::ApiError;
use common_observability::PharmacyMetrics;

use crate::dispensing::DispensingEngine;
use crate::notifications::Notifier;
use crate::pg::PgStore;
use crate::reconciler::Reconciler;
use crate::store::StoreError;

pub const DEFAULT_RECONCILE_SWEEP_SECS: u64 = 3600;
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ALERT_RETENTION_DAYS: i64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgStore>,
    pub engine: DispensingEngine<PgStore, PgStore>,
    pub reconciler: Reconciler<PgStore, PgStore>,
    pub metrics: Arc<PharmacyMetrics>,
    pub reconcile_timeout: Duration,
    pub alert_retention_days: i64,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        notifier: Notifier,
        metrics: Arc<PharmacyMetrics>,
        reconcile_timeout: Duration,
        alert_retention_days: i64,
    ) -> Self {
        let store = Arc::new(PgStore::new(pool));
        let reconciler = Reconciler::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            metrics.clone(),
        );
        let engine = DispensingEngine::new(
            store.clone(),
            reconciler.clone(),
            notifier,
            metrics.clone(),
        );
        Self {
            store,
            engine,
            reconciler,
            metrics,
            reconcile_timeout,
            alert_retention_days,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MedicineNotFound(_) => ApiError::not_found("medicine_not_found"),
            StoreError::InvalidQuantity(got) => ApiError::BadRequest {
                code: "invalid_quantity",
                trace_id: None,
                message: Some(format!("quantity must be positive, got {got}")),
            },
            StoreError::AlertNotFound(_) => ApiError::not_found("alert_not_found"),
            StoreError::AlertNotActionable(id) => ApiError::Conflict {
                code: "alert_not_active",
                trace_id: None,
                message: Some(format!("alert {id} is not in an actionable state")),
            },
            other => ApiError::internal(other, None),
        }
    }
}
