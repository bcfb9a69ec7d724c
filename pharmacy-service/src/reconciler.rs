use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use common_observability::PharmacyMetrics;

use crate::evaluator::{evaluate, reorder_suggestion, AlertCondition};
use crate::models::{AlertType, InventoryAlert, Medicine};
use crate::notifications::{
    AlertEvent, Notifier, EVENT_EXPIRED, EVENT_LOW_STOCK, EVENT_NEAR_EXPIRY, EVENT_OUT_OF_STOCK,
    EVENT_REORDER_REQUIRED,
};
use crate::store::{AlertStore, StockLedger, StoreError, UpsertOutcome, SYSTEM_ACTOR};

/// What a single reconciliation changed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub raised: Vec<AlertType>,
    pub refreshed: Vec<AlertType>,
    pub resolved: Vec<AlertType>,
}

/// Result of a full-inventory sweep. Per-medicine failures are logged and
/// counted, never propagated, so one bad row cannot stall the sweep.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub failed: usize,
}

/// Drives alert state toward what the evaluator says it should be. Runs after
/// every stock mutation and on the periodic sweep; both paths converge on the
/// same per-medicine pass, so alerts self-heal even if an earlier update was
/// missed.
pub struct Reconciler<L, A> {
    ledger: Arc<L>,
    alerts: Arc<A>,
    notifier: Notifier,
    metrics: Arc<PharmacyMetrics>,
}

impl<L, A> Clone for Reconciler<L, A> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            alerts: self.alerts.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<L, A> Reconciler<L, A>
where
    L: StockLedger,
    A: AlertStore,
{
    pub fn new(
        ledger: Arc<L>,
        alerts: Arc<A>,
        notifier: Notifier,
        metrics: Arc<PharmacyMetrics>,
    ) -> Self {
        Self {
            ledger,
            alerts,
            notifier,
            metrics,
        }
    }

    /// Reconciles one medicine: raises or refreshes alerts whose condition
    /// holds, resolves active alerts whose condition has cleared, and leaves
    /// acknowledged alerts untouched.
    pub async fn reconcile_one(&self, medicine_id: Uuid) -> Result<ReconcileOutcome, StoreError> {
        let medicine = self
            .ledger
            .get(medicine_id)
            .await?
            .ok_or(StoreError::MedicineNotFound(medicine_id))?;

        self.heal_duplicate_actives(&medicine).await?;

        let conditions = evaluate(&medicine, Utc::now().date_naive());
        let mut outcome = ReconcileOutcome::default();

        for alert_type in AlertType::ALL {
            match conditions.iter().find(|c| c.alert_type == alert_type) {
                Some(condition) => match self.alerts.upsert_active(&medicine, condition).await? {
                    UpsertOutcome::Created => {
                        self.metrics
                            .alerts_raised_total
                            .with_label_values(&[alert_type.as_str()])
                            .inc();
                        self.notifier.emit(alert_event(&medicine, condition)).await;
                        outcome.raised.push(alert_type);
                    }
                    UpsertOutcome::Refreshed => outcome.refreshed.push(alert_type),
                    UpsertOutcome::Suppressed => {}
                },
                None => {
                    if self
                        .alerts
                        .resolve_active(medicine.id, alert_type, SYSTEM_ACTOR)
                        .await?
                    {
                        self.metrics
                            .alerts_resolved_total
                            .with_label_values(&[alert_type.as_str()])
                            .inc();
                        outcome.resolved.push(alert_type);
                    }
                }
            }
        }

        let raised_stock_alert = outcome
            .raised
            .iter()
            .any(|t| matches!(t, AlertType::LowStock | AlertType::OutOfStock));
        if raised_stock_alert {
            if let Some(suggested) = reorder_suggestion(&medicine) {
                self.notifier
                    .emit(AlertEvent {
                        event_type: EVENT_REORDER_REQUIRED,
                        medicine_name: medicine.name.clone(),
                        severity: "HIGH".into(),
                        timestamp: Utc::now(),
                        detail: json!({
                            "medicine_id": medicine.id,
                            "current_quantity": medicine.quantity,
                            "min_stock": medicine.min_stock,
                            "suggested_quantity": suggested,
                        }),
                    })
                    .await;
            }
        }

        Ok(outcome)
    }

    /// Walks the whole ledger. Each medicine gets its own deadline so a hung
    /// storage call cannot wedge the sweep loop.
    pub async fn reconcile_all(&self, per_medicine_timeout: Duration) -> Result<SweepReport, StoreError> {
        let medicines = self.ledger.list().await?;
        let mut report = SweepReport::default();
        for medicine in medicines {
            report.checked += 1;
            match tokio::time::timeout(per_medicine_timeout, self.reconcile_one(medicine.id)).await
            {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    self.metrics.reconcile_failures_total.inc();
                    warn!(medicine_id = %medicine.id, %err, "reconcile failed");
                }
                Err(_) => {
                    report.failed += 1;
                    self.metrics.reconcile_failures_total.inc();
                    warn!(medicine_id = %medicine.id, "reconcile timed out");
                }
            }
        }
        Ok(report)
    }

    /// The partial unique index makes duplicate ACTIVE rows impossible going
    /// forward, but data migrated from older deployments may carry them. Keep
    /// the newest per type and resolve the rest.
    async fn heal_duplicate_actives(&self, medicine: &Medicine) -> Result<(), StoreError> {
        let active = self.alerts.list_active_for_medicine(medicine.id).await?;
        for alert_type in AlertType::ALL {
            let mut of_type: Vec<&InventoryAlert> = active
                .iter()
                .filter(|a| a.alert_type == alert_type)
                .collect();
            if of_type.len() <= 1 {
                continue;
            }
            of_type.sort_by_key(|a| std::cmp::Reverse(a.created_at));
            for stale in &of_type[1..] {
                warn!(
                    medicine_id = %medicine.id,
                    alert_id = %stale.id,
                    alert_type = alert_type.as_str(),
                    "resolving duplicate active alert"
                );
                self.alerts.resolve_by_id(stale.id, SYSTEM_ACTOR).await?;
            }
        }
        Ok(())
    }
}

fn alert_event(medicine: &Medicine, condition: &AlertCondition) -> AlertEvent {
    let event_type = match condition.alert_type {
        AlertType::LowStock => EVENT_LOW_STOCK,
        AlertType::OutOfStock => EVENT_OUT_OF_STOCK,
        AlertType::Expired => EVENT_EXPIRED,
        AlertType::NearExpiry => EVENT_NEAR_EXPIRY,
    };
    AlertEvent {
        event_type,
        medicine_name: medicine.name.clone(),
        severity: condition.severity.as_str().to_string(),
        timestamp: Utc::now(),
        detail: json!({
            "medicine_id": medicine.id,
            "quantity": medicine.quantity,
            "min_stock": medicine.min_stock,
            "expiry": medicine.expiry,
            "message": condition.message,
        }),
    }
}
