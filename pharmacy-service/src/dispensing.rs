use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use common_observability::PharmacyMetrics;

use crate::models::{
    AvailabilityLine, AvailabilityReport, DispenseReport, LineOutcome, LineStatus, Medicine,
    PrescriptionLine, PrescriptionStatus,
};
use crate::notifications::{AlertEvent, Notifier, EVENT_STOCK_SHORTAGE};
use crate::reconciler::Reconciler;
use crate::store::{AlertStore, StockLedger, StoreError};

/// Turns prescription lines into stock decrements and per-line outcomes.
/// Partial fulfilment is a normal result, never an error; the only hard
/// failures are unknown linked medicines and storage errors.
pub struct DispensingEngine<L, A> {
    ledger: Arc<L>,
    reconciler: Reconciler<L, A>,
    notifier: Notifier,
    metrics: Arc<PharmacyMetrics>,
}

impl<L, A> Clone for DispensingEngine<L, A> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            reconciler: self.reconciler.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<L, A> DispensingEngine<L, A>
where
    L: StockLedger,
    A: AlertStore,
{
    pub fn new(
        ledger: Arc<L>,
        reconciler: Reconciler<L, A>,
        notifier: Notifier,
        metrics: Arc<PharmacyMetrics>,
    ) -> Self {
        Self {
            ledger,
            reconciler,
            notifier,
            metrics,
        }
    }

    /// Dispenses every line, clamping each decrement to the stock on hand,
    /// then reconciles each distinct medicine touched. All linked medicines
    /// are validated up front so an unknown id fails the request before any
    /// stock moves.
    pub async fn dispense(
        &self,
        lines: &[PrescriptionLine],
        dispensed_by: &str,
    ) -> Result<DispenseReport, StoreError> {
        validate_quantities(lines)?;
        let mut resolved: Vec<Option<Medicine>> = Vec::with_capacity(lines.len());
        for line in lines {
            match line.medicine_id {
                Some(id) => {
                    let medicine = self
                        .ledger
                        .get(id)
                        .await?
                        .ok_or(StoreError::MedicineNotFound(id))?;
                    resolved.push(Some(medicine));
                }
                None => resolved.push(None),
            }
        }

        let mut outcomes = Vec::with_capacity(lines.len());
        let mut touched: BTreeSet<Uuid> = BTreeSet::new();

        for (line, medicine) in lines.iter().zip(resolved) {
            let outcome = match medicine {
                Some(medicine) => {
                    let result = self.ledger.decrement(medicine.id, line.quantity).await?;
                    touched.insert(medicine.id);
                    let status = classify(line.quantity, result.dispensed);
                    LineOutcome {
                        medicine_id: Some(medicine.id),
                        medicine_name: medicine.name,
                        requested: line.quantity,
                        dispensed: result.dispensed,
                        status,
                        detail: None,
                    }
                }
                None => LineOutcome {
                    medicine_id: None,
                    medicine_name: line
                        .medicine_name
                        .clone()
                        .unwrap_or_else(|| "unknown".into()),
                    requested: line.quantity,
                    dispensed: 0,
                    status: LineStatus::OutOfStock,
                    detail: Some("not linked to inventory".into()),
                },
            };
            self.metrics
                .dispense_lines_total
                .with_label_values(&[outcome.status.as_str()])
                .inc();
            outcomes.push(outcome);
        }

        // Alert upkeep is best effort here; the stock already moved and the
        // sweep will converge any medicine this pass misses.
        for medicine_id in touched {
            if let Err(err) = self.reconciler.reconcile_one(medicine_id).await {
                warn!(%medicine_id, %err, "post-dispense reconcile failed");
            }
        }

        for outcome in outcomes.iter().filter(|o| o.shortfall() > 0) {
            self.notifier
                .emit(AlertEvent {
                    event_type: EVENT_STOCK_SHORTAGE,
                    medicine_name: outcome.medicine_name.clone(),
                    severity: "HIGH".into(),
                    timestamp: Utc::now(),
                    detail: json!({
                        "requested": outcome.requested,
                        "dispensed": outcome.dispensed,
                        "shortfall": outcome.shortfall(),
                    }),
                })
                .await;
        }

        let prescription_status = if outcomes.iter().all(|o| o.status == LineStatus::Dispensed) {
            PrescriptionStatus::Completed
        } else {
            PrescriptionStatus::PartiallyDispensed
        };

        Ok(DispenseReport {
            lines: outcomes,
            dispensed_by: dispensed_by.to_string(),
            dispensed_at: Utc::now(),
            prescription_status,
        })
    }

    /// Read-only preview of `dispense`. Unknown or unlinked medicines report
    /// zero availability instead of failing, so one bad line never hides the
    /// answer for the rest of the prescription.
    pub async fn check_availability(
        &self,
        lines: &[PrescriptionLine],
    ) -> Result<AvailabilityReport, StoreError> {
        validate_quantities(lines)?;
        let mut report_lines = Vec::with_capacity(lines.len());
        for line in lines {
            let report_line = match line.medicine_id {
                Some(id) => match self.ledger.get(id).await? {
                    Some(medicine) => AvailabilityLine {
                        medicine_id: Some(id),
                        medicine_name: medicine.name,
                        requested: line.quantity,
                        available: medicine.quantity,
                        sufficient: medicine.quantity >= line.quantity,
                        detail: None,
                    },
                    None => AvailabilityLine {
                        medicine_id: Some(id),
                        medicine_name: line
                            .medicine_name
                            .clone()
                            .unwrap_or_else(|| "unknown".into()),
                        requested: line.quantity,
                        available: 0,
                        sufficient: false,
                        detail: Some("not found in inventory".into()),
                    },
                },
                None => AvailabilityLine {
                    medicine_id: None,
                    medicine_name: line
                        .medicine_name
                        .clone()
                        .unwrap_or_else(|| "unknown".into()),
                    requested: line.quantity,
                    available: 0,
                    sufficient: false,
                    detail: Some("not linked to inventory".into()),
                },
            };
            report_lines.push(report_line);
        }
        let all_sufficient = report_lines.iter().all(|l| l.sufficient);
        Ok(AvailabilityReport {
            lines: report_lines,
            all_sufficient,
        })
    }
}

// The HTTP layer rejects these too, but the engine is callable on its own;
// a non-positive quantity must never reach the ledger, where a negative
// decrement would read as a restock.
fn validate_quantities(lines: &[PrescriptionLine]) -> Result<(), StoreError> {
    match lines.iter().find(|l| l.quantity <= 0) {
        Some(line) => Err(StoreError::InvalidQuantity(line.quantity)),
        None => Ok(()),
    }
}

fn classify(requested: i32, dispensed: i32) -> LineStatus {
    if dispensed >= requested {
        LineStatus::Dispensed
    } else if dispensed > 0 {
        LineStatus::PartiallyDispensed
    } else {
        LineStatus::OutOfStock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, Severity};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn medicine(quantity: i32, min_stock: i32) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: "Amoxicillin".into(),
            category: "Antibiotic".into(),
            dosage: "500mg".into(),
            quantity,
            min_stock,
            expiry: Utc::now().date_naive() + Duration::days(365),
            last_updated: Utc::now(),
        }
    }

    fn engine(
        store: Arc<MemoryStore>,
    ) -> (
        DispensingEngine<MemoryStore, MemoryStore>,
        Reconciler<MemoryStore, MemoryStore>,
    ) {
        let metrics = Arc::new(PharmacyMetrics::default());
        let notifier = Notifier::new(metrics.clone());
        let reconciler = Reconciler::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            metrics.clone(),
        );
        (
            DispensingEngine::new(store, reconciler.clone(), notifier, metrics),
            reconciler,
        )
    }

    fn line(id: Uuid, quantity: i32) -> PrescriptionLine {
        PrescriptionLine {
            medicine_id: Some(id),
            medicine_name: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn full_stock_dispenses_completely() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(100, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let report = engine.dispense(&[line(id, 10)], "pharmacist").await.unwrap();
        assert_eq!(report.prescription_status, PrescriptionStatus::Completed);
        assert_eq!(report.lines[0].status, LineStatus::Dispensed);
        assert_eq!(report.lines[0].dispensed, 10);
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 90);
    }

    #[tokio::test]
    async fn shortfall_clamps_and_replaces_low_stock_with_out_of_stock() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(10, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, reconciler) = engine(store.clone());

        // Stock below threshold: the first reconcile pass raises LOW_STOCK.
        reconciler.reconcile_one(id).await.unwrap();
        assert!(store
            .find_active(id, AlertType::LowStock)
            .await
            .unwrap()
            .is_some());

        let report = engine.dispense(&[line(id, 15)], "pharmacist").await.unwrap();
        assert_eq!(
            report.prescription_status,
            PrescriptionStatus::PartiallyDispensed
        );
        assert_eq!(report.lines[0].dispensed, 10);
        assert_eq!(report.lines[0].status, LineStatus::PartiallyDispensed);
        assert_eq!(report.lines[0].shortfall(), 5);
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 0);

        // The low-stock alert is gone, replaced by a critical out-of-stock.
        assert!(store
            .find_active(id, AlertType::LowStock)
            .await
            .unwrap()
            .is_none());
        let oos = store
            .find_active(id, AlertType::OutOfStock)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oos.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn empty_shelf_yields_out_of_stock_line() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(0, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let report = engine.dispense(&[line(id, 5)], "pharmacist").await.unwrap();
        assert_eq!(report.lines[0].status, LineStatus::OutOfStock);
        assert_eq!(report.lines[0].dispensed, 0);
    }

    #[tokio::test]
    async fn unlinked_line_is_out_of_stock_without_touching_stock() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(100, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let unlinked = PrescriptionLine {
            medicine_id: None,
            medicine_name: Some("Obscuratol".into()),
            quantity: 5,
        };
        let report = engine
            .dispense(&[line(id, 10), unlinked], "pharmacist")
            .await
            .unwrap();
        assert_eq!(report.lines[1].status, LineStatus::OutOfStock);
        assert_eq!(report.lines[1].medicine_name, "Obscuratol");
        assert_eq!(
            report.prescription_status,
            PrescriptionStatus::PartiallyDispensed
        );
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 90);
    }

    #[tokio::test]
    async fn unknown_linked_medicine_fails_before_any_stock_moves() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(100, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let missing = Uuid::new_v4();
        let result = engine
            .dispense(&[line(id, 10), line(missing, 5)], "pharmacist")
            .await;
        match result {
            Err(StoreError::MedicineNotFound(got)) => assert_eq!(got, missing),
            other => panic!("expected MedicineNotFound, got {other:?}"),
        }
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 100);
    }

    #[tokio::test]
    async fn same_medicine_on_two_lines_decrements_sequentially() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(15, 5);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let report = engine
            .dispense(&[line(id, 10), line(id, 10)], "pharmacist")
            .await
            .unwrap();
        assert_eq!(report.lines[0].dispensed, 10);
        assert_eq!(report.lines[0].status, LineStatus::Dispensed);
        assert_eq!(report.lines[1].dispensed, 5);
        assert_eq!(report.lines[1].status, LineStatus::PartiallyDispensed);
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn nonpositive_quantity_is_rejected_before_any_stock_moves() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(50, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        for bad in [-5, 0] {
            match engine.dispense(&[line(id, bad)], "pharmacist").await {
                Err(StoreError::InvalidQuantity(got)) => assert_eq!(got, bad),
                other => panic!("expected InvalidQuantity, got {other:?}"),
            }
        }
        // A mixed request fails whole, valid lines included.
        let result = engine
            .dispense(&[line(id, 10), line(id, -5)], "pharmacist")
            .await;
        assert!(matches!(result, Err(StoreError::InvalidQuantity(-5))));
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 50);

        match engine.check_availability(&[line(id, 0)]).await {
            Err(StoreError::InvalidQuantity(0)) => {}
            other => panic!("expected InvalidQuantity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn negative_decrement_cannot_raise_stock() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(50, 20);
        let id = m.id;
        store.seed_medicine(m);

        let result = store.decrement(id, -5).await.unwrap();
        assert_eq!(result.dispensed, 0);
        assert_eq!(result.new_quantity, 50);
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 50);
    }

    #[tokio::test]
    async fn availability_is_read_only() {
        let store = Arc::new(MemoryStore::new());
        let m = medicine(8, 20);
        let id = m.id;
        store.seed_medicine(m);
        let (engine, _reconciler) = engine(store.clone());

        let report = engine
            .check_availability(&[line(id, 10), line(Uuid::new_v4(), 3)])
            .await
            .unwrap();
        assert!(!report.all_sufficient);
        assert_eq!(report.lines[0].available, 8);
        assert!(!report.lines[0].sufficient);
        assert_eq!(report.lines[1].available, 0);
        assert_eq!(
            report.lines[1].detail.as_deref(),
            Some("not found in inventory")
        );
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 8);
    }
}
