use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::evaluator::AlertCondition;
use crate::models::{AlertStatus, AlertSummary, AlertType, InventoryAlert, Medicine};

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("medicine {0} not found")]
    MedicineNotFound(Uuid),
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("alert {0} not found")]
    AlertNotFound(Uuid),
    #[error("alert {0} is not in a state that allows this transition")]
    AlertNotActionable(Uuid),
    #[error("invalid stored value: {0}")]
    Decode(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result of an atomic stock decrement. `dispensed` is clamped to what was on
/// the shelf, so it can be less than the requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub new_quantity: i32,
    pub dispensed: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No active alert of this type existed; a new one was created.
    Created,
    /// An active alert existed and was refreshed in place.
    Refreshed,
    /// An acknowledged alert of this type exists; automatic re-raise is
    /// suppressed until staff resolve it.
    Suppressed,
}

/// Stock quantities live behind this seam. Implementations must make
/// `decrement`/`increment` atomic per medicine; the engines never do a
/// read-modify-write across calls.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn get(&self, medicine_id: Uuid) -> Result<Option<Medicine>, StoreError>;
    async fn list(&self) -> Result<Vec<Medicine>, StoreError>;
    /// Clamping decrement: dispenses `min(amount, quantity)`, never errors on
    /// shortfall. Errors only for unknown ids or storage failures.
    async fn decrement(&self, medicine_id: Uuid, amount: i32) -> Result<StockDecrement, StoreError>;
    async fn increment(&self, medicine_id: Uuid, amount: i32) -> Result<i32, StoreError>;
}

/// Alert records live behind this seam. `upsert_active` and `resolve_active`
/// must be atomic per (medicine, alert_type) to keep the at-most-one-active
/// invariant under concurrent reconciliation.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<InventoryAlert>, StoreError>;
    async fn upsert_active(
        &self,
        medicine: &Medicine,
        condition: &AlertCondition,
    ) -> Result<UpsertOutcome, StoreError>;
    /// Resolves the active alert of this type if one exists; returns whether
    /// anything changed. Acknowledged alerts are left untouched.
    async fn resolve_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
        resolved_by: &str,
    ) -> Result<bool, StoreError>;
    async fn acknowledge(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError>;
    async fn resolve_by_id(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError>;
    /// Active alerts ordered by severity (critical first), then age (oldest
    /// first).
    async fn list_active(&self) -> Result<Vec<InventoryAlert>, StoreError>;
    async fn list_active_for_medicine(
        &self,
        medicine_id: Uuid,
    ) -> Result<Vec<InventoryAlert>, StoreError>;
    async fn purge_resolved_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
    async fn active_summary(&self) -> Result<AlertSummary, StoreError>;
}

/// In-process implementation of both seams, used by the engine tests the way
/// the payment gateway keeps a stub implementation beside the trait.
#[derive(Default)]
pub struct MemoryStore {
    medicines: std::sync::Mutex<Vec<Medicine>>,
    alerts: std::sync::Mutex<Vec<InventoryAlert>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_medicine(&self, medicine: Medicine) {
        self.medicines.lock().unwrap().push(medicine);
    }

    /// Inserts an alert record verbatim, bypassing the upsert guard. Lets
    /// tests stage states (duplicates, stale resolved rows) that the store
    /// API itself refuses to produce.
    pub fn insert_alert_raw(&self, alert: InventoryAlert) {
        self.alerts.lock().unwrap().push(alert);
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl StockLedger for MemoryStore {
    async fn get(&self, medicine_id: Uuid) -> Result<Option<Medicine>, StoreError> {
        Ok(self
            .medicines
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == medicine_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Medicine>, StoreError> {
        Ok(self.medicines.lock().unwrap().clone())
    }

    async fn decrement(&self, medicine_id: Uuid, amount: i32) -> Result<StockDecrement, StoreError> {
        let mut medicines = self.medicines.lock().unwrap();
        let medicine = medicines
            .iter_mut()
            .find(|m| m.id == medicine_id)
            .ok_or(StoreError::MedicineNotFound(medicine_id))?;
        let dispensed = amount.min(medicine.quantity).max(0);
        medicine.quantity -= dispensed;
        medicine.last_updated = Utc::now();
        Ok(StockDecrement {
            new_quantity: medicine.quantity,
            dispensed,
        })
    }

    async fn increment(&self, medicine_id: Uuid, amount: i32) -> Result<i32, StoreError> {
        let mut medicines = self.medicines.lock().unwrap();
        let medicine = medicines
            .iter_mut()
            .find(|m| m.id == medicine_id)
            .ok_or(StoreError::MedicineNotFound(medicine_id))?;
        medicine.quantity += amount;
        medicine.last_updated = Utc::now();
        Ok(medicine.quantity)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn find_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<InventoryAlert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.medicine_id == medicine_id
                    && a.alert_type == alert_type
                    && a.status == AlertStatus::Active
            })
            .cloned())
    }

    async fn upsert_active(
        &self,
        medicine: &Medicine,
        condition: &AlertCondition,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        let acknowledged = alerts.iter().any(|a| {
            a.medicine_id == medicine.id
                && a.alert_type == condition.alert_type
                && a.status == AlertStatus::Acknowledged
        });
        if acknowledged {
            return Ok(UpsertOutcome::Suppressed);
        }
        if let Some(existing) = alerts.iter_mut().find(|a| {
            a.medicine_id == medicine.id
                && a.alert_type == condition.alert_type
                && a.status == AlertStatus::Active
        }) {
            existing.severity = condition.severity;
            existing.message = condition.message.clone();
            existing.quantity_at_alert = medicine.quantity;
            existing.min_stock_at_alert = medicine.min_stock;
            existing.expiry_at_alert = medicine.expiry;
            existing.created_at = Utc::now();
            return Ok(UpsertOutcome::Refreshed);
        }
        alerts.push(InventoryAlert {
            id: Uuid::new_v4(),
            medicine_id: medicine.id,
            medicine_name: medicine.name.clone(),
            alert_type: condition.alert_type,
            severity: condition.severity,
            status: AlertStatus::Active,
            message: condition.message.clone(),
            quantity_at_alert: medicine.quantity,
            min_stock_at_alert: medicine.min_stock,
            expiry_at_alert: medicine.expiry,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        });
        Ok(UpsertOutcome::Created)
    }

    async fn resolve_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
        resolved_by: &str,
    ) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        let mut resolved = false;
        for alert in alerts.iter_mut().filter(|a| {
            a.medicine_id == medicine_id
                && a.alert_type == alert_type
                && a.status == AlertStatus::Active
        }) {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
            alert.resolved_by = Some(resolved_by.to_string());
            resolved = true;
        }
        Ok(resolved)
    }

    async fn acknowledge(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or(StoreError::AlertNotFound(alert_id))?;
        if alert.status != AlertStatus::Active {
            return Err(StoreError::AlertNotActionable(alert_id));
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(Utc::now());
        alert.acknowledged_by = Some(by.to_string());
        Ok(alert.clone())
    }

    async fn resolve_by_id(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or(StoreError::AlertNotFound(alert_id))?;
        if alert.status == AlertStatus::Resolved {
            return Err(StoreError::AlertNotActionable(alert_id));
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        alert.resolved_by = Some(by.to_string());
        Ok(alert.clone())
    }

    async fn list_active(&self) -> Result<Vec<InventoryAlert>, StoreError> {
        let mut active: Vec<InventoryAlert> = self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.severity
                .rank()
                .cmp(&b.severity.rank())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(active)
    }

    async fn list_active_for_medicine(
        &self,
        medicine_id: Uuid,
    ) -> Result<Vec<InventoryAlert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.medicine_id == medicine_id && a.status == AlertStatus::Active)
            .cloned()
            .collect())
    }

    async fn purge_resolved_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        let before = alerts.len();
        alerts.retain(|a| {
            !(a.status == AlertStatus::Resolved
                && a.resolved_at.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - alerts.len()) as u64)
    }

    async fn active_summary(&self) -> Result<AlertSummary, StoreError> {
        let mut summary = AlertSummary::default();
        for alert in self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == AlertStatus::Active)
        {
            summary.tally(alert.alert_type, alert.severity, 1);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::NaiveDate;

    fn medicine(quantity: i32) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: "Ibuprofen".into(),
            category: "Analgesic".into(),
            dosage: "200mg".into(),
            quantity,
            min_stock: 20,
            expiry: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            last_updated: Utc::now(),
        }
    }

    fn low_stock_condition() -> AlertCondition {
        AlertCondition {
            alert_type: AlertType::LowStock,
            severity: Severity::High,
            message: "low".into(),
        }
    }

    #[tokio::test]
    async fn decrement_clamps_at_zero() {
        let store = MemoryStore::new();
        let m = medicine(4);
        let id = m.id;
        store.seed_medicine(m);

        let result = store.decrement(id, 10).await.unwrap();
        assert_eq!(result.dispensed, 4);
        assert_eq!(result.new_quantity, 0);
        assert_eq!(store.get(id).await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn upsert_twice_keeps_single_active_alert() {
        let store = MemoryStore::new();
        let m = medicine(5);
        store.seed_medicine(m.clone());

        assert_eq!(
            store.upsert_active(&m, &low_stock_condition()).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            store.upsert_active(&m, &low_stock_condition()).await.unwrap(),
            UpsertOutcome::Refreshed
        );
        assert_eq!(store.alert_count(), 1);
    }

    #[tokio::test]
    async fn acknowledged_alert_suppresses_upsert() {
        let store = MemoryStore::new();
        let m = medicine(5);
        store.seed_medicine(m.clone());
        store.upsert_active(&m, &low_stock_condition()).await.unwrap();

        let active = store
            .find_active(m.id, AlertType::LowStock)
            .await
            .unwrap()
            .unwrap();
        store.acknowledge(active.id, "pharmacist").await.unwrap();

        assert_eq!(
            store.upsert_active(&m, &low_stock_condition()).await.unwrap(),
            UpsertOutcome::Suppressed
        );
        assert_eq!(store.alert_count(), 1);
    }

    #[tokio::test]
    async fn resolve_active_is_noop_without_active_alert() {
        let store = MemoryStore::new();
        let m = medicine(5);
        store.seed_medicine(m.clone());
        assert!(!store
            .resolve_active(m.id, AlertType::LowStock, SYSTEM_ACTOR)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn acknowledge_rejects_resolved_alert() {
        let store = MemoryStore::new();
        let m = medicine(5);
        store.seed_medicine(m.clone());
        store.upsert_active(&m, &low_stock_condition()).await.unwrap();
        let active = store
            .find_active(m.id, AlertType::LowStock)
            .await
            .unwrap()
            .unwrap();
        store.resolve_by_id(active.id, "pharmacist").await.unwrap();

        match store.acknowledge(active.id, "pharmacist").await {
            Err(StoreError::AlertNotActionable(id)) => assert_eq!(id, active.id),
            other => panic!("expected AlertNotActionable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn purge_only_removes_old_resolved_alerts() {
        let store = MemoryStore::new();
        let m = medicine(5);
        store.seed_medicine(m.clone());
        store.upsert_active(&m, &low_stock_condition()).await.unwrap();
        let active = store
            .find_active(m.id, AlertType::LowStock)
            .await
            .unwrap()
            .unwrap();
        store.resolve_by_id(active.id, "pharmacist").await.unwrap();

        // Cutoff in the past leaves the freshly resolved alert alone.
        let purged = store
            .purge_resolved_older_than(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, 0);

        // Cutoff in the future sweeps it up.
        let purged = store
            .purge_resolved_older_than(Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.alert_count(), 0);
    }
}
