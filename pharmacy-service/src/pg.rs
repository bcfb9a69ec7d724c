use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{query, query_as, PgPool, Row};
use uuid::Uuid;

use crate::evaluator::AlertCondition;
use crate::models::{AlertStatus, AlertSummary, AlertType, InventoryAlert, Medicine, Severity};
use crate::store::{AlertStore, StockDecrement, StockLedger, StoreError, UpsertOutcome};

const ALERT_COLUMNS: &str = "id, medicine_id, medicine_name, alert_type, severity, status, message, \
     quantity_at_alert, min_stock_at_alert, expiry_at_alert, created_at, \
     acknowledged_at, acknowledged_by, resolved_at, resolved_by";

/// Postgres implementation of both storage seams. All mutations are single
/// statements so concurrent dispensing and the sweep serialize at the row
/// level instead of racing an application-side read-modify-write.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockLedger for PgStore {
    async fn get(&self, medicine_id: Uuid) -> Result<Option<Medicine>, StoreError> {
        let medicine = query_as::<_, Medicine>(
            "SELECT id, name, category, dosage, quantity, min_stock, expiry, last_updated \
             FROM medicines WHERE id = $1",
        )
        .bind(medicine_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(medicine)
    }

    async fn list(&self) -> Result<Vec<Medicine>, StoreError> {
        let medicines = query_as::<_, Medicine>(
            "SELECT id, name, category, dosage, quantity, min_stock, expiry, last_updated \
             FROM medicines ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(medicines)
    }

    async fn decrement(&self, medicine_id: Uuid, amount: i32) -> Result<StockDecrement, StoreError> {
        // The locked subselect captures the previous quantity so one round
        // trip yields both the clamped new value and what actually left the
        // shelf. The amount is floored at zero so a bad caller cannot turn a
        // decrement into a restock.
        let row = query(
            "UPDATE medicines m \
                SET quantity = GREATEST(m.quantity - GREATEST($2, 0), 0), last_updated = NOW() \
               FROM (SELECT id, quantity AS prev_quantity FROM medicines WHERE id = $1 FOR UPDATE) prev \
              WHERE m.id = prev.id \
          RETURNING m.quantity AS new_quantity, prev.prev_quantity - m.quantity AS dispensed",
        )
        .bind(medicine_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::MedicineNotFound(medicine_id))?;
        Ok(StockDecrement {
            new_quantity: row.get("new_quantity"),
            dispensed: row.get("dispensed"),
        })
    }

    async fn increment(&self, medicine_id: Uuid, amount: i32) -> Result<i32, StoreError> {
        let row = query(
            "UPDATE medicines SET quantity = quantity + $2, last_updated = NOW() \
             WHERE id = $1 RETURNING quantity",
        )
        .bind(medicine_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::MedicineNotFound(medicine_id))?;
        Ok(row.get("quantity"))
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn find_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<InventoryAlert>, StoreError> {
        let row = query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM inventory_alerts \
             WHERE medicine_id = $1 AND alert_type = $2 AND status = 'ACTIVE'"
        ))
        .bind(medicine_id)
        .bind(alert_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AlertRow::into_alert).transpose()
    }

    async fn upsert_active(
        &self,
        medicine: &Medicine,
        condition: &AlertCondition,
    ) -> Result<UpsertOutcome, StoreError> {
        // INSERT ... SELECT so an acknowledged alert of the same type blocks
        // the whole statement; the partial unique index on ACTIVE rows is the
        // conflict arbiter for the refresh path. xmax = 0 distinguishes a
        // fresh insert from an in-place update.
        let row = query(
            "INSERT INTO inventory_alerts \
                 (id, medicine_id, medicine_name, alert_type, severity, status, message, \
                  quantity_at_alert, min_stock_at_alert, expiry_at_alert, created_at) \
             SELECT $1, $2, $3, $4, $5, 'ACTIVE', $6, $7, $8, $9, NOW() \
              WHERE NOT EXISTS ( \
                    SELECT 1 FROM inventory_alerts \
                     WHERE medicine_id = $2 AND alert_type = $4 AND status = 'ACKNOWLEDGED') \
             ON CONFLICT (medicine_id, alert_type) WHERE status = 'ACTIVE' \
             DO UPDATE SET severity = EXCLUDED.severity, \
                           message = EXCLUDED.message, \
                           quantity_at_alert = EXCLUDED.quantity_at_alert, \
                           min_stock_at_alert = EXCLUDED.min_stock_at_alert, \
                           expiry_at_alert = EXCLUDED.expiry_at_alert, \
                           created_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(Uuid::new_v4())
        .bind(medicine.id)
        .bind(&medicine.name)
        .bind(condition.alert_type.as_str())
        .bind(condition.severity.as_str())
        .bind(&condition.message)
        .bind(medicine.quantity)
        .bind(medicine.min_stock)
        .bind(medicine.expiry)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            None => UpsertOutcome::Suppressed,
            Some(row) if row.get::<bool, _>("inserted") => UpsertOutcome::Created,
            Some(_) => UpsertOutcome::Refreshed,
        })
    }

    async fn resolve_active(
        &self,
        medicine_id: Uuid,
        alert_type: AlertType,
        resolved_by: &str,
    ) -> Result<bool, StoreError> {
        let result = query(
            "UPDATE inventory_alerts \
                SET status = 'RESOLVED', resolved_at = NOW(), resolved_by = $3 \
              WHERE medicine_id = $1 AND alert_type = $2 AND status = 'ACTIVE'",
        )
        .bind(medicine_id)
        .bind(alert_type.as_str())
        .bind(resolved_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError> {
        let row = query_as::<_, AlertRow>(&format!(
            "UPDATE inventory_alerts \
                SET status = 'ACKNOWLEDGED', acknowledged_at = NOW(), acknowledged_by = $2 \
              WHERE id = $1 AND status = 'ACTIVE' \
          RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .bind(by)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.into_alert(),
            None => Err(self.missing_alert_error(alert_id).await?),
        }
    }

    async fn resolve_by_id(&self, alert_id: Uuid, by: &str) -> Result<InventoryAlert, StoreError> {
        let row = query_as::<_, AlertRow>(&format!(
            "UPDATE inventory_alerts \
                SET status = 'RESOLVED', resolved_at = NOW(), resolved_by = $2 \
              WHERE id = $1 AND status IN ('ACTIVE', 'ACKNOWLEDGED') \
          RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .bind(by)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.into_alert(),
            None => Err(self.missing_alert_error(alert_id).await?),
        }
    }

    async fn list_active(&self) -> Result<Vec<InventoryAlert>, StoreError> {
        let rows = query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM inventory_alerts WHERE status = 'ACTIVE' \
             ORDER BY CASE severity \
                        WHEN 'CRITICAL' THEN 1 \
                        WHEN 'HIGH' THEN 2 \
                        WHEN 'MEDIUM' THEN 3 \
                        ELSE 4 \
                      END, created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn list_active_for_medicine(
        &self,
        medicine_id: Uuid,
    ) -> Result<Vec<InventoryAlert>, StoreError> {
        let rows = query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM inventory_alerts \
             WHERE medicine_id = $1 AND status = 'ACTIVE' ORDER BY created_at DESC"
        ))
        .bind(medicine_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn purge_resolved_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = query(
            "DELETE FROM inventory_alerts WHERE status = 'RESOLVED' AND resolved_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn active_summary(&self) -> Result<AlertSummary, StoreError> {
        let rows = query(
            "SELECT alert_type, severity, COUNT(*) AS alert_count \
             FROM inventory_alerts WHERE status = 'ACTIVE' GROUP BY alert_type, severity",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut summary = AlertSummary::default();
        for row in rows {
            let alert_type: String = row.get("alert_type");
            let severity: String = row.get("severity");
            let count: i64 = row.get("alert_count");
            let alert_type = AlertType::from_str(&alert_type)
                .ok_or_else(|| StoreError::Decode(format!("alert_type {alert_type}")))?;
            let severity = Severity::from_str(&severity)
                .ok_or_else(|| StoreError::Decode(format!("severity {severity}")))?;
            summary.tally(alert_type, severity, count);
        }
        Ok(summary)
    }
}

impl PgStore {
    /// Disambiguates an update that matched no row: unknown id vs. a known
    /// alert in a state the transition does not allow.
    async fn missing_alert_error(&self, alert_id: Uuid) -> Result<StoreError, StoreError> {
        let exists = query("SELECT 1 FROM inventory_alerts WHERE id = $1")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(if exists.is_some() {
            StoreError::AlertNotActionable(alert_id)
        } else {
            StoreError::AlertNotFound(alert_id)
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    medicine_id: Uuid,
    medicine_name: String,
    alert_type: String,
    severity: String,
    status: String,
    message: String,
    quantity_at_alert: i32,
    min_stock_at_alert: i32,
    expiry_at_alert: NaiveDate,
    created_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl AlertRow {
    fn into_alert(self) -> Result<InventoryAlert, StoreError> {
        let alert_type = AlertType::from_str(&self.alert_type)
            .ok_or_else(|| StoreError::Decode(format!("alert_type {}", self.alert_type)))?;
        let severity = Severity::from_str(&self.severity)
            .ok_or_else(|| StoreError::Decode(format!("severity {}", self.severity)))?;
        let status = AlertStatus::from_str(&self.status)
            .ok_or_else(|| StoreError::Decode(format!("status {}", self.status)))?;
        Ok(InventoryAlert {
            id: self.id,
            medicine_id: self.medicine_id,
            medicine_name: self.medicine_name,
            alert_type,
            severity,
            status,
            message: self.message,
            quantity_at_alert: self.quantity_at_alert,
            min_stock_at_alert: self.min_stock_at_alert,
            expiry_at_alert: self.expiry_at_alert,
            created_at: self.created_at,
            acknowledged_at: self.acknowledged_at,
            acknowledged_by: self.acknowledged_by,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
        })
    }
}
