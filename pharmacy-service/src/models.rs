use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stock ledger row. Quantity never goes below zero; decrements clamp.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub dosage: String,
    pub quantity: i32,
    pub min_stock: i32,
    pub expiry: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowStock,
    OutOfStock,
    Expired,
    NearExpiry,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::LowStock,
        AlertType::OutOfStock,
        AlertType::Expired,
        AlertType::NearExpiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LowStock => "LOW_STOCK",
            AlertType::OutOfStock => "OUT_OF_STOCK",
            AlertType::Expired => "EXPIRED",
            AlertType::NearExpiry => "NEAR_EXPIRY",
        }
    }

    pub fn from_str(s: &str) -> Option<AlertType> {
        match s {
            "LOW_STOCK" => Some(AlertType::LowStock),
            "OUT_OF_STOCK" => Some(AlertType::OutOfStock),
            "EXPIRED" => Some(AlertType::Expired),
            "NEAR_EXPIRY" => Some(AlertType::NearExpiry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Severity> {
        match s {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Sort key for alert listings: CRITICAL first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
        }
    }

    pub fn from_str(s: &str) -> Option<AlertStatus> {
        match s {
            "ACTIVE" => Some(AlertStatus::Active),
            "ACKNOWLEDGED" => Some(AlertStatus::Acknowledged),
            "RESOLVED" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

/// Alert lifecycle: created ACTIVE by the reconciler, refreshed in place while
/// the condition persists, auto-resolved when it clears. Acknowledge/resolve
/// record the actor; an acknowledged alert is left alone by the sweep until it
/// is manually resolved.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryAlert {
    pub id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub quantity_at_alert: i32,
    pub min_stock_at_alert: i32,
    pub expiry_at_alert: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// One requested medicine line of a prescription, as handed to the dispensing
/// engine. `medicine_id` is None when the prescriber's free-text entry was
/// never matched to an inventory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionLine {
    pub medicine_id: Option<Uuid>,
    #[serde(default)]
    pub medicine_name: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Pending,
    PartiallyDispensed,
    Dispensed,
    OutOfStock,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Pending => "PENDING",
            LineStatus::PartiallyDispensed => "PARTIALLY_DISPENSED",
            LineStatus::Dispensed => "DISPENSED",
            LineStatus::OutOfStock => "OUT_OF_STOCK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    Completed,
    PartiallyDispensed,
}

/// Per-line dispensing result. `dispensed` is what actually left the shelf;
/// the shortfall is `requested - dispensed`.
#[derive(Debug, Clone, Serialize)]
pub struct LineOutcome {
    pub medicine_id: Option<Uuid>,
    pub medicine_name: String,
    pub requested: i32,
    pub dispensed: i32,
    pub status: LineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LineOutcome {
    pub fn shortfall(&self) -> i32 {
        (self.requested - self.dispensed).max(0)
    }
}

#[derive(Debug, Serialize)]
pub struct DispenseReport {
    pub lines: Vec<LineOutcome>,
    pub dispensed_by: String,
    pub dispensed_at: DateTime<Utc>,
    pub prescription_status: PrescriptionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityLine {
    pub medicine_id: Option<Uuid>,
    pub medicine_name: String,
    pub requested: i32,
    pub available: i32,
    pub sufficient: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityReport {
    pub lines: Vec<AvailabilityLine>,
    pub all_sufficient: bool,
}

/// Active alert counts for the dashboard, broken down by type and severity.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AlertSummary {
    pub low_stock: i64,
    pub out_of_stock: i64,
    pub expired: i64,
    pub near_expiry: i64,
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl AlertSummary {
    pub fn tally(&mut self, alert_type: AlertType, severity: Severity, count: i64) {
        match alert_type {
            AlertType::LowStock => self.low_stock += count,
            AlertType::OutOfStock => self.out_of_stock += count,
            AlertType::Expired => self.expired += count,
            AlertType::NearExpiry => self.near_expiry += count,
        }
        match severity {
            Severity::Critical => self.critical += count,
            Severity::High => self.high += count,
            Severity::Medium => self.medium += count,
            Severity::Low => self.low += count,
        }
    }
}
