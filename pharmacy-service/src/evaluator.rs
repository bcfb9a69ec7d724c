use chrono::{Duration, NaiveDate};

use crate::models::{AlertType, Medicine, Severity};

/// Window ahead of the expiry date during which a NEAR_EXPIRY alert is raised.
pub const NEAR_EXPIRY_WINDOW_DAYS: i64 = 30;

/// A condition the reconciler should materialise as an active alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCondition {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
}

/// Decide which alerts should be active for a medicine's current state.
///
/// Pure with respect to `today` so the sweep and the tests evaluate the same
/// way. A medicine carries at most one stock-axis condition (OUT_OF_STOCK or
/// LOW_STOCK) and at most one expiry-axis condition (EXPIRED or NEAR_EXPIRY)
/// at a time.
pub fn evaluate(medicine: &Medicine, today: NaiveDate) -> Vec<AlertCondition> {
    let mut conditions = Vec::with_capacity(2);

    if medicine.quantity <= 0 {
        conditions.push(AlertCondition {
            alert_type: AlertType::OutOfStock,
            severity: Severity::Critical,
            message: format!("OUT OF STOCK: {} is completely out of stock", medicine.name),
        });
    } else if medicine.quantity <= medicine.min_stock {
        conditions.push(AlertCondition {
            alert_type: AlertType::LowStock,
            severity: low_stock_severity(medicine.quantity, medicine.min_stock),
            message: format!(
                "Low stock alert: {} has only {} units left (minimum: {})",
                medicine.name, medicine.quantity, medicine.min_stock
            ),
        });
    }

    if medicine.expiry < today {
        conditions.push(AlertCondition {
            alert_type: AlertType::Expired,
            severity: Severity::Critical,
            message: format!("EXPIRED: {} expired on {}", medicine.name, medicine.expiry),
        });
    } else if medicine.expiry < today + Duration::days(NEAR_EXPIRY_WINDOW_DAYS) {
        let days_remaining = (medicine.expiry - today).num_days();
        conditions.push(AlertCondition {
            alert_type: AlertType::NearExpiry,
            severity: expiry_severity(days_remaining),
            message: format!("Near expiry: {} expires on {}", medicine.name, medicine.expiry),
        });
    }

    conditions
}

/// Severity scales with how far below the reorder threshold the stock sits.
fn low_stock_severity(quantity: i32, min_stock: i32) -> Severity {
    let ratio = f64::from(quantity) / f64::from(min_stock);
    if ratio <= 0.5 {
        Severity::High
    } else if ratio <= 0.75 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn expiry_severity(days_remaining: i64) -> Severity {
    if days_remaining <= 7 {
        Severity::High
    } else if days_remaining <= 15 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Restock signal from the original workflow: once stock falls to half the
/// reorder threshold, suggest ordering three times the threshold.
pub fn reorder_suggestion(medicine: &Medicine) -> Option<i32> {
    if medicine.quantity <= medicine.min_stock / 2 {
        Some(medicine.min_stock * 3)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn medicine(quantity: i32, min_stock: i32, expiry: NaiveDate) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: "Amoxicillin".into(),
            category: "Antibiotic".into(),
            dosage: "500mg".into(),
            quantity,
            min_stock,
            expiry,
            last_updated: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn far_expiry() -> NaiveDate {
        today() + Duration::days(365)
    }

    fn condition_for(conditions: &[AlertCondition], t: AlertType) -> Option<&AlertCondition> {
        conditions.iter().find(|c| c.alert_type == t)
    }

    #[test]
    fn healthy_medicine_raises_nothing() {
        let m = medicine(100, 20, far_expiry());
        assert!(evaluate(&m, today()).is_empty());
    }

    #[test]
    fn zero_quantity_is_out_of_stock_critical_and_not_low_stock() {
        let m = medicine(0, 20, far_expiry());
        let conditions = evaluate(&m, today());
        assert_eq!(conditions.len(), 1);
        let c = condition_for(&conditions, AlertType::OutOfStock).unwrap();
        assert_eq!(c.severity, Severity::Critical);
        assert!(condition_for(&conditions, AlertType::LowStock).is_none());
    }

    #[test]
    fn low_stock_severity_follows_threshold_ratio() {
        // 10/20 = 0.5 boundary lands on High.
        let c = evaluate(&medicine(10, 20, far_expiry()), today());
        assert_eq!(condition_for(&c, AlertType::LowStock).unwrap().severity, Severity::High);
        // 15/20 = 0.75 boundary lands on Medium.
        let c = evaluate(&medicine(15, 20, far_expiry()), today());
        assert_eq!(condition_for(&c, AlertType::LowStock).unwrap().severity, Severity::Medium);
        // 16/20 = 0.8 is Low.
        let c = evaluate(&medicine(16, 20, far_expiry()), today());
        assert_eq!(condition_for(&c, AlertType::LowStock).unwrap().severity, Severity::Low);
    }

    #[test]
    fn low_stock_severity_is_monotonic_as_quantity_falls() {
        let mut last_rank = u8::MAX;
        for quantity in (1..=20).rev() {
            let conditions = evaluate(&medicine(quantity, 20, far_expiry()), today());
            let severity = condition_for(&conditions, AlertType::LowStock).unwrap().severity;
            assert!(
                severity.rank() <= last_rank,
                "severity regressed at quantity {quantity}"
            );
            last_rank = severity.rank();
        }
    }

    #[test]
    fn min_stock_zero_never_raises_low_stock() {
        let conditions = evaluate(&medicine(3, 0, far_expiry()), today());
        assert!(condition_for(&conditions, AlertType::LowStock).is_none());
    }

    #[test]
    fn expired_is_critical_and_excludes_near_expiry() {
        let m = medicine(50, 10, today() - Duration::days(1));
        let conditions = evaluate(&m, today());
        assert_eq!(conditions.len(), 1);
        assert_eq!(condition_for(&conditions, AlertType::Expired).unwrap().severity, Severity::Critical);
        assert!(condition_for(&conditions, AlertType::NearExpiry).is_none());
    }

    #[test]
    fn near_expiry_severity_follows_days_remaining() {
        let c = evaluate(&medicine(50, 10, today() + Duration::days(5)), today());
        assert_eq!(condition_for(&c, AlertType::NearExpiry).unwrap().severity, Severity::High);
        let c = evaluate(&medicine(50, 10, today() + Duration::days(15)), today());
        assert_eq!(condition_for(&c, AlertType::NearExpiry).unwrap().severity, Severity::Medium);
        let c = evaluate(&medicine(50, 10, today() + Duration::days(29)), today());
        assert_eq!(condition_for(&c, AlertType::NearExpiry).unwrap().severity, Severity::Low);
    }

    #[test]
    fn expiry_window_boundaries() {
        // Expiring today is near-expiry, not expired.
        let c = evaluate(&medicine(50, 10, today()), today());
        assert!(condition_for(&c, AlertType::NearExpiry).is_some());
        assert!(condition_for(&c, AlertType::Expired).is_none());
        // Thirty days out falls outside the window.
        let c = evaluate(&medicine(50, 10, today() + Duration::days(30)), today());
        assert!(c.is_empty());
    }

    #[test]
    fn stock_and_expiry_axes_can_coexist() {
        let m = medicine(5, 20, today() + Duration::days(10));
        let conditions = evaluate(&m, today());
        assert_eq!(conditions.len(), 2);
        assert!(condition_for(&conditions, AlertType::LowStock).is_some());
        assert!(condition_for(&conditions, AlertType::NearExpiry).is_some());
    }

    #[test]
    fn reorder_suggested_at_half_threshold() {
        assert_eq!(reorder_suggestion(&medicine(10, 20, far_expiry())), Some(60));
        assert_eq!(reorder_suggestion(&medicine(11, 20, far_expiry())), None);
        assert_eq!(reorder_suggestion(&medicine(0, 20, far_expiry())), Some(60));
    }
}
