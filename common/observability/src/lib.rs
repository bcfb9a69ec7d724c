use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};

#[derive(Clone)]
pub struct PharmacyMetrics {
    pub registry: Registry,
    pub alerts_raised_total: IntCounterVec,
    pub alerts_resolved_total: IntCounterVec,
    pub dispense_lines_total: IntCounterVec,
    pub reconcile_failures_total: IntCounter,
    pub notification_emit_failures: IntCounter,
    pub sweep_duration_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl PharmacyMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let alerts_raised_total = IntCounterVec::new(
            prometheus::Opts::new(
                "inventory_alerts_raised_total",
                "Alerts created or refreshed by the reconciler, by alert type",
            ),
            &["alert_type"],
        ).unwrap();
        let alerts_resolved_total = IntCounterVec::new(
            prometheus::Opts::new(
                "inventory_alerts_resolved_total",
                "Alerts auto-resolved by the reconciler, by alert type",
            ),
            &["alert_type"],
        ).unwrap();
        let dispense_lines_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pharmacy_dispense_lines_total",
                "Prescription lines processed by the dispensing engine, by outcome",
            ),
            &["outcome"],
        ).unwrap();
        let reconcile_failures_total = IntCounter::new(
            "inventory_reconcile_failures_total",
            "Medicines skipped during a sweep because reconciliation failed",
        ).unwrap();
        let notification_emit_failures = IntCounter::new(
            "notification_emit_failures_total",
            "Alert notification emission failures",
        ).unwrap();
        let sweep_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "inventory_reconcile_sweep_duration_seconds",
                "Duration of a full inventory reconciliation sweep"
            ).buckets(vec![0.01,0.05,0.1,0.25,0.5,1.0,2.0,5.0,15.0])
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)"
            ),
            &["service", "code", "status"]
        ).unwrap();
        let _ = registry.register(Box::new(alerts_raised_total.clone()));
        let _ = registry.register(Box::new(alerts_resolved_total.clone()));
        let _ = registry.register(Box::new(dispense_lines_total.clone()));
        let _ = registry.register(Box::new(reconcile_failures_total.clone()));
        let _ = registry.register(Box::new(notification_emit_failures.clone()));
        let _ = registry.register(Box::new(sweep_duration_seconds.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        PharmacyMetrics {
            registry,
            alerts_raised_total,
            alerts_resolved_total,
            dispense_lines_total,
            reconcile_failures_total,
            notification_emit_failures,
            sweep_duration_seconds,
            http_errors_total,
        }
    }
}

impl Default for PharmacyMetrics {
    fn default() -> Self { Self::new() }
}
