use std::sync::Arc;

use chrono::{DateTime, Utc};
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use std::time::Duration;
use tracing::info;
#[cfg(any(feature = "kafka", feature = "kafka-producer"))]
use tracing::warn;

use common_observability::PharmacyMetrics;

pub const TOPIC_PHARMACY_ALERTS: &str = "pharmacy.alerts";

pub const EVENT_LOW_STOCK: &str = "LOW_STOCK";
pub const EVENT_OUT_OF_STOCK: &str = "OUT_OF_STOCK";
pub const EVENT_EXPIRED: &str = "EXPIRED";
pub const EVENT_NEAR_EXPIRY: &str = "NEAR_EXPIRY";
pub const EVENT_STOCK_SHORTAGE: &str = "STOCK_SHORTAGE";
pub const EVENT_REORDER_REQUIRED: &str = "REORDER_REQUIRED";

/// Outbound notification payload. Every alert transition and dispensing
/// shortage is published in this shape.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub medicine_name: String,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub detail: serde_json::Value,
}

/// Publishes alert events. The structured log line is the always-on channel;
/// Kafka delivery is best effort behind the `kafka-producer` feature, and a
/// failed publish never fails the operation that produced the event.
#[derive(Clone)]
pub struct Notifier {
    metrics: Arc<PharmacyMetrics>,
    #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
    producer: Option<FutureProducer>,
}

impl Notifier {
    pub fn new(metrics: Arc<PharmacyMetrics>) -> Self {
        Self {
            metrics,
            #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
            producer: None,
        }
    }

    #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
    pub fn with_producer(metrics: Arc<PharmacyMetrics>, producer: FutureProducer) -> Self {
        Self {
            metrics,
            producer: Some(producer),
        }
    }

    pub async fn emit(&self, event: AlertEvent) {
        info!(
            event_type = event.event_type,
            medicine = %event.medicine_name,
            severity = %event.severity,
            detail = %event.detail,
            "alert event"
        );

        #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
        if let Some(producer) = &self.producer {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(?err, event_type = event.event_type, "failed to serialize alert event");
                    self.metrics.notification_emit_failures.inc();
                    return;
                }
            };
            let record = FutureRecord::to(TOPIC_PHARMACY_ALERTS)
                .key(&event.medicine_name)
                .payload(&payload);
            if let Err((err, _)) = producer.send(record, Duration::from_secs(0)).await {
                warn!(%err, event_type = event.event_type, "failed to publish alert event");
                self.metrics.notification_emit_failures.inc();
            }
        }

        #[cfg(not(any(feature = "kafka", feature = "kafka-producer")))]
        let _ = &self.metrics;
    }
}
