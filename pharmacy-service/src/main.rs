use axum::{
    body::Body,
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post},
    Router,
};
use common_observability::PharmacyMetrics;
use pharmacy_service::{
    alert_handlers, inventory_handlers, notifications::Notifier, store::AlertStore, AppState,
    DEFAULT_ALERT_RETENTION_DAYS, DEFAULT_RECONCILE_SWEEP_SECS, DEFAULT_RECONCILE_TIMEOUT_SECS,
};
use prometheus::{Encoder, TextEncoder};
use sqlx::PgPool;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

async fn metrics_endpoint(State(state): State<AppState>) -> (axum::http::StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8_lossy(&buf).to_string(),
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn error_metrics_mw(
    State(metrics): State<Arc<PharmacyMetrics>>,
    req: axum::http::Request<Body>,
    next: middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics
            .http_errors_total
            .with_label_values(&["pharmacy-service", code, status.as_str()])
            .inc();
    }
    resp
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db_pool = PgPool::connect(&database_url).await?;
    sqlx::migrate!().run(&db_pool).await?;

    let metrics = Arc::new(PharmacyMetrics::new());

    #[cfg(any(feature = "kafka", feature = "kafka-producer"))]
    let notifier = {
        let producer: rdkafka::producer::FutureProducer = rdkafka::ClientConfig::new()
            .set(
                "bootstrap.servers",
                &env::var("KAFKA_BOOTSTRAP").unwrap_or("localhost:9092".into()),
            )
            .create()
            .expect("failed to create kafka producer");
        Notifier::with_producer(metrics.clone(), producer)
    };
    #[cfg(not(any(feature = "kafka", feature = "kafka-producer")))]
    let notifier = Notifier::new(metrics.clone());

    let sweep_interval = Duration::from_secs(env_u64(
        "RECONCILE_SWEEP_SECS",
        DEFAULT_RECONCILE_SWEEP_SECS,
    ));
    let reconcile_timeout = Duration::from_secs(env_u64(
        "RECONCILE_TIMEOUT_SECS",
        DEFAULT_RECONCILE_TIMEOUT_SECS,
    ));
    let alert_retention_days = env::var("ALERT_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_ALERT_RETENTION_DAYS);

    let state = AppState::new(
        db_pool,
        notifier,
        metrics.clone(),
        reconcile_timeout,
        alert_retention_days,
    );

    spawn_reconcile_sweeper(state.clone(), sweep_interval);

    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/inventory", get(inventory_handlers::list_inventory))
        .route("/inventory/status", get(inventory_handlers::inventory_status))
        .route(
            "/inventory/reorder-suggestions",
            get(inventory_handlers::reorder_suggestions),
        )
        .route(
            "/inventory/availability",
            post(inventory_handlers::check_availability),
        )
        .route("/inventory/dispense", post(inventory_handlers::dispense))
        .route("/inventory/:id/restock", post(inventory_handlers::restock))
        .route(
            "/inventory/:id/reconcile",
            post(inventory_handlers::reconcile_medicine),
        )
        .route(
            "/inventory/reconcile",
            post(inventory_handlers::reconcile_inventory),
        )
        .route("/alerts", get(alert_handlers::list_alerts))
        .route("/alerts/summary", get(alert_handlers::alert_summary))
        .route(
            "/alerts/:id/acknowledge",
            post(alert_handlers::acknowledge_alert),
        )
        .route("/alerts/:id/resolve", post(alert_handlers::resolve_alert))
        .route("/alerts/resolved", delete(alert_handlers::purge_resolved))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(metrics, error_metrics_mw))
        .layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting pharmacy-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic full-inventory pass: reconcile every medicine, then prune
/// resolved alerts past the retention window.
fn spawn_reconcile_sweeper(state: AppState, sweep_interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_interval).await;
            let start = std::time::Instant::now();
            match state.reconciler.reconcile_all(state.reconcile_timeout).await {
                Ok(report) => {
                    info!(
                        checked = report.checked,
                        failed = report.failed,
                        "reconcile sweep complete"
                    );
                }
                Err(err) => error!(%err, "reconcile sweep error"),
            }
            let cutoff =
                chrono::Utc::now() - chrono::Duration::days(state.alert_retention_days);
            match state.store.purge_resolved_older_than(cutoff).await {
                Ok(purged) if purged > 0 => info!(purged, "purged resolved alerts"),
                Ok(_) => {}
                Err(err) => error!(%err, "alert purge error"),
            }
            state
                .metrics
                .sweep_duration_seconds
                .observe(start.elapsed().as_secs_f64());
        }
    });
}
