use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::{EngineError, ErrorKind};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: scheduling operations by outcome. Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "clinic_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "clinic_operation_duration_seconds";

/// Counter: commits refused by the resolver. Labels: cause.
pub const CONFLICTS_TOTAL: &str = "clinic_conflicts_total";

/// Counter: appointments marked NoShow by the sweeper.
pub const NO_SHOWS_TOTAL: &str = "clinic_no_shows_total";

/// Counter: notifications that could not be delivered.
pub const NOTIFICATION_FAILURES_TOTAL: &str = "clinic_notification_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: practitioner timelines held in memory.
pub const TIMELINES_ACTIVE: &str = "clinic_timelines_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clinic_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "clinic_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Short label for an operation's result.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => match e.kind() {
            ErrorKind::Validation => "invalid",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        },
    }
}

pub fn record_operation<T>(operation: &'static str, started: Instant, result: &Result<T, EngineError>) {
    metrics::counter!(
        OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => outcome_label(result)
    )
    .increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
