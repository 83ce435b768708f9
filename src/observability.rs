use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created. Labels: none.
pub const BOOKINGS_CREATED_TOTAL: &str = "fleetbook_bookings_created_total";

/// Counter: booking attempts rejected with a slot conflict.
pub const BOOKING_CONFLICTS_TOTAL: &str = "fleetbook_booking_conflicts_total";

/// Counter: booking status transitions applied. Labels: status.
pub const STATUS_CHANGES_TOTAL: &str = "fleetbook_status_changes_total";

/// Histogram: availability query latency in seconds.
pub const AVAILABILITY_QUERY_DURATION_SECONDS: &str =
    "fleetbook_availability_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: vehicles currently in the registry.
pub const VEHICLES_REGISTERED: &str = "fleetbook_vehicles_registered";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None — embedders that scrape through their own recorder skip
/// this.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
