//! Metrics collection and exposition.
//!
//! # Metrics
//! - `visor_filter_reloads_total` (counter): filter reloads by outcome
//! - `visor_filter_addresses` (gauge): size of the last published filter
//! - `visor_filter_watch_restarts_total` (counter): file watch re-creations
//! - `visor_task_runs_total` (counter): supervised task runs by task, outcome
//!
//! Recording is a no-op until a recorder is installed, so library code and tests
//! may call these freely.

use std::net::SocketAddr;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record the outcome of a filter reload (`ok`, `read_error`, `parse_error`).
pub fn record_filter_reload(outcome: &'static str) {
    metrics::counter!("visor_filter_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_filter_size(addresses: usize) {
    metrics::gauge!("visor_filter_addresses").set(addresses as f64);
}

pub fn record_watch_restart() {
    metrics::counter!("visor_filter_watch_restarts_total").increment(1);
}

/// Record how a supervised task run ended (`completed`, `failed`, `fatal`).
pub fn record_task_run(task: &str, outcome: &'static str) {
    metrics::counter!("visor_task_runs_total", "task" => task.to_string(), "outcome" => outcome)
        .increment(1);
}
