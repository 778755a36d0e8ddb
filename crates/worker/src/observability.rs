use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const RECONCILE_REPORTS_TOTAL: &str = "akses_worker_reconcile_reports_total";
const RECONCILE_DRIFT_TOTAL: &str = "akses_worker_reconcile_drift_corrected_total";
const RECONCILE_SWEEP_DURATION_MS: &str = "akses_worker_reconcile_sweep_duration_ms";
const RECONCILE_SWEEP_FAILURES_TOTAL: &str = "akses_worker_reconcile_sweep_failures_total";
const RECONCILE_LAST_SWEEP_GAUGE: &str = "akses_worker_reconcile_last_sweep_reports";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// `result` is one of `clean`, `corrected`, `skipped` or `failed`.
pub fn register_report_reconciled(result: &'static str) {
    counter!(RECONCILE_REPORTS_TOTAL, "result" => result).increment(1);
}

pub fn register_drift_corrected(block: &'static str) {
    counter!(RECONCILE_DRIFT_TOTAL, "block" => block).increment(1);
}

pub fn register_sweep(scanned: u64, duration_ms: f64) {
    histogram!(RECONCILE_SWEEP_DURATION_MS).record(duration_ms.max(0.0));
    gauge!(RECONCILE_LAST_SWEEP_GAUGE).set(scanned as f64);
}

pub fn register_sweep_failure() {
    counter!(RECONCILE_SWEEP_FAILURES_TOTAL).increment(1);
}
