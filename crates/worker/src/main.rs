mod observability;
mod reconcile;

use std::time::{Duration, Instant};

use akses_domain::util::backoff_ms;
use akses_infra::bootstrap::build_trust_core;
use akses_infra::{config::AppConfig, logging::init_tracing};
use tracing::{error, info, warn};

use crate::observability::{init_metrics, register_sweep, register_sweep_failure, render_metrics};
use crate::reconcile::ReconcileSweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config, "akses-worker")?;
    init_metrics()?;

    let core = build_trust_core(&config).await?;
    let sweep = ReconcileSweep::new(core, config.reconcile_batch);
    let interval = Duration::from_millis(config.reconcile_interval_ms.max(1));
    info!(
        interval_ms = config.reconcile_interval_ms,
        batch = config.reconcile_batch,
        "reconcile worker starting"
    );

    let mut failures = 0u32;
    loop {
        let started = Instant::now();
        let delay = match sweep.run().await {
            Ok(stats) => {
                failures = 0;
                register_sweep(stats.scanned, started.elapsed().as_secs_f64() * 1000.0);
                info!(
                    scanned = stats.scanned,
                    corrected = stats.corrected,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    "reconcile sweep finished"
                );
                interval
            }
            Err(err) if err.is_retryable() => {
                failures = failures.saturating_add(1);
                register_sweep_failure();
                let wait = backoff_ms(
                    config.reconcile_backoff_base_ms,
                    failures,
                    config.reconcile_backoff_max_ms,
                );
                warn!(error = %err, failures, retry_in_ms = wait, "reconcile sweep failed");
                Duration::from_millis(wait)
            }
            Err(err) => {
                register_sweep_failure();
                error!(error = %err, "reconcile sweep aborted");
                interval
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(rendered) = render_metrics() {
        tracing::debug!(metrics = %rendered, "final metrics snapshot");
    }
    info!("worker shutdown");
    Ok(())
}
