//! Stuck-run sweep.
//!
//! Forces `RUNNING` Runs claimed longer ago than the operational timeout to
//! `FAILED(timeout)`, which frees the key for the re-arm path.

use tokio_util::sync::CancellationToken;

use crate::context::EngineContext;
use crate::cutoff;
use crate::error::EngineError;
use crate::{audit, lifecycle};

/// One sweep pass. Returns how many Runs were failed.
pub async fn sweep_once(ctx: &EngineContext) -> Result<usize, EngineError> {
    let swept = ctx
        .store
        .fail_stuck(cutoff(ctx.config.stuck_run_timeout))
        .await?;

    for run in &swept {
        tracing::warn!(
            run_id = run.id,
            tenant_id = %run.tenant_id,
            entity_id = %run.entity_id,
            claimed_by = ?run.claimed_by,
            "Stuck run failed with timeout",
        );
        audit::record(ctx.audit.as_ref(), run).await;
        lifecycle::publish(&ctx.bus, run);
    }
    Ok(swept.len())
}

/// Run the sweep on `stuck_run_sweep_interval` until cancelled.
pub async fn run(ctx: EngineContext, cancel: CancellationToken) {
    let interval = ctx.config.stuck_run_sweep_interval;
    tracing::info!(
        interval_secs = interval.as_secs(),
        timeout_secs = ctx.config.stuck_run_timeout.as_secs(),
        "Stuck run sweep started",
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stuck run sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&ctx).await {
                    Ok(0) => tracing::debug!("Stuck run sweep: nothing to do"),
                    Ok(count) => tracing::info!(count, "Stuck run sweep: runs failed"),
                    Err(e) => tracing::error!(error = %e, "Stuck run sweep failed"),
                }
            }
        }
    }
}
