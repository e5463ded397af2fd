use std::sync::Arc;

use crate::{
    control::RunSignal,
    digest::{DigestGate, DigestOutcome},
    error::LifelogError,
    settings::{SettingsStore, SummarySettings},
};

use super::engine::{RollupOutcome, SummaryEngine};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Rollup, then digest check, then wait; until the run is stopped.
pub async fn summary_loop(
    engine: SummaryEngine,
    mut gate: DigestGate,
    settings: Arc<SettingsStore>,
    signal: RunSignal,
) {
    let mut current = settings.summary();
    if let Err(err) = current.validate() {
        log_error!("summary loop not started: {err}");
        return;
    }

    log_info!("summary loop started (interval {}s)", current.interval_secs);

    while signal.is_running() {
        current = refreshed(&settings, current);

        if current.enabled {
            match engine.run_once().await {
                Ok(RollupOutcome::Committed(summary)) => {
                    log_info!("watermark advanced to {}", summary.covers_until);
                }
                Ok(RollupOutcome::Empty { .. } | RollupOutcome::Superseded { .. }) => {}
                Err(err @ LifelogError::StoreUnavailable(_)) => {
                    log_error!("rollup failed: {err}");
                }
                Err(err) => log_warn!("rollup failed, window kept for retry: {err}"),
            }
        }

        match gate.check().await {
            Ok(DigestOutcome::Sent) => log_info!("daily digest delivered"),
            Ok(_) => {}
            Err(err) => log_warn!("digest check failed: {err}"),
        }

        if signal.wait_or_cancel(current.interval()).await {
            break;
        }
    }

    log_info!("summary loop shutting down");
}

fn refreshed(settings: &SettingsStore, previous: SummarySettings) -> SummarySettings {
    let latest = settings.summary();
    match latest.validate() {
        Ok(()) => latest,
        Err(err) => {
            log_warn!("summary loop keeping previous settings: {err}");
            previous
        }
    }
}
