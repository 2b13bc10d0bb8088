//! Periodic reclamation of expired seats.
//!
//! Expiry is lazy: an active seat past its deadline stays active until a
//! sweep runs. This task runs one on a fixed interval so seats come back
//! without anyone calling `cleanup-expired`.

use std::sync::Arc;
use std::time::Duration;

use seatpool_core::coordinator::LicenseCoordinator;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(coordinator: Arc<LicenseCoordinator>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Expiry sweep job started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweep job stopping");
                break;
            }
            _ = interval.tick() => {
                match coordinator.sweep_expired().await {
                    Ok(0) => tracing::debug!("Expiry sweep: nothing to reclaim"),
                    Ok(reclaimed) => tracing::info!(reclaimed, "Expiry sweep: seats reclaimed"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        }
    }
}
