//! Usage recording service.
//!
//! [`UsageRecorder`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and appends one usage log entry per [`LicenseEvent`]. It runs as a
//! long-lived background task and exits when the bus is dropped.

use std::sync::Arc;

use seatpool_core::error::CoreError;
use seatpool_core::usage::{UsageLog, UsageLogStore};
use tokio::sync::broadcast;

use crate::bus::LicenseEvent;

/// Background service that writes license events to the usage log.
pub struct UsageRecorder;

impl UsageRecorder {
    /// Run the recording loop until the channel closes.
    ///
    /// A failed append is logged and skipped. The transition it describes
    /// has already been committed and is not rolled back.
    pub async fn run(
        store: Arc<dyn UsageLogStore>,
        mut receiver: broadcast::Receiver<LicenseEvent>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::record(store.as_ref(), &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type(),
                            license_id = event.license_id,
                            "Failed to record usage"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Usage recorder lagged, some events were not recorded"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, usage recorder shutting down");
                    break;
                }
            }
        }
    }

    /// Append a single event. Events with no attributable user are skipped.
    pub async fn record(
        store: &dyn UsageLogStore,
        event: &LicenseEvent,
    ) -> Result<Option<UsageLog>, CoreError> {
        let Some(entry) = event.usage_entry() else {
            tracing::warn!(
                event_type = %event.event_type(),
                license_id = event.license_id,
                "License event has no user, not recorded"
            );
            return Ok(None);
        };
        store.append(&entry).await.map(Some)
    }
}
