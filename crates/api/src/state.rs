use std::sync::Arc;

use seatpool_core::coordinator::LicenseCoordinator;
use seatpool_core::otp::OtpSource;
use seatpool_core::usage::UsageLogStore;
use seatpool_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Owner of every license transition.
    pub coordinator: Arc<LicenseCoordinator>,
    /// Usage log read side. Writes arrive through the event bus.
    pub usage_store: Arc<dyn UsageLogStore>,
    /// OTP mailbox lookup. `None` when no OTP service is configured.
    pub otp_source: Option<Arc<dyn OtpSource>>,
    /// License event fan-out, also registered on the coordinator.
    pub event_bus: Arc<EventBus>,
    pub config: Arc<ServerConfig>,
}
