//! Seatpool license event bus and usage recording.
//!
//! - [`EventBus`] is the in-process publish/subscribe hub, backed by
//!   `tokio::sync::broadcast`. It plugs into the coordinator as a
//!   transition observer.
//! - [`LicenseEvent`] is the event envelope for one committed transition.
//! - [`UsageRecorder`] is the background service that appends every event
//!   to the usage log.

pub mod bus;
pub mod recorder;

pub use bus::{EventBus, LicenseEvent};
pub use recorder::UsageRecorder;
