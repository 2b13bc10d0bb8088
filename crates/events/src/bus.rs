//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out a [`LicenseEvent`] for every transition the
//! coordinator commits. It is shared via `Arc<EventBus>` and registered on
//! the coordinator with
//! [`with_observer`](seatpool_core::coordinator::LicenseCoordinator::with_observer).

use serde::Serialize;
use seatpool_core::coordinator::TransitionObserver;
use seatpool_core::license::{LicenseAction, LicenseState, Transition};
use seatpool_core::types::{DbId, Timestamp};
use seatpool_core::usage::NewUsageLog;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// LicenseEvent
// ---------------------------------------------------------------------------

/// A committed license transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseEvent {
    pub action: LicenseAction,
    pub license_id: DbId,
    pub license_no: String,
    /// State of the seat after the transition.
    pub state: LicenseState,
    /// `None` when the system acted (expiry sweep).
    pub actor_user_id: Option<DbId>,
    /// The user the transition is attributed to.
    pub user_id: Option<DbId>,
    pub user_name: Option<String>,
    /// Active time, for `released` and `expired`.
    pub duration_seconds: Option<i64>,
    pub timestamp: Timestamp,
}

impl LicenseEvent {
    pub fn from_transition(transition: &Transition) -> Self {
        let subject = transition.subject();
        Self {
            action: transition.action,
            license_id: transition.after.id,
            license_no: transition.after.no.clone(),
            state: transition.after.state(),
            actor_user_id: transition.actor.as_ref().map(|c| c.user_id),
            user_id: subject.as_ref().map(|h| h.user_id),
            user_name: subject.map(|h| h.display_name),
            duration_seconds: transition.active_duration().map(|d| d.num_seconds()),
            timestamp: transition.at,
        }
    }

    /// Dot-separated event name, e.g. `"license.activated"`.
    pub fn event_type(&self) -> String {
        format!("license.{}", self.action)
    }

    /// The usage log entry for this event, if a user can be attributed.
    pub fn usage_entry(&self) -> Option<NewUsageLog> {
        Some(NewUsageLog {
            user_id: self.user_id?,
            user_name: self.user_name.clone()?,
            license_id: self.license_id,
            license_no: self.license_no.clone(),
            action: self.action,
            timestamp: self.timestamp,
            duration_seconds: self.duration_seconds,
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<LicenseEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: LicenseEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LicenseEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TransitionObserver for EventBus {
    fn on_transition(&self, transition: &Transition) {
        let event = LicenseEvent::from_transition(transition);
        tracing::debug!(
            event_type = %event.event_type(),
            license_id = event.license_id,
            "Publishing license event"
        );
        self.publish(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
