//! Bus lifecycle notifications.
//!
//! Observers receive these through a broadcast channel obtained from
//! `EventBus::notifications`.

use serde::Serialize;
use std::time::Duration;

use super::events::EventId;
use super::subscription::SubscriptionId;

/// Something the bus did with an event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BusNotification {
    /// An event was accepted by `publish`.
    Published {
        /// Event id.
        event_id: EventId,
        /// Event type.
        event_type: String,
    },
    /// Dispatch of an event finished.
    Processed {
        /// Event id.
        event_id: EventId,
        /// Event type.
        event_type: String,
        /// Time spent dispatching.
        elapsed: Duration,
        /// Synchronous callbacks that failed for this event.
        failures: usize,
    },
    /// A subscriber callback failed.
    EventError {
        /// Event id.
        event_id: EventId,
        /// Event type.
        event_type: String,
        /// The failing subscription.
        subscription: SubscriptionId,
        /// Failure description.
        message: String,
    },
}

impl BusNotification {
    /// Type of the event this notification is about
    pub fn event_type(&self) -> &str {
        match self {
            BusNotification::Published { event_type, .. }
            | BusNotification::Processed { event_type, .. }
            | BusNotification::EventError { event_type, .. } => event_type,
        }
    }

    /// Id of the event this notification is about
    pub fn event_id(&self) -> &EventId {
        match self {
            BusNotification::Published { event_id, .. }
            | BusNotification::Processed { event_id, .. }
            | BusNotification::EventError { event_id, .. } => event_id,
        }
    }
}
