//! Error handling for BizDesk
//!
//! Provides the error types surfaced by the core crate:
//! - Publish errors (event construction / enqueue)
//! - Subscription errors (registry management)
//! - Callback errors (subscriber failures, contained by the bus)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::event_bus::SubscriptionId;

/// Publish error type
///
/// Returned synchronously from `EventBus::publish` when an event cannot be
/// built or queued. Delivery failures never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    /// Event type tag was empty
    #[error("Event type must not be empty")]
    EmptyEventType,

    /// Priority name or level is not recognised
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// Payload could not be converted to JSON
    #[error("Unserializable payload: {0}")]
    Payload(String),

    /// A metadata value could not be converted to JSON
    #[error("Unserializable metadata '{key}': {reason}")]
    Metadata {
        /// The metadata key.
        key: String,
        /// The serializer's message.
        reason: String,
    },

    /// The bus has been shut down
    #[error("Event bus is closed")]
    BusClosed,
}

/// Subscription error type
///
/// Represents invalid parameters to the subscription registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    /// Event type tag was empty
    #[error("Subscription event type must not be empty")]
    EmptyEventType,

    /// No subscription with this id is registered
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// The bus has been shut down
    #[error("Event bus is closed")]
    BusClosed,
}

/// Failure raised by a subscriber callback during dispatch.
///
/// Never returned to publishers; the bus logs it, counts it against the
/// event type and reports it as a notification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallbackError {
    /// Callback returned an error
    #[error("Callback failed: {0}")]
    Failed(String),

    /// Callback panicked
    #[error("Callback panicked: {0}")]
    Panicked(String),
}

/// Umbrella error for event bus operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    /// Publish error
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Subscription error
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Invalid bus configuration
    #[error("Invalid event bus configuration: {0}")]
    InvalidConfig(String),

    /// Worker pool could not be started
    #[error("Worker pool failed to start: {0}")]
    WorkerPool(String),

    /// The default bus was already created
    #[error("Default event bus already initialized")]
    AlreadyInitialized,
}

/// Main error type for BizDesk
///
/// A unified error type that can represent any error from the core layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Event bus error
    #[error(transparent)]
    EventBus(#[from] EventBusError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error outside the event bus section
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<PublishError> for Error {
    fn from(err: PublishError) -> Self {
        Error::EventBus(err.into())
    }
}

impl From<SubscriptionError> for Error {
    fn from(err: SubscriptionError) -> Self {
        Error::EventBus(err.into())
    }
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this is a configuration error, including invalid bus settings
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::EventBus(EventBusError::InvalidConfig(_))
        )
    }

    /// Check if this error came from a closed bus
    pub fn is_bus_closed(&self) -> bool {
        matches!(
            self,
            Error::EventBus(EventBusError::Publish(PublishError::BusClosed))
                | Error::EventBus(EventBusError::Subscription(SubscriptionError::BusClosed))
        )
    }

    /// Check if this is a publish error
    pub fn is_publish_error(&self) -> bool {
        matches!(self, Error::EventBus(EventBusError::Publish(_)))
    }

    /// Check if this is a subscription error
    pub fn is_subscription_error(&self) -> bool {
        matches!(self, Error::EventBus(EventBusError::Subscription(_)))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
