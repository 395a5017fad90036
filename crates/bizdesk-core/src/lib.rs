//! # BizDesk Core
//!
//! Core types and the in-process event bus for BizDesk.
//! Provides the error taxonomy shared by the workspace and the
//! publish/subscribe dispatcher connecting the application's modules.

pub mod error;
pub mod event_bus;

pub use error::{
    CallbackError, Error, EventBusError, PublishError, Result, SubscriptionError,
};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, init_event_bus, BusNotification, DispatchMode, Event, EventBus, EventBusConfig,
    EventFilter, EventId, NewEvent, Priority, ProcessingStats, SubscribeOptions,
    SubscriptionId,
};
