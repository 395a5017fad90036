//! # Event Bus Module
//!
//! Provides the in-process event bus used for decoupled communication
//! between application components (customer, supplier, finance and
//! contract modules, report generation, audit logging).
//!
//! ## Overview
//!
//! - Publishers emit string-tagged events without knowing subscribers
//! - Subscribers register per type or globally, optionally filtered
//! - Queued events are delivered by priority, FIFO within a priority
//! - Synchronous publishes are delivered before `publish` returns
//! - Async subscriptions run on a fixed worker pool
//! - Recent events and per-type statistics are kept for diagnostics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bizdesk_core::event_bus::{EventBus, NewEvent, Priority};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//!
//! let subscription = bus
//!     .subscribe("customer_created", |event| {
//!         println!("New customer: {}", event.data()["name"]);
//!         Ok(())
//!     })
//!     .expect("subscribe");
//!
//! bus.publish(
//!     NewEvent::new("customer_created")
//!         .data(json!({"id": 42, "name": "Acme Ltd"}))
//!         .source("customer_panel")
//!         .priority(Priority::High),
//! )
//! .expect("publish");
//!
//! // Unsubscribe when done
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod config;
mod dispatch;
mod events;
mod filter;
mod history;
mod notify;
mod queue;
mod stats;
mod subscription;
mod worker;

pub use bus::*;
pub use config::EventBusConfig;
pub use events::*;
pub use filter::EventFilter;
pub use notify::BusNotification;
pub use stats::ProcessingStats;
pub use subscription::{DispatchMode, EventHandler, SubscribeOptions, Subscription, SubscriptionId};
