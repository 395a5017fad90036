//! Event Bus implementation.
//!
//! Provides the core EventBus struct and the optional process-wide default
//! instance for application-wide event distribution.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast;

use super::config::EventBusConfig;
use super::dispatch::{run_dispatch_loop, Shared};
use super::events::{Event, EventId, NewEvent};
use super::notify::BusNotification;
use super::stats::ProcessingStats;
use super::subscription::{SubscribeOptions, Subscription, SubscriptionId};
use super::worker::WorkerPool;
use crate::error::{EventBusError, PublishError, SubscriptionError};

/// Central event bus for application-wide event distribution
///
/// Asynchronous publishes are queued by priority and delivered by a
/// dedicated dispatch thread; synchronous publishes are delivered on the
/// caller's thread before `publish` returns. Subscriptions created with
/// [`DispatchMode::Async`](super::DispatchMode::Async) run on a fixed worker
/// pool either way.
///
/// **WARNING:** callbacks that capture an `Arc<EventBus>` keep the bus
/// alive through a reference cycle. Unsubscribe them during teardown or
/// call [`EventBus::shutdown`] explicitly.
pub struct EventBus {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Option<WorkerPool>>,
}

impl EventBus {
    /// Create a new event bus with default configuration
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to start the dispatch thread
    /// or the worker pool, like [`std::thread::spawn`].
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
            .unwrap_or_else(|e| panic!("failed to start event bus: {}", e))
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Result<Self, EventBusError> {
        config.validate()?;

        let workers = WorkerPool::new(config.worker_threads)?;
        let spawner = workers
            .spawner()
            .ok_or_else(|| EventBusError::WorkerPool("pool not running".to_string()))?;
        let shared = Arc::new(Shared::new(config, spawner));

        let loop_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name("bizdesk-dispatch".to_string())
            .spawn(move || run_dispatch_loop(loop_shared))
            .map_err(|e| EventBusError::WorkerPool(e.to_string()))?;

        tracing::debug!("Event bus started");
        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            workers: Mutex::new(Some(workers)),
        })
    }

    /// Publish an event
    ///
    /// The event is recorded in history, then either queued for the
    /// dispatch loop or, when built with `.sync(true)`, delivered to all
    /// matching synchronous subscribers before this call returns.
    ///
    /// Only construction problems and a closed bus are reported; callback
    /// failures are contained and show up in stats, logs and notifications.
    pub fn publish(&self, event: NewEvent) -> Result<EventId, PublishError> {
        let sync = event.is_sync();
        let event = Arc::new(event.build()?);
        let id = event.id().clone();

        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(PublishError::BusClosed);
            }
            state.history.record(Arc::clone(&event));
            if !sync {
                state.queue.push(Arc::clone(&event));
            }
        }

        tracing::trace!(
            event_id = %id,
            priority = %event.priority(),
            sync,
            "Publishing {}",
            event.event_type()
        );
        self.shared.notify(BusNotification::Published {
            event_id: id.clone(),
            event_type: event.event_type().to_string(),
        });

        if sync {
            self.shared.dispatch(&event);
        } else {
            self.shared.wake.notify_one();
        }
        Ok(id)
    }

    /// Publish an event and deliver it on this thread
    pub fn publish_sync(&self, event: NewEvent) -> Result<EventId, PublishError> {
        self.publish(event.sync(true))
    }

    /// Subscribe to one event type with a synchronous handler
    ///
    /// The handler runs on whichever thread dispatches the event: the
    /// dispatch loop for queued events, the publisher for sync events. It
    /// should return quickly to avoid delaying other deliveries.
    pub fn subscribe<F>(
        &self,
        event_type: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with(event_type, SubscribeOptions::default(), handler)
    }

    /// Subscribe to one event type with a filter, dispatch mode or owner
    pub fn subscribe_with<F>(
        &self,
        event_type: impl Into<String>,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(SubscriptionError::EmptyEventType);
        }
        self.register(Subscription::new(
            Some(event_type),
            options,
            Arc::new(handler),
        ))
    }

    /// Subscribe to every event type
    pub fn subscribe_global<F>(&self, handler: F) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_global_with(SubscribeOptions::default(), handler)
    }

    /// Subscribe to every event type with a filter, dispatch mode or owner
    pub fn subscribe_global_with<F>(
        &self,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<SubscriptionId, SubscriptionError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Subscription::new(None, options, Arc::new(handler)))
    }

    fn register(&self, subscription: Subscription) -> Result<SubscriptionId, SubscriptionError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(SubscriptionError::BusClosed);
        }
        let scope = subscription
            .event_type()
            .unwrap_or("*")
            .to_string();
        let id = state.registry.insert(subscription);
        tracing::debug!("Subscription {} added for {}", id, scope);
        Ok(id)
    }

    /// Unsubscribe from events
    ///
    /// Returns true if the subscription was found and removed. Takes effect
    /// for every event dispatched afterwards; deliveries already in progress
    /// or handed to the worker pool still complete.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.shared.state.lock().registry.remove(id);
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Unsubscribe, reporting unknown ids as an error
    pub fn try_unsubscribe(&self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        if self.unsubscribe(id) {
            Ok(())
        } else {
            Err(SubscriptionError::UnknownSubscription(id))
        }
    }

    /// Remove all subscriptions for one type, or every subscription
    /// (global ones included) when `event_type` is `None`
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_all(&self, event_type: Option<&str>) -> usize {
        let mut state = self.shared.state.lock();
        let removed = match event_type {
            Some(event_type) => state.registry.remove_type(event_type),
            None => state.registry.clear(),
        };
        tracing::debug!(
            "Removed {} subscriptions for {}",
            removed,
            event_type.unwrap_or("all types")
        );
        removed
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Number of type-specific subscriptions for `event_type`
    pub fn subscriber_count_for(&self, event_type: &str) -> usize {
        self.shared.state.lock().registry.len_for(event_type)
    }

    /// Event types with at least one type-specific subscription, sorted
    pub fn subscribed_types(&self) -> Vec<String> {
        self.shared.state.lock().registry.types()
    }

    /// Get recent event history, most recent first
    pub fn get_event_history(
        &self,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<Arc<Event>> {
        self.shared.state.lock().history.recent(event_type, limit)
    }

    /// Number of events currently held in history
    pub fn history_len(&self) -> usize {
        self.shared.state.lock().history.len()
    }

    /// Clear event history
    pub fn clear_history(&self) {
        self.shared.state.lock().history.clear();
    }

    /// Snapshot of per-type processing statistics
    pub fn get_processing_stats(&self) -> HashMap<String, ProcessingStats> {
        self.shared.stats.snapshot()
    }

    /// Reset processing statistics
    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    /// Get a receiver for bus notifications
    pub fn notifications(&self) -> broadcast::Receiver<BusNotification> {
        self.shared.notifier.subscribe()
    }

    /// Number of queued events not yet dispatched
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Stop draining the queue; publishes keep queueing
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        tracing::debug!("Dispatch paused");
    }

    /// Resume draining the queue
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.wake.notify_all();
        tracing::debug!("Dispatch resumed");
    }

    /// Whether dispatch is paused
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Whether the bus has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Wait until the queue is empty, no batch is being dispatched and no
    /// async callback is running
    ///
    /// Returns false if that did not happen within `timeout`. Calling this
    /// from inside a callback waits for the callback itself and times out.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.shared.wait_idle(timeout)
    }

    /// Deliver everything still queued, then stop the dispatch loop and the
    /// worker pool
    ///
    /// Further publishes and subscribes fail with `BusClosed`. Idempotent.
    ///
    /// When called from inside a queued or async callback (including by
    /// dropping the last handle there), the calling callback is part of the
    /// work being drained, so the teardown finishes on a separate
    /// `bizdesk-shutdown` thread and this call returns immediately.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.wake.notify_all();

        let dispatcher = self.dispatcher.lock().take();
        let workers = self.workers.lock().take();

        if !self.shared.is_serving_thread() {
            finish_shutdown(&self.shared, dispatcher, workers);
            return;
        }

        tracing::debug!("Shutdown requested from a callback, finishing in the background");
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("bizdesk-shutdown".to_string())
            .spawn(move || finish_shutdown(&shared, dispatcher, workers));
        if let Err(e) = spawned {
            // Dropping the pool here abandons async work that has not started
            tracing::error!("Failed to start shutdown thread: {}", e);
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.shared.config
    }
}

/// Wait for the dispatch loop to drain and exit, give async callbacks up to
/// the shutdown timeout, then stop the worker pool
fn finish_shutdown(
    shared: &Shared,
    dispatcher: Option<JoinHandle<()>>,
    workers: Option<WorkerPool>,
) {
    if let Some(handle) = dispatcher {
        if handle.join().is_err() {
            tracing::error!("Dispatch thread panicked");
        }
    }

    let timeout = shared.config.shutdown_timeout();
    if !shared.wait_idle(timeout) {
        tracing::warn!(
            "Async callbacks still running after {:?}, abandoning them",
            timeout
        );
    }

    if let Some(mut workers) = workers {
        workers.shutdown();
    }
    tracing::info!("Event bus shut down");
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("pending", &self.pending_count())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Process-wide default event bus
static EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Get or initialize the default event bus
///
/// Convenience accessor for code that has no bus injected. Components that
/// need isolation (tests in particular) should own an `EventBus` instead.
pub fn event_bus() -> &'static EventBus {
    EVENT_BUS.get_or_init(EventBus::new)
}

/// Initialize the default event bus with custom configuration
///
/// Must be called before any calls to `event_bus()`. Returns an error if
/// the configuration is invalid or the default bus already exists.
pub fn init_event_bus(config: EventBusConfig) -> Result<(), EventBusError> {
    if EVENT_BUS.get().is_some() {
        return Err(EventBusError::AlreadyInitialized);
    }
    let bus = EventBus::with_config(config)?;
    EVENT_BUS
        .set(bus)
        .map_err(|_| EventBusError::AlreadyInitialized)
}

/// Convenience macro to publish an event to the default event bus
#[macro_export]
macro_rules! emit {
    ($event_type:expr) => {
        $crate::event_bus::event_bus().publish($crate::event_bus::NewEvent::new($event_type))
    };
    ($event_type:expr, $data:expr) => {
        $crate::event_bus::event_bus()
            .publish($crate::event_bus::NewEvent::new($event_type).data($data))
    };
}

/// Convenience macro to subscribe to events on the default event bus
#[macro_export]
macro_rules! on_event {
    ($event_type:expr, $handler:expr) => {
        $crate::event_bus::event_bus().subscribe($event_type, $handler)
    };
}
