//! Dispatch engine shared by the publisher API, the dispatch loop and the
//! worker pool.
//!
//! Registry, queue, history and loop bookkeeping live behind one coarse
//! lock. Callbacks never run while that lock is held.

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::config::EventBusConfig;
use super::events::Event;
use super::history::EventHistory;
use super::notify::BusNotification;
use super::queue::PriorityQueue;
use super::stats::StatsCollector;
use super::subscription::{DispatchMode, Subscription, SubscriptionId, SubscriptionRegistry};
use super::worker::Spawner;
use crate::error::CallbackError;

thread_local! {
    /// Address of the bus whose dispatch loop or worker job runs on this thread
    static SERVING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as doing work for one bus until dropped.
struct ServingGuard {
    previous: usize,
}

impl ServingGuard {
    fn enter(shared: &Shared) -> Self {
        let previous = SERVING.with(|serving| serving.replace(shared.address()));
        Self { previous }
    }
}

impl Drop for ServingGuard {
    fn drop(&mut self) {
        SERVING.with(|serving| serving.set(self.previous));
    }
}

pub(crate) struct State {
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) queue: PriorityQueue,
    pub(crate) history: EventHistory,
    pub(crate) paused: bool,
    pub(crate) closed: bool,
    dispatching: bool,
    in_flight: usize,
}

impl State {
    fn new(history_capacity: usize) -> Self {
        Self {
            registry: SubscriptionRegistry::default(),
            queue: PriorityQueue::default(),
            history: EventHistory::new(history_capacity),
            paused: false,
            closed: false,
            dispatching: false,
            in_flight: 0,
        }
    }

    /// Nothing queued, no batch being dispatched, no async callback running
    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.dispatching && self.in_flight == 0
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    /// Signalled when events are queued, the loop is resumed or the bus closes.
    pub(crate) wake: Condvar,
    /// Signalled when the bus may have become idle.
    pub(crate) idle: Condvar,
    pub(crate) stats: StatsCollector,
    pub(crate) notifier: broadcast::Sender<BusNotification>,
    pub(crate) config: EventBusConfig,
    spawner: Spawner,
}

impl Shared {
    pub(crate) fn new(config: EventBusConfig, spawner: Spawner) -> Self {
        let (notifier, _) = broadcast::channel(config.notification_capacity);
        Self {
            state: Mutex::new(State::new(config.history_capacity)),
            wake: Condvar::new(),
            idle: Condvar::new(),
            stats: StatsCollector::default(),
            notifier,
            config,
            spawner,
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Whether the calling thread is this bus's dispatch thread or one of
    /// its workers running a callback
    pub(crate) fn is_serving_thread(&self) -> bool {
        SERVING.with(|serving| serving.get() == self.address())
    }

    /// Block until idle or until `timeout` elapses. Returns whether idle.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_idle() {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    pub(crate) fn notify(&self, notification: BusNotification) {
        // No receivers is fine
        let _ = self.notifier.send(notification);
    }

    /// Deliver one event to a snapshot of its subscribers.
    ///
    /// Sync subscribers run on the calling thread, async ones are handed to
    /// the worker pool. Returns the number of sync callbacks that failed.
    pub(crate) fn dispatch(self: &Arc<Self>, event: &Arc<Event>) -> usize {
        let candidates = self.state.lock().registry.snapshot(event.event_type());
        let started = Instant::now();
        let mut failures = 0;

        for subscription in candidates {
            let accepted =
                panic::catch_unwind(AssertUnwindSafe(|| subscription.accepts(event)))
                    .unwrap_or_else(|_| {
                        tracing::warn!(
                            event_id = %event.id(),
                            subscription = %subscription.id(),
                            "Subscription filter panicked, skipping"
                        );
                        false
                    });
            if !accepted {
                continue;
            }

            match subscription.mode() {
                DispatchMode::Sync => {
                    if let Err(err) = subscription.invoke(event) {
                        failures += 1;
                        self.report_failure(event, subscription.id(), &err);
                    }
                }
                DispatchMode::Async => self.submit_async(event, subscription),
            }
        }

        let elapsed = started.elapsed();
        self.stats.record_processed(event.event_type(), elapsed);
        tracing::trace!(
            event_id = %event.id(),
            elapsed_us = elapsed.as_micros() as u64,
            failures,
            "Event processed"
        );
        self.notify(BusNotification::Processed {
            event_id: event.id().clone(),
            event_type: event.event_type().to_string(),
            elapsed,
            failures,
        });
        failures
    }

    fn submit_async(self: &Arc<Self>, event: &Arc<Event>, subscription: Arc<Subscription>) {
        let guard = InFlightGuard::enter(Arc::clone(self));
        let event = Arc::clone(event);
        // One lane per subscription keeps its deliveries in dispatch order
        self.spawner.submit(subscription.id(), move || {
            let serving = ServingGuard::enter(&guard.shared);
            if let Err(err) = subscription.invoke(&event) {
                guard.shared.report_failure(&event, subscription.id(), &err);
            }
            drop(serving);
            drop(guard);
        });
    }

    fn report_failure(&self, event: &Event, subscription: SubscriptionId, err: &CallbackError) {
        self.stats.record_error(event.event_type());
        tracing::warn!(
            event_id = %event.id(),
            event_type = event.event_type(),
            subscription = %subscription,
            "Subscriber callback failed: {}",
            err
        );
        self.notify(BusNotification::EventError {
            event_id: event.id().clone(),
            event_type: event.event_type().to_string(),
            subscription,
            message: err.to_string(),
        });
    }
}

/// Counts one async callback as in flight until dropped.
///
/// Dropping also covers jobs discarded by a pool that already shut down.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl InFlightGuard {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.state.lock().in_flight += 1;
        Self { shared }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.in_flight -= 1;
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
    }
}

/// Body of the dispatch thread.
///
/// Sleeps until woken or one tick elapses, then drains up to `batch_size`
/// events, highest priority first. Exits once the bus is closed and the
/// queue is empty.
pub(crate) fn run_dispatch_loop(shared: Arc<Shared>) {
    let tick = shared.config.tick_interval();
    let batch_size = shared.config.batch_size;
    let _serving = ServingGuard::enter(&shared);
    tracing::debug!("Dispatch loop started");

    loop {
        let batch = {
            let mut state = shared.state.lock();
            while !state.closed && (state.paused || state.queue.is_empty()) {
                shared.wake.wait_for(&mut state, tick);
            }
            if state.queue.is_empty() {
                break;
            }
            state.dispatching = true;
            state.queue.drain_batch(batch_size)
        };

        tracing::trace!("Dispatching batch of {} events", batch.len());
        for event in &batch {
            shared.dispatch(event);
        }

        let mut state = shared.state.lock();
        state.dispatching = false;
        if state.is_idle() {
            shared.idle.notify_all();
        }
    }

    tracing::debug!("Dispatch loop stopped");
}
