//! Subscriptions and the subscription registry.
//!
//! The registry is a plain data structure; the bus guards it with its
//! coarse state lock and takes per-event snapshots before invoking callbacks.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

use super::events::Event;
use super::filter::EventFilter;
use crate::error::CallbackError;

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Where a subscriber's callback runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Inline, on the dispatching thread.
    #[default]
    Sync,
    /// On the bus worker pool.
    Async,
}

/// Type alias for event handler functions
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Optional parameters for a subscription
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Only deliver events accepted by this filter.
    pub filter: Option<EventFilter>,
    /// Where the callback runs.
    pub mode: DispatchMode,
    /// Component name matched against an event's `target`.
    pub owner: Option<String>,
}

impl SubscribeOptions {
    /// Default options: no filter, synchronous, no owner
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver only events accepted by `filter`
    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Run the callback on the worker pool
    pub fn asynchronous(mut self) -> Self {
        self.mode = DispatchMode::Async;
        self
    }

    /// Set the dispatch mode
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Name the component owning this subscription
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// A registered callback binding
pub struct Subscription {
    id: SubscriptionId,
    event_type: Option<String>,
    filter: Option<EventFilter>,
    mode: DispatchMode,
    owner: Option<String>,
    handler: EventHandler,
}

impl Subscription {
    pub(crate) fn new(
        event_type: Option<String>,
        options: SubscribeOptions,
        handler: EventHandler,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            event_type,
            filter: options.filter,
            mode: options.mode,
            owner: options.owner,
            handler,
        }
    }

    /// Subscription id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Subscribed type, `None` for global subscriptions
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// Dispatch mode
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Owning component
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Whether this subscription wants the event, after filter and target routing
    pub fn accepts(&self, event: &Event) -> bool {
        if let Some(filter) = &self.filter {
            if !filter.matches(event) {
                return false;
            }
        }
        // Target routing only applies when both sides name a component.
        match (event.target(), self.owner.as_deref()) {
            (Some(target), Some(owner)) => target == owner,
            _ => true,
        }
    }

    /// Run the callback, converting errors and panics into `CallbackError`
    pub(crate) fn invoke(&self, event: &Event) -> Result<(), CallbackError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CallbackError::Failed(format!("{:#}", e))),
            Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("filter", &self.filter)
            .field("mode", &self.mode)
            .field("owner", &self.owner)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Typed and global subscriptions, in registration order
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    typed: HashMap<String, Vec<Arc<Subscription>>>,
    global: Vec<Arc<Subscription>>,
    index: HashMap<SubscriptionId, Option<String>>,
}

impl SubscriptionRegistry {
    pub(crate) fn insert(&mut self, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id;
        let key = subscription.event_type.clone();
        let subscription = Arc::new(subscription);
        match &key {
            Some(event_type) => self
                .typed
                .entry(event_type.clone())
                .or_default()
                .push(subscription),
            None => self.global.push(subscription),
        }
        self.index.insert(id, key);
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(key) = self.index.remove(&id) else {
            return false;
        };
        match key {
            Some(event_type) => {
                if let Some(subs) = self.typed.get_mut(&event_type) {
                    subs.retain(|s| s.id != id);
                    if subs.is_empty() {
                        self.typed.remove(&event_type);
                    }
                }
            }
            None => self.global.retain(|s| s.id != id),
        }
        true
    }

    /// Remove every subscription registered for `event_type`
    pub(crate) fn remove_type(&mut self, event_type: &str) -> usize {
        let removed = self.typed.remove(event_type).unwrap_or_default();
        for sub in &removed {
            self.index.remove(&sub.id);
        }
        removed.len()
    }

    /// Remove everything, global subscriptions included
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.index.len();
        self.typed.clear();
        self.global.clear();
        self.index.clear();
        count
    }

    /// Candidates for an event: typed subscribers first, then global ones
    pub(crate) fn snapshot(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        let typed = self.typed.get(event_type).map(Vec::as_slice).unwrap_or(&[]);
        typed.iter().chain(self.global.iter()).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn len_for(&self, event_type: &str) -> usize {
        self.typed.get(event_type).map_or(0, Vec::len)
    }

    pub(crate) fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.typed.keys().cloned().collect();
        types.sort();
        types
    }
}
