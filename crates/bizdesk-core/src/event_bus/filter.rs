//! Subscription filters.

use std::collections::HashSet;
use std::sync::Arc;

use super::events::{Event, Priority};

type PredicateFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Filter to receive only events of interest
#[derive(Clone)]
pub enum EventFilter {
    /// Receive events whose type is in the set.
    Types(HashSet<String>),
    /// Receive events published by one of these sources.
    Sources(HashSet<String>),
    /// Receive events at or above this priority.
    MinPriority(Priority),
    /// Receive events accepted by a custom predicate.
    Predicate(PredicateFn),
}

impl EventFilter {
    /// Filter on a set of event types
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventFilter::Types(types.into_iter().map(Into::into).collect())
    }

    /// Filter on a set of sources
    pub fn sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventFilter::Sources(sources.into_iter().map(Into::into).collect())
    }

    /// Filter on a minimum priority
    pub fn min_priority(priority: Priority) -> Self {
        EventFilter::MinPriority(priority)
    }

    /// Filter with a custom predicate
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        EventFilter::Predicate(Arc::new(predicate))
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::Types(types) => types.contains(event.event_type()),
            EventFilter::Sources(sources) => event
                .source()
                .is_some_and(|source| sources.contains(source)),
            EventFilter::MinPriority(min) => event.priority() >= *min,
            EventFilter::Predicate(predicate) => predicate(event),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFilter::Types(types) => f.debug_tuple("Types").field(types).finish(),
            EventFilter::Sources(sources) => f.debug_tuple("Sources").field(sources).finish(),
            EventFilter::MinPriority(min) => f.debug_tuple("MinPriority").field(min).finish(),
            EventFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
