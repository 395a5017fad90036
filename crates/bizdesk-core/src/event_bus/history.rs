//! Bounded record of published events.

use std::collections::VecDeque;
use std::sync::Arc;

use super::events::Event;

/// Ring buffer of recent events, oldest evicted first
#[derive(Debug)]
pub(crate) struct EventHistory {
    events: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl EventHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn record(&mut self, event: Arc<Event>) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Most recent first, optionally restricted to one type
    pub(crate) fn recent(&self, event_type: Option<&str>, limit: Option<usize>) -> Vec<Arc<Event>> {
        self.events
            .iter()
            .rev()
            .filter(|e| event_type.is_none_or(|t| e.event_type() == t))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}
