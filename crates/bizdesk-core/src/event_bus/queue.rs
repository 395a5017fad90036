//! Pending events awaiting asynchronous dispatch.
//!
//! One FIFO lane per priority level, drained from critical down to low.
//! Insert and pop are O(1) and events of equal priority keep publish order.

use std::collections::VecDeque;
use std::sync::Arc;

use super::events::{Event, Priority};

#[derive(Debug, Default)]
pub(crate) struct PriorityQueue {
    lanes: [VecDeque<Arc<Event>>; Priority::ALL.len()],
}

impl PriorityQueue {
    pub(crate) fn push(&mut self, event: Arc<Event>) {
        self.lanes[event.priority().level() as usize].push_back(event);
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<Event>> {
        self.lanes
            .iter_mut()
            .rev()
            .find_map(|lane| lane.pop_front())
    }

    /// Take up to `max` events, highest priority first
    pub(crate) fn drain_batch(&mut self, max: usize) -> Vec<Arc<Event>> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        while batch.len() < max {
            match self.pop() {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        batch
    }

    pub(crate) fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}
