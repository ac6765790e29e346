//! # Event Buffer
//!
//! Bounded store of the most recent events, newest first. Inserting past the
//! capacity evicts from the back. An id is never stored twice: re-inserting an
//! id moves the new copy to the front and drops the old one.

use std::collections::VecDeque;

use crate::core::model::NormalizedEvent;

#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<NormalizedEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id)
    }

    /// Id of the newest buffered event.
    pub fn newest_id(&self) -> Option<&str> {
        self.events.front().map(|e| e.id.as_str())
    }

    /// Inserts one event at the front, evicting the oldest beyond capacity.
    pub fn push_front(&mut self, event: NormalizedEvent) {
        if let Some(pos) = self.events.iter().position(|e| e.id == event.id) {
            self.events.remove(pos);
        }
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    /// Prepends a newest-first batch, keeping the batch order at the front.
    pub fn merge_batch(&mut self, batch: &[NormalizedEvent]) {
        for event in batch.iter().rev() {
            self.push_front(event.clone());
        }
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &NormalizedEvent> {
        self.events.iter()
    }
}
