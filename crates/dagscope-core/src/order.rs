//! Topological delivery buffer.
//!
//! Events arrive in whatever order the depth-first download walk finds
//! them; consumers must see every event strictly after all of its
//! parents. [`OrderingBuffer::push`] holds unsatisfied events and returns
//! the ones a push just made deliverable, in a parents-first order.
//!
//! # Backpressure
//!
//! Pending (parent-waiting) capacity is bounded. The policy is **reject**:
//! a push that would exceed the bound fails with
//! [`OrderingError::BufferFull`] and the event is dropped — the next poll
//! rebuilds the pass and re-downloads it. Events that are deliverable
//! immediately never consume pending capacity.
//!
//! # Known leak
//!
//! An event whose parent never arrives stays pending for the lifetime of
//! the buffer. That is deliberate; [`OrderingBuffer::pending_len`] exposes
//! the count so callers can log it.

use std::collections::{HashMap, VecDeque};

use crate::event::{Event, EventId};

/// Default bound on parent-waiting events.
pub const DEFAULT_PENDING_LIMIT: usize = 4096;

/// Ordering-buffer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    /// The pending capacity would be exceeded; the pushed event was
    /// rejected.
    #[error("ordering buffer full: {capacity} events pending")]
    BufferFull { capacity: usize },
}

#[derive(Debug)]
struct Pending {
    event: Event,
    missing: usize,
}

/// Buffers out-of-order events and releases them parents-first.
#[derive(Debug)]
pub struct OrderingBuffer {
    delivered: HashMap<EventId, Event>,
    pending: HashMap<EventId, Pending>,
    /// Undelivered parent id → pending events waiting on it.
    waiters: HashMap<EventId, Vec<EventId>>,
    capacity: usize,
}

impl OrderingBuffer {
    /// Create a buffer holding at most `capacity` pending events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            delivered: HashMap::new(),
            pending: HashMap::new(),
            waiters: HashMap::new(),
            capacity,
        }
    }

    /// Enqueue one event.
    ///
    /// Returns the events this push made deliverable (possibly empty,
    /// possibly a cascade), each after all of its parents. A duplicate of
    /// an already-known id is a no-op.
    ///
    /// # Errors
    ///
    /// [`OrderingError::BufferFull`] when the event must wait for parents
    /// and the pending capacity is exhausted.
    pub fn push(&mut self, event: Event) -> Result<Vec<Event>, OrderingError> {
        if self.delivered.contains_key(&event.id) || self.pending.contains_key(&event.id) {
            tracing::trace!(id = %event.id, "duplicate push ignored");
            return Ok(Vec::new());
        }

        let missing = event
            .parents
            .iter()
            .filter(|p| !self.delivered.contains_key(p))
            .count();

        if missing == 0 {
            return Ok(self.deliver_cascade(event));
        }

        if self.pending.len() >= self.capacity {
            return Err(OrderingError::BufferFull { capacity: self.capacity });
        }

        for parent in event.parents.iter().filter(|p| !self.delivered.contains_key(p)) {
            self.waiters.entry(*parent).or_default().push(event.id);
        }
        self.pending.insert(event.id, Pending { event, missing });
        Ok(Vec::new())
    }

    /// Whether `id` has been delivered.
    #[must_use]
    pub fn exists(&self, id: EventId) -> bool {
        self.delivered.contains_key(&id)
    }

    /// A delivered event by id.
    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.delivered.get(&id)
    }

    /// Number of events still waiting for parents.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of delivered events.
    #[must_use]
    pub fn delivered_len(&self) -> usize {
        self.delivered.len()
    }

    fn deliver_cascade(&mut self, event: Event) -> Vec<Event> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([event]);

        while let Some(e) = queue.pop_front() {
            let id = e.id;
            self.delivered.insert(id, e.clone());
            out.push(e);

            let Some(children) = self.waiters.remove(&id) else {
                continue;
            };
            for child in children {
                let Some(p) = self.pending.get_mut(&child) else {
                    continue;
                };
                p.missing -= 1;
                if p.missing == 0 {
                    let Some(p) = self.pending.remove(&child) else {
                        continue;
                    };
                    queue.push_back(p.event);
                }
            }
        }
        out
    }
}

impl Default for OrderingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_LIMIT)
    }
}
