//! Priority-ordered container of pending requests.
//!
//! Entries are ordered by `(priority, sequence)`: the numerically smallest
//! priority comes out first, and a monotonically increasing sequence number
//! breaks ties so that requests of equal priority leave in insertion order.

use crate::request::Request;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Entry {
    priority: i32,
    sequence: u64,
    request: Request,
}

impl Entry {
    fn key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// A min-priority queue of requests with FIFO tie-breaking.
#[derive(Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_sequence: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Entry {
            priority: request.priority,
            sequence,
            request,
        }));
    }

    /// Removes the request with the smallest priority value.
    pub fn pop(&mut self) -> Option<Request> {
        self.heap.pop().map(|Reverse(entry)| entry.request)
    }

    pub fn peek_priority(&self) -> Option<i32> {
        self.heap.peek().map(|Reverse(entry)| entry.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every pending request, smallest priority first.
    pub fn drain(&mut self) -> Vec<Request> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(request) = self.pop() {
            drained.push(request);
        }
        drained
    }
}
