//! Registry of requests currently being fetched.
//!
//! A request enters the registry when [`ActiveRequests::track`] hands out an
//! [`ActiveGuard`] and leaves it when that guard is dropped. Dropping happens
//! on every exit path of the fetch: normal return, an error propagated with
//! `?`, cancellation of the surrounding future, or a panic unwinding through
//! it.
//!
//! Clones of a request share its id, so entries are counted: each guard
//! accounts for one fetch and the id stays registered until the last of them
//! is dropped.

use crate::request::Request;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-flight fetch counts keyed by request id.
#[derive(Debug, Default, Clone)]
pub struct ActiveRequests {
    counts: Arc<DashMap<u64, usize>>,
}

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `request` as in flight until the returned guard is dropped.
    #[must_use = "the request is untracked as soon as the guard is dropped"]
    pub fn track(&self, request: &Request) -> ActiveGuard {
        let id = request.id();
        *self.counts.entry(id).or_insert(0) += 1;
        ActiveGuard {
            counts: Arc::clone(&self.counts),
            id,
        }
    }

    pub fn contains(&self, request: &Request) -> bool {
        self.counts.contains_key(&request.id())
    }

    /// Number of fetches in flight, counting each clone separately.
    pub fn len(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// True iff no fetch is in flight.
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }
}

/// Releases one fetch of its request when dropped.
#[derive(Debug)]
pub struct ActiveGuard {
    counts: Arc<DashMap<u64, usize>>,
    id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.counts.entry(self.id) {
            let remaining = entry.get().saturating_sub(1);
            if remaining == 0 {
                entry.remove();
            } else {
                *entry.get_mut() = remaining;
            }
        }
    }
}
