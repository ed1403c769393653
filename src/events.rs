//! # Events Module
//!
//! A small publish/subscribe bus for crawl lifecycle events.
//!
//! Listeners are registered per [`EventKind`]. [`EventBus::notify`] hands the
//! event to every listener of its kind as a separately spawned task and
//! returns immediately, so a slow, failing or panicking listener neither
//! blocks the crawl nor affects other listeners.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::events::{Event, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! bus.subscribe(EventKind::Error, |event| async move {
//!     if let Event::Error { error, source } = event {
//!         eprintln!("{source} failed: {error}");
//!     }
//! });
//! ```

use crate::error::SpiderError;
use crate::request::Request;
use crate::response::Response;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// Names of the published events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Opened,
    Closed,
    Error,
    ResponseReceived,
    Ignored,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Opened => "opened",
            EventKind::Closed => "closed",
            EventKind::Error => "error",
            EventKind::ResponseReceived => "response_received",
            EventKind::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Opened,
    /// The crawl closed with `reason` (`finished` or `shutdown`).
    Closed { reason: String },
    /// A unit of work failed. `source` names the stage that failed.
    Error {
        error: Arc<SpiderError>,
        source: String,
    },
    ResponseReceived(Response),
    Ignored {
        reason: Option<String>,
        request: Request,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Opened => EventKind::Opened,
            Event::Closed { .. } => EventKind::Closed,
            Event::Error { .. } => EventKind::Error,
            Event::ResponseReceived(_) => EventKind::ResponseReceived,
            Event::Ignored { .. } => EventKind::Ignored,
        }
    }

    pub fn error(error: SpiderError, source: impl Into<String>) -> Self {
        Event::Error {
            error: Arc::new(error),
            source: source.into(),
        }
    }
}

pub type Listener = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: DashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an async listener for `kind`.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(move |event| listener(event).boxed());
        self.listeners.entry(kind).or_default().push((id, listener));
        trace!("Listener {:?} subscribed to {}", id, kind);
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        match self.listeners.get_mut(&kind) {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|(listener_id, _)| *listener_id != id);
                entries.len() != before
            }
            None => false,
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, |entries| entries.len())
    }

    /// Dispatches `event` to its listeners without waiting for them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify(&self, event: Event) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener> = match self.listeners.get(&kind) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        trace!("Notifying {} listener(s) of {}", listeners.len(), kind);
        for listener in &listeners {
            let call = listener(event.clone());
            tokio::spawn(async move {
                if std::panic::AssertUnwindSafe(call)
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!("A listener of the {} event panicked", kind);
                }
            });
        }
        listeners.len()
    }
}
