//! # Scheduler Module
//!
//! Implements the request scheduler that holds the crawling frontier.
//!
//! ## Overview
//!
//! The `Scheduler` wraps a [`PriorityQueue`] and is shared between the engine
//! loop, which dequeues, and every unit of work that produces follow-up or
//! rescheduled requests, which enqueue. Enqueuing never waits. Dequeuing waits
//! at most one poll interval for a request to show up and then reports
//! "nothing right now" with `None`, so the engine loop can go back to pulling
//! seed requests or checking for termination instead of stalling on a
//! transiently empty queue.
//!
//! ## Key Responsibilities
//!
//! - **Priority Ordering**: smallest priority value first, FIFO among equals
//! - **Bounded Waiting**: `next_request` never blocks past the poll interval
//! - **Idle Reporting**: `is_idle` is true iff no request is queued
//! - **Request Salvaging**: requests arriving after shutdown are kept aside
//!   and reported instead of being silently lost
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::Scheduler;
//! use spider_engine::request::Request;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new(Duration::from_millis(100));
//! scheduler.open();
//! scheduler.enqueue_request(Request::get("https://example.com")?)?;
//! let next = scheduler.next_request().await;
//! ```

use crate::error::SpiderError;
use crate::queue::PriorityQueue;
use crate::request::Request;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

pub struct Scheduler {
    request_queue: Mutex<PriorityQueue>,
    notify: Notify,
    salvaged_requests: SegQueue<Request>,
    pub(crate) is_shutting_down: AtomicBool,
    poll_interval: Duration,
}

impl Scheduler {
    /// Creates a new `Scheduler` whose `next_request` waits at most `poll_interval`.
    pub fn new(poll_interval: Duration) -> Arc<Self> {
        Arc::new(Scheduler {
            request_queue: Mutex::new(PriorityQueue::new()),
            notify: Notify::new(),
            salvaged_requests: SegQueue::new(),
            is_shutting_down: AtomicBool::new(false),
            poll_interval,
        })
    }

    /// Prepares the scheduler for a crawl.
    pub fn open(&self) {
        self.is_shutting_down.store(false, Ordering::SeqCst);
        info!(
            "Scheduler opened with poll interval {:?} and {} queued requests",
            self.poll_interval,
            self.len()
        );
    }

    /// Enqueues a request. Never waits.
    ///
    /// After [`Scheduler::shutdown`] the request is salvaged instead and an
    /// error is returned.
    pub fn enqueue_request(&self, request: Request) -> Result<(), SpiderError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            debug!("Scheduler is shutting down, salvaging request: {}", request);
            self.salvaged_requests.push(request);
            return Err(SpiderError::GeneralError(
                "Scheduler is shutting down, request salvaged.".into(),
            ));
        }

        trace!(
            "Enqueuing request {} with priority {}",
            request,
            request.priority
        );
        self.request_queue.lock().push(request);
        self.notify.notify_one();
        Ok(())
    }

    /// Takes the next request without waiting.
    pub fn try_next_request(&self) -> Option<Request> {
        self.request_queue.lock().pop()
    }

    /// Returns the highest-priority request, waiting at most one poll
    /// interval for one to arrive.
    pub async fn next_request(&self) -> Option<Request> {
        if let Some(request) = self.try_next_request() {
            return Some(request);
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Registered before the second check so an enqueue in between is not missed.
        notified.as_mut().enable();
        if let Some(request) = self.try_next_request() {
            return Some(request);
        }

        match tokio::time::timeout(self.poll_interval, notified).await {
            Ok(()) => self.try_next_request(),
            Err(_) => {
                trace!("No request became available within {:?}", self.poll_interval);
                None
            }
        }
    }

    /// Stops accepting requests and returns those still queued.
    pub fn shutdown(&self) -> Vec<Request> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        let remaining = self.request_queue.lock().drain();
        if !remaining.is_empty() {
            warn!(
                "Scheduler shut down with {} queued requests remaining",
                remaining.len()
            );
        }
        remaining
    }

    /// Takes every request that arrived after shutdown.
    pub fn take_salvaged(&self) -> Vec<Request> {
        let mut salvaged = Vec::new();
        while let Some(request) = self.salvaged_requests.pop() {
            salvaged.push(request);
        }
        salvaged
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Returns the number of queued requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.request_queue.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the scheduler is idle (holds no queued requests).
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }
}
