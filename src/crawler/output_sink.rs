//! Output sink.
//!
//! Callbacks push every output they produce into the `OutputSink`. A single
//! drain task at a time empties the queue: requests go back to the
//! scheduler, records go through the registered pipelines in order. Pushing
//! while no drain task runs starts one; pushing while one runs only queues.
//!
//! The pending count covers queued outputs and the one being handled, and
//! is decremented only after an output has been fully handled, so
//! `is_idle()` never reports idle while a follow-up request is still on its
//! way to the scheduler.

use crate::events::{Event, EventBus};
use crate::item::{Output, Record};
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::stats::StatCollector;
use crossbeam::queue::SegQueue;
use futures_util::FutureExt;
use log::{debug, error, trace, warn};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct OutputSink {
    queue: SegQueue<Output>,
    pending: AtomicUsize,
    draining: AtomicBool,
    idle: Notify,
    scheduler: Arc<Scheduler>,
    pipelines: Arc<Vec<Box<dyn Pipeline>>>,
    stats: Arc<StatCollector>,
    events: Arc<EventBus>,
}

impl OutputSink {
    pub fn new(
        scheduler: Arc<Scheduler>,
        pipelines: Arc<Vec<Box<dyn Pipeline>>>,
        stats: Arc<StatCollector>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(OutputSink {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            idle: Notify::new(),
            scheduler,
            pipelines,
            stats,
            events,
        })
    }

    /// Queues an output and makes sure a drain task is running.
    pub fn push(self: &Arc<Self>, output: Output) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.queue.push(output);
        self.ensure_draining();
    }

    fn ensure_draining(self: &Arc<Self>) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let sink = Arc::clone(self);
            tokio::spawn(sink.drain());
        }
    }

    async fn drain(self: Arc<Self>) {
        trace!("Output sink drain started");
        loop {
            while let Some(output) = self.queue.pop() {
                if AssertUnwindSafe(self.handle(output))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!("Handling an output panicked");
                }
                if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    self.idle.notify_waiters();
                }
            }

            self.draining.store(false, Ordering::SeqCst);
            // A push may have landed between the last pop and clearing the flag.
            if self.queue.is_empty()
                || self
                    .draining
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }
        trace!("Output sink drain finished");
    }

    async fn handle(&self, output: Output) {
        match output {
            Output::Request(request) => {
                trace!("Re-submitting {} to the scheduler", request);
                match self.scheduler.enqueue_request(request) {
                    Ok(()) => self.stats.increment_requests_enqueued(),
                    Err(e) => warn!("Follow-up request not scheduled: {}", e),
                }
            }
            Output::Record(record) => self.finalize(record).await,
        }
    }

    async fn finalize(&self, record: Record) {
        self.stats.increment_records_scraped();
        let mut record = record;
        for pipeline in self.pipelines.iter() {
            match pipeline.process_record(record).await {
                Ok(Some(next)) => record = next,
                Ok(None) => {
                    debug!("Record dropped by pipeline {}", pipeline.name());
                    self.stats.increment_records_dropped();
                    return;
                }
                Err(e) => {
                    error!("Pipeline {} failed: {}", pipeline.name(), e);
                    self.stats.increment_records_dropped();
                    self.stats.increment_errors();
                    self.events
                        .notify(Event::error(e, format!("pipeline:{}", pipeline.name())));
                    return;
                }
            }
        }
        self.stats.increment_records_processed();
    }

    /// Number of outputs queued or being handled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// True iff nothing is queued or being handled.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}
