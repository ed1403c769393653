//! The core Crawler implementation.
//!
//! `Crawler` is the engine that drives a crawl. A single loop pulls the next
//! request from the scheduler and admits it through the bounded task
//! launcher, where it runs as an independent unit of work. When the scheduler
//! has nothing to hand out, the loop pulls the next seed from the spider; when
//! the seeds are exhausted, it checks whether the crawl is finished.
//!
//! The crawl is finished only when the launcher has no outstanding unit, the
//! output sink holds nothing, the scheduler is empty and the downloader has no
//! fetch in flight. The checks are made in that order, which follows the
//! direction work flows in: a unit that is still running may push a
//! follow-up into the sink, and the sink may hand it on to the scheduler, so
//! each stage is observed empty before the stage it feeds is looked at.
//!
//! A stop request (through [`CrawlerHandle::stop`] or Ctrl-C) makes the loop
//! stop admitting work. In-flight units are never cancelled: draining waits
//! for them, then closes the downloader and the pipelines, publishes the
//! `closed` event and finalizes the stats.

use crate::config::CrawlerConfig;
use crate::crawler::launcher::TaskLauncher;
use crate::crawler::output_sink::OutputSink;
use crate::crawler::request_handler::RequestHandler;
use crate::downloader::Downloader;
use crate::error::SpiderError;
use crate::events::{Event, EventBus};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::scheduler::Scheduler;
use crate::spider::{Seeds, Spider};
use crate::state::{CrawlerHandle, CrawlerState, EngineState};
use crate::stats::StatCollector;
use futures_util::future::join_all;
use futures_util::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Finish reason of a crawl that ran out of work.
pub const FINISH_REASON_FINISHED: &str = "finished";
/// Finish reason of a crawl that was asked to stop.
pub const FINISH_REASON_SHUTDOWN: &str = "shutdown";

/// The central orchestrator of a crawl.
pub struct Crawler<S: Spider> {
    spider: Arc<S>,
    config: CrawlerConfig,
    scheduler: Arc<Scheduler>,
    downloader: Arc<dyn Downloader>,
    handler: Arc<RequestHandler<S>>,
    sink: Arc<OutputSink>,
    pipelines: Arc<Vec<Box<dyn Pipeline>>>,
    launcher: TaskLauncher,
    stats: Arc<StatCollector>,
    events: Arc<EventBus>,
    state: Arc<CrawlerState>,
}

impl<S: Spider> Crawler<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        spider: Arc<S>,
        config: CrawlerConfig,
        scheduler: Arc<Scheduler>,
        downloader: Arc<dyn Downloader>,
        handler: Arc<RequestHandler<S>>,
        sink: Arc<OutputSink>,
        pipelines: Arc<Vec<Box<dyn Pipeline>>>,
        stats: Arc<StatCollector>,
        events: Arc<EventBus>,
    ) -> Self {
        let launcher = TaskLauncher::new(config.concurrency);
        Crawler {
            spider,
            config,
            scheduler,
            downloader,
            handler,
            sink,
            pipelines,
            launcher,
            stats,
            events,
            state: CrawlerState::new(),
        }
    }

    /// A cloneable handle to observe the crawl and stop it from elsewhere.
    pub fn handle(&self) -> CrawlerHandle {
        CrawlerHandle::new(Arc::clone(&self.state))
    }

    /// Returns a cloned Arc to the `StatCollector` instance used by this crawler.
    ///
    /// This allows programmatic access to the collected statistics at any time during or after the crawl.
    pub fn get_stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// The event bus of this crawl. Listeners can be added before starting it.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn spider_name(&self) -> &str {
        self.spider.name()
    }

    /// Leaves Ctrl-C to whoever runs this crawl alongside others.
    pub(crate) fn without_ctrl_c(mut self) -> Self {
        self.config.handle_ctrl_c = false;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Runs the crawl until it runs out of work or is asked to stop.
    pub async fn start_crawl(self) -> Result<(), SpiderError> {
        info!(
            "Crawler starting spider '{}' with concurrency={}, downloader={}, middlewares={:?}",
            self.spider.name(),
            self.config.concurrency,
            self.downloader.name(),
            self.handler.chain().names()
        );

        self.state.set(EngineState::Running);
        self.scheduler.open();
        if let Err(e) = self.downloader.open().await {
            error!("Failed to open downloader {}: {}", self.downloader.name(), e);
            self.state.set(EngineState::Closed);
            return Err(e);
        }
        self.events.notify(Event::Opened);

        let status_task = self.spawn_status_logger();
        let ctrl_c_task = self
            .config
            .handle_ctrl_c
            .then(|| self.spawn_ctrl_c_listener());

        let reason = self.run(self.spider.start_requests()).await;

        if let Some(task) = ctrl_c_task {
            task.abort();
        }
        status_task.abort();

        self.close(reason).await;
        Ok(())
    }

    async fn run(&self, seeds: Seeds) -> &'static str {
        let mut seeds = Some(seeds);
        loop {
            if self.state.stop_requested() {
                info!("Stop requested, no new requests will be dispatched.");
                return FINISH_REASON_SHUTDOWN;
            }

            if let Some(request) = self.scheduler.next_request().await {
                let handler = Arc::clone(&self.handler);
                self.launcher.launch(handler.handle(request)).await;
                continue;
            }

            if let Some(source) = seeds.as_mut() {
                match source.next().await {
                    Some(Ok(request)) => {
                        self.enqueue_seed(request);
                        continue;
                    }
                    Some(Err(e)) => {
                        error!("Error during start_requests: {}", e);
                        seeds = None;
                    }
                    None => {
                        debug!("Seed requests exhausted");
                        seeds = None;
                    }
                }
            }

            if self.is_finished() {
                info!("Crawl has become idle, initiating shutdown.");
                return FINISH_REASON_FINISHED;
            }
        }
    }

    fn enqueue_seed(&self, mut request: Request) {
        request.url.set_fragment(None);
        match self.scheduler.enqueue_request(request) {
            Ok(()) => self.stats.increment_requests_enqueued(),
            Err(e) => error!("Failed to enqueue initial request: {}", e),
        }
    }

    fn is_finished(&self) -> bool {
        self.launcher.all_done()
            && self.sink.is_idle()
            && self.scheduler.is_idle()
            && self.downloader.idle()
    }

    async fn close(&self, reason: &str) {
        self.state.set(EngineState::Draining);
        debug!(
            "Draining: waiting for {} outstanding unit(s) of work",
            self.launcher.outstanding()
        );
        self.launcher.wait_all().await;
        self.sink.wait_idle().await;

        for request in self.scheduler.shutdown() {
            debug!("Unprocessed: {}", request);
        }
        let salvaged = self.scheduler.take_salvaged();
        if !salvaged.is_empty() {
            warn!(
                "{} request(s) arrived after the scheduler shut down",
                salvaged.len()
            );
        }

        if let Err(e) = self.downloader.close().await {
            error!("Failed to close downloader {}: {}", self.downloader.name(), e);
        }

        info!("Closing item pipelines...");
        let closing: Vec<_> = self.pipelines.iter().map(|p| p.close()).collect();
        for (pipeline, result) in self.pipelines.iter().zip(join_all(closing).await) {
            if let Err(e) = result {
                error!("Failed to close pipeline {}: {}", pipeline.name(), e);
            }
        }

        self.stats.close(reason);
        self.events.notify(Event::Closed {
            reason: reason.to_string(),
        });
        if self.config.stats_dump {
            info!("{}", self.stats);
        }

        self.state.set(EngineState::Closed);
        info!(
            "Spider '{}' closed ({}). requests_enqueued={}, responses_received={}, records_scraped={}",
            self.spider.name(),
            reason,
            self.stats.requests_enqueued.load(Ordering::SeqCst),
            self.stats.responses_received.load(Ordering::SeqCst),
            self.stats.records_scraped.load(Ordering::SeqCst)
        );
    }

    fn spawn_status_logger(&self) -> JoinHandle<()> {
        let period = self.config.status_interval;
        let scheduler = Arc::clone(&self.scheduler);
        let downloader = Arc::clone(&self.downloader);
        let stats = Arc::clone(&self.stats);

        trace!("Starting status logger with interval: {:?}", period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!(
                    "Crawled {} response(s), scraped {} record(s); {} queued, {} in flight",
                    stats.responses_received.load(Ordering::SeqCst),
                    stats.records_scraped.load(Ordering::SeqCst),
                    scheduler.len(),
                    downloader.active().len()
                );
            }
        })
    }

    fn spawn_ctrl_c_listener(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, initiating graceful shutdown.");
                    state.request_stop();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
            }
        })
    }
}
