//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for constructing and configuring
//! `Crawler` instances.
//!
//! ## Overview
//!
//! The builder gathers the spider, a [`CrawlerConfig`] and any custom
//! components, and wires them together in [`CrawlerBuilder::build`]:
//!
//! - **Configuration**: every option has a fluent setter, or a whole
//!   `CrawlerConfig` (for instance loaded from JSON) can be supplied at once
//! - **Downloader**: resolved once from `config.downloader` unless a custom
//!   backend is given
//! - **Middlewares**: the bundled ones named in `config.middlewares` come
//!   first, in order, followed by those added with `add_middleware`
//! - **Pipelines**: a `LoggingPipeline` is added when none is registered
//! - **Spider hooks**: `Spider::opened` and `Spider::closed` are subscribed to
//!   the `opened` and `closed` events
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//!
//! async fn run() -> Result<(), SpiderError> {
//!     let crawler = CrawlerBuilder::new(MySpider)
//!         .concurrency(8)
//!         .add_middleware(RetryMiddleware::new(vec![503], vec![], 3, stats))
//!         .add_pipeline(LoggingPipeline)
//!         .build()
//!         .await?;
//!
//!     crawler.start_crawl().await
//! }
//! ```

use crate::config::CrawlerConfig;
use crate::crawler::{Crawler, MiddlewareManager, OutputSink, RequestHandler};
use crate::downloader::Downloader;
use crate::error::SpiderError;
use crate::events::{Event, EventBus, EventKind};
use crate::middleware::Middleware;
use crate::middlewares::MiddlewareKind;
use crate::pipeline::{LoggingPipeline, Pipeline};
use crate::scheduler::Scheduler;
use crate::spider::Spider;
use crate::stats::StatCollector;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CrawlerBuilder<S: Spider> {
    spider: S,
    config: CrawlerConfig,
    downloader: Option<Arc<dyn Downloader>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    pipelines: Vec<Box<dyn Pipeline>>,
}

impl<S: Spider> CrawlerBuilder<S> {
    /// Creates a new `CrawlerBuilder` for a given spider with the default configuration.
    pub fn new(spider: S) -> Self {
        CrawlerBuilder {
            spider,
            config: CrawlerConfig::default(),
            downloader: None,
            middlewares: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of units of work running at once.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.config.concurrency = limit;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.config.verify_ssl = verify;
        self
    }

    /// Sets how long the engine waits on an empty scheduler before
    /// looking at the seeds again.
    pub fn scheduler_poll_interval(mut self, interval: Duration) -> Self {
        self.config.scheduler_poll_interval = interval;
        self
    }

    pub fn status_interval(mut self, interval: Duration) -> Self {
        self.config.status_interval = interval;
        self
    }

    pub fn stats_dump(mut self, enabled: bool) -> Self {
        self.config.stats_dump = enabled;
        self
    }

    /// Whether Ctrl-C stops the crawl gracefully.
    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.config.handle_ctrl_c = enabled;
        self
    }

    /// Appends a bundled middleware, configured from the crawler configuration.
    pub fn with_middleware_kind(mut self, kind: MiddlewareKind) -> Self {
        self.config.middlewares.push(kind);
        self
    }

    /// Sets a custom downloader for the crawler.
    pub fn downloader<D: Downloader>(mut self, downloader: D) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    /// Adds a middleware to the crawler.
    pub fn add_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Adds a record pipeline to the crawler.
    pub fn add_pipeline<P: Pipeline>(mut self, pipeline: P) -> Self {
        self.pipelines.push(Box::new(pipeline));
        self
    }

    /// Validates the configuration and assembles the `Crawler`.
    pub async fn build(self) -> Result<Crawler<S>, SpiderError> {
        let CrawlerBuilder {
            spider,
            config,
            downloader,
            middlewares: custom_middlewares,
            mut pipelines,
        } = self;

        config.validate()?;

        let stats = Arc::new(StatCollector::new());
        let events = EventBus::new();
        let scheduler = Scheduler::new(config.scheduler_poll_interval);
        let downloader = downloader.unwrap_or_else(|| config.downloader.create(&config));

        let mut middlewares = Vec::new();
        for kind in &config.middlewares {
            match kind.create(&config, &stats)? {
                Some(middleware) => middlewares.push(middleware),
                None => debug!("Middleware {} is disabled by the configuration", kind),
            }
        }
        middlewares.extend(custom_middlewares);

        if pipelines.is_empty() {
            debug!("No pipelines registered, adding LoggingPipeline");
            pipelines.push(Box::new(LoggingPipeline));
        }
        let pipelines = Arc::new(pipelines);

        let spider = Arc::new(spider);
        subscribe_spider_hooks(&events, &spider);

        let sink = OutputSink::new(
            Arc::clone(&scheduler),
            Arc::clone(&pipelines),
            Arc::clone(&stats),
            Arc::clone(&events),
        );
        let chain = MiddlewareManager::new(
            middlewares,
            Arc::clone(&downloader),
            Arc::clone(&scheduler),
            Arc::clone(&stats),
            Arc::clone(&events),
        );
        let handler = RequestHandler::new(
            Arc::clone(&spider),
            chain,
            Arc::clone(&sink),
            Arc::clone(&stats),
            Arc::clone(&events),
        );

        Ok(Crawler::new(
            spider, config, scheduler, downloader, handler, sink, pipelines, stats, events,
        ))
    }
}

fn subscribe_spider_hooks<S: Spider>(events: &EventBus, spider: &Arc<S>) {
    let opened = Arc::clone(spider);
    events.subscribe(EventKind::Opened, move |_| {
        let spider = Arc::clone(&opened);
        async move { spider.opened().await }
    });

    let closed = Arc::clone(spider);
    events.subscribe(EventKind::Closed, move |event| {
        let spider = Arc::clone(&closed);
        async move {
            if let Event::Closed { reason } = event {
                spider.closed(&reason).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{no_outputs, Outputs};
    use crate::response::Response;

    struct Empty;

    impl Spider for Empty {
        fn name(&self) -> &str {
            "empty"
        }

        fn parse(&self, _response: Response) -> Outputs {
            no_outputs()
        }
    }

    #[tokio::test]
    async fn rejects_an_invalid_configuration() {
        let result = CrawlerBuilder::new(Empty).concurrency(0).build().await;
        assert!(matches!(result, Err(SpiderError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn applies_fluent_settings() {
        let crawler = CrawlerBuilder::new(Empty)
            .concurrency(3)
            .request_timeout(Duration::from_secs(5))
            .handle_ctrl_c(false)
            .with_middleware_kind(MiddlewareKind::Retry)
            .with_middleware_kind(MiddlewareKind::DownloadDelay)
            .build()
            .await
            .unwrap();

        let config = crawler.config();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.handle_ctrl_c);
        assert_eq!(
            config.middlewares,
            vec![MiddlewareKind::Retry, MiddlewareKind::DownloadDelay]
        );
        assert_eq!(crawler.events().listener_count(EventKind::Opened), 1);
        assert_eq!(crawler.events().listener_count(EventKind::Closed), 1);
    }
}
