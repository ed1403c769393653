//! Runs several crawls side by side.
//!
//! Every added [`Crawler`] keeps its own scheduler, downloader, pipelines and
//! stats. The process starts them together, waits for all of them and owns
//! the one Ctrl-C listener, which stops every crawl it runs.

use crate::crawler::Crawler;
use crate::error::SpiderError;
use crate::spider::Spider;
use crate::state::CrawlerHandle;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A group of crawlers run concurrently.
pub struct CrawlerProcess {
    crawls: Vec<(String, BoxFuture<'static, Result<(), SpiderError>>)>,
    handles: Vec<CrawlerHandle>,
    handle_ctrl_c: bool,
}

impl Default for CrawlerProcess {
    fn default() -> Self {
        CrawlerProcess {
            crawls: Vec::new(),
            handles: Vec::new(),
            handle_ctrl_c: true,
        }
    }
}

impl CrawlerProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl-C stops every crawl. Enabled by default.
    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }

    /// Adds a built crawler and returns its handle.
    ///
    /// The crawler's own Ctrl-C listener is turned off; the process listens
    /// for all of them.
    pub fn add<S: Spider>(&mut self, crawler: Crawler<S>) -> CrawlerHandle {
        let crawler = crawler.without_ctrl_c();
        let name = crawler.spider_name().to_string();
        let handle = crawler.handle();
        self.handles.push(handle.clone());
        self.crawls.push((name, crawler.start_crawl().boxed()));
        handle
    }

    /// Handles of every crawler added so far, in insertion order.
    pub fn handles(&self) -> Vec<CrawlerHandle> {
        self.handles.clone()
    }

    pub fn len(&self) -> usize {
        self.crawls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crawls.is_empty()
    }

    /// Runs every crawl to completion.
    ///
    /// A failing crawl does not interrupt the others. The first error, in
    /// insertion order, is returned once all of them have finished.
    pub async fn start(self) -> Result<(), SpiderError> {
        info!("Starting {} crawler(s)", self.crawls.len());
        let listener = self
            .handle_ctrl_c
            .then(|| spawn_ctrl_c_listener(self.handles.clone()));

        let (names, crawls): (Vec<_>, Vec<_>) = self.crawls.into_iter().unzip();
        let results = join_all(crawls).await;

        if let Some(task) = listener {
            task.abort();
        }

        let mut first_error = None;
        for (name, result) in names.into_iter().zip(results) {
            if let Err(e) = result {
                error!("Crawler for spider '{}' failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn spawn_ctrl_c_listener(handles: Vec<CrawlerHandle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping {} crawler(s).", handles.len());
                for handle in &handles {
                    handle.stop();
                }
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    })
}
