//! The unit of work run for every dispatched request.
//!
//! A unit fetches its request through the middleware chain, hands the
//! response to the request's callback (or to `Spider::parse`) and pushes each
//! produced output into the output sink as soon as it is yielded. Failures are
//! isolated to the unit: they are logged, counted and published as `error`
//! events, and the engine loop is never affected.

use crate::crawler::middleware_manager::MiddlewareManager;
use crate::crawler::output_sink::OutputSink;
use crate::error::SpiderError;
use crate::events::{Event, EventBus};
use crate::request::Request;
use crate::response::Response;
use crate::spider::Spider;
use crate::stats::StatCollector;
use futures_util::StreamExt;
use log::{error, trace};
use std::sync::Arc;

pub(crate) struct RequestHandler<S: Spider> {
    spider: Arc<S>,
    chain: MiddlewareManager,
    sink: Arc<OutputSink>,
    stats: Arc<StatCollector>,
    events: Arc<EventBus>,
}

impl<S: Spider> RequestHandler<S> {
    pub(crate) fn new(
        spider: Arc<S>,
        chain: MiddlewareManager,
        sink: Arc<OutputSink>,
        stats: Arc<StatCollector>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(RequestHandler {
            spider,
            chain,
            sink,
            stats,
            events,
        })
    }

    pub(crate) fn chain(&self) -> &MiddlewareManager {
        &self.chain
    }

    /// Runs one request to completion.
    pub(crate) async fn handle(self: Arc<Self>, request: Request) {
        trace!("Processing {}", request);
        let response = match self.chain.download(request).await {
            Ok(Some(response)) => response,
            Ok(None) => return,
            Err(e) => {
                self.fail(e, "downloader");
                return;
            }
        };
        self.parse(response).await;
    }

    async fn parse(&self, response: Response) {
        let url = response.url.clone();
        let mut outputs = match response.request.callback.clone() {
            Some(callback) => callback(response),
            None => self.spider.parse(response),
        };

        while let Some(output) = outputs.next().await {
            match output {
                Ok(output) => self.sink.push(output),
                Err(e) => {
                    error!("Callback for {} failed", url);
                    self.fail(e, "callback");
                    break;
                }
            }
        }
    }

    fn fail(&self, error: SpiderError, source: &str) {
        error!("Unit of work failed in {}: {}", source, error);
        self.stats.increment_errors();
        self.events.notify(Event::error(error, source));
    }
}
