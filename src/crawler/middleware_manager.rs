//! The middleware chain around every fetch.
//!
//! `MiddlewareManager` resolves, once at construction, which registered
//! middlewares take part in each hook. The request list is kept in
//! registration order while the response and exception lists are stored
//! reversed, so each dispatch is a plain forward iteration.
//!
//! Hooks take `&self`, so the manager is shared as a plain `Arc` without a
//! lock around it.

use crate::downloader::Downloader;
use crate::error::SpiderError;
use crate::events::{Event, EventBus};
use crate::middleware::{ExceptionAction, Middleware, RequestAction, ResponseAction};
use crate::request::Request;
use crate::response::Response;
use crate::scheduler::Scheduler;
use crate::stats::StatCollector;
use log::{debug, info, trace, warn};
use std::sync::Arc;

enum Recovered {
    Response(Response),
    Reschedule(Request),
}

/// Runs requests through the request hooks, the downloader, and the
/// response and exception hooks.
pub struct MiddlewareManager {
    names: Vec<String>,
    request_hooks: Vec<Arc<dyn Middleware>>,
    response_hooks: Vec<Arc<dyn Middleware>>,
    exception_hooks: Vec<Arc<dyn Middleware>>,
    downloader: Arc<dyn Downloader>,
    scheduler: Arc<Scheduler>,
    stats: Arc<StatCollector>,
    events: Arc<EventBus>,
}

impl MiddlewareManager {
    pub fn new(
        middlewares: Vec<Arc<dyn Middleware>>,
        downloader: Arc<dyn Downloader>,
        scheduler: Arc<Scheduler>,
        stats: Arc<StatCollector>,
        events: Arc<EventBus>,
    ) -> Self {
        let mut request_hooks = Vec::new();
        let mut response_hooks = Vec::new();
        let mut exception_hooks = Vec::new();
        for middleware in &middlewares {
            let hooks = middleware.hooks();
            if hooks.request {
                request_hooks.push(Arc::clone(middleware));
            }
            if hooks.response {
                response_hooks.push(Arc::clone(middleware));
            }
            if hooks.exception {
                exception_hooks.push(Arc::clone(middleware));
            }
        }
        response_hooks.reverse();
        exception_hooks.reverse();

        let names: Vec<String> = middlewares.iter().map(|m| m.name().to_string()).collect();
        if !names.is_empty() {
            info!("Enabled middlewares: {:?}", names);
        }

        MiddlewareManager {
            names,
            request_hooks,
            response_hooks,
            exception_hooks,
            downloader,
            scheduler,
            stats,
            events,
        }
    }

    /// Names of the registered middlewares, in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Fetches `request` through the whole chain.
    ///
    /// `Ok(None)` means the chain produced no response for the callback:
    /// the request was rescheduled or ignored.
    pub async fn download(&self, mut request: Request) -> Result<Option<Response>, SpiderError> {
        match self.run(&mut request).await {
            Err(SpiderError::IgnoreRequest { reason }) => {
                info!("{} ignored.", request);
                self.stats.record_ignored(reason.as_deref());
                self.events.notify(Event::Ignored { reason, request });
                Ok(None)
            }
            other => other,
        }
    }

    async fn run(&self, request: &mut Request) -> Result<Option<Response>, SpiderError> {
        let response = match self.fetch(request).await {
            Ok(Ok(response)) => response,
            Ok(Err(next)) => {
                self.reschedule(next);
                return Ok(None);
            }
            Err(e) if e.is_ignore() => return Err(e),
            Err(e) => match self.process_exception(request, e).await? {
                Recovered::Response(response) => response,
                Recovered::Reschedule(next) => {
                    self.reschedule(next);
                    return Ok(None);
                }
            },
        };

        match self.process_response(request, response).await {
            Ok(ResponseAction::Continue(response)) => Ok(Some(response)),
            Ok(ResponseAction::Reschedule(next)) => {
                self.reschedule(next);
                Ok(None)
            }
            Err(e) if e.is_ignore() => Err(e),
            Err(e) => match self.process_exception(request, e).await? {
                Recovered::Response(response) => Ok(Some(response)),
                Recovered::Reschedule(next) => {
                    self.reschedule(next);
                    Ok(None)
                }
            },
        }
    }

    /// Request hooks, then the downloader. The inner `Err` is a request to reschedule.
    async fn fetch(&self, request: &mut Request) -> Result<Result<Response, Request>, SpiderError> {
        for middleware in &self.request_hooks {
            match middleware.process_request(request).await? {
                RequestAction::Continue => {}
                RequestAction::Reschedule(next) => {
                    debug!("{} replaced {} with {}", middleware.name(), request, next);
                    return Ok(Err(next));
                }
                RequestAction::Respond(response) => {
                    debug!("{} answered {} without downloading", middleware.name(), request);
                    self.received(&response);
                    return Ok(Ok(response));
                }
            }
        }

        trace!("Downloading {}", request);
        self.stats.increment_requests_sent();
        match self.downloader.fetch(request).await {
            Ok(response) => {
                self.stats.increment_requests_succeeded();
                self.received(&response);
                Ok(Ok(response))
            }
            Err(e) => {
                debug!("Download of {} failed: {}", request, e);
                self.stats.record_download_error(e.kind());
                Err(e.into())
            }
        }
    }

    fn received(&self, response: &Response) {
        self.stats
            .record_response(response.status_code(), response.body.len());
        self.events.notify(Event::ResponseReceived(response.clone()));
    }

    async fn process_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<ResponseAction, SpiderError> {
        let mut response = response;
        for middleware in &self.response_hooks {
            match middleware.process_response(request, response).await? {
                ResponseAction::Continue(next) => response = next,
                ResponseAction::Reschedule(next) => {
                    debug!("{} rescheduled {} as {}", middleware.name(), request, next);
                    return Ok(ResponseAction::Reschedule(next));
                }
            }
        }
        Ok(ResponseAction::Continue(response))
    }

    /// Gives the exception hooks a chance to recover. Without a recovery the
    /// original error is returned.
    async fn process_exception(
        &self,
        request: &Request,
        error: SpiderError,
    ) -> Result<Recovered, SpiderError> {
        for middleware in &self.exception_hooks {
            match middleware.process_exception(request, &error).await? {
                ExceptionAction::Continue => {}
                ExceptionAction::Reschedule(next) => {
                    debug!("{} recovered {} by rescheduling", middleware.name(), request);
                    return Ok(Recovered::Reschedule(next));
                }
                ExceptionAction::Recover(response) => {
                    debug!("{} recovered {} with a response", middleware.name(), request);
                    return Ok(Recovered::Response(response));
                }
            }
        }
        Err(error)
    }

    fn reschedule(&self, request: Request) {
        match self.scheduler.enqueue_request(request) {
            Ok(()) => {
                self.stats.increment_requests_rescheduled();
                self.stats.increment_requests_enqueued();
            }
            Err(e) => warn!("Rescheduled request dropped: {}", e),
        }
    }
}
