//! # Bundled Middlewares
//!
//! Ready-made [`Middleware`] implementations, selectable by name through
//! [`CrawlerConfig::middlewares`](crate::config::CrawlerConfig::middlewares):
//!
//! - `default_headers`: fills in configured headers and the `User-Agent`
//! - `download_delay`: waits before each download, optionally randomized
//! - `retry`: reschedules requests on retryable statuses and transport errors
//! - `response_filter`: ignores non-2xx responses that are not explicitly allowed

mod default_headers;
mod download_delay;
mod response_filter;
mod retry;

pub use default_headers::DefaultHeadersMiddleware;
pub use download_delay::DownloadDelayMiddleware;
pub use response_filter::{ResponseFilterMiddleware, NON_200_REASON};
pub use retry::{RetryMiddleware, DEFAULT_RETRY_ERROR_KINDS};

use crate::config::CrawlerConfig;
use crate::error::SpiderError;
use crate::middleware::Middleware;
use crate::stats::StatCollector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareKind {
    DefaultHeaders,
    DownloadDelay,
    Retry,
    ResponseFilter,
}

impl MiddlewareKind {
    /// Builds the middleware from `config`.
    ///
    /// Returns `Ok(None)` when the configuration disables it, e.g. a zero
    /// download delay.
    pub fn create(
        &self,
        config: &CrawlerConfig,
        stats: &Arc<StatCollector>,
    ) -> Result<Option<Arc<dyn Middleware>>, SpiderError> {
        let middleware: Option<Arc<dyn Middleware>> = match self {
            MiddlewareKind::DefaultHeaders => Some(Arc::new(DefaultHeadersMiddleware::new(
                config.user_agent.as_deref(),
                &config.default_headers,
            )?)),
            MiddlewareKind::DownloadDelay => DownloadDelayMiddleware::from_config(config)
                .map(|m| Arc::new(m) as Arc<dyn Middleware>),
            MiddlewareKind::Retry => Some(Arc::new(
                RetryMiddleware::new(
                    config.retry_http_codes.clone(),
                    config.ignore_http_codes.clone(),
                    config.max_retry_times,
                    Arc::clone(stats),
                )
                .with_error_kinds(config.retry_error_kinds.clone()),
            )),
            MiddlewareKind::ResponseFilter => Some(Arc::new(ResponseFilterMiddleware::new(
                config.allowed_codes.clone(),
            ))),
        };
        Ok(middleware)
    }
}

impl fmt::Display for MiddlewareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MiddlewareKind::DefaultHeaders => "default_headers",
            MiddlewareKind::DownloadDelay => "download_delay",
            MiddlewareKind::Retry => "retry",
            MiddlewareKind::ResponseFilter => "response_filter",
        };
        f.write_str(name)
    }
}
