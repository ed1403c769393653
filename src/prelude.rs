//! A "prelude" for users of the `spider-engine` crate.
//!
//! This prelude re-exports the most commonly used traits, structs and helpers
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_engine::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Crawler,
    CrawlerBuilder,
    CrawlerConfig,
    CrawlerHandle,
    CrawlerProcess,
    // Core traits
    Downloader,
    Middleware,
    Pipeline,
    Spider,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::error::{DownloadError, SpiderError};
pub use crate::events::{Event, EventKind};
pub use crate::item::{no_outputs, outputs_async, outputs_from, Output, Outputs, Record, RecordSchema};
pub use crate::middleware::{ExceptionAction, Hooks, RequestAction, ResponseAction};
pub use crate::middlewares::{
    DefaultHeadersMiddleware, DownloadDelayMiddleware, MiddlewareKind, ResponseFilterMiddleware,
    RetryMiddleware,
};
pub use crate::pipeline::LoggingPipeline;
pub use crate::request::Request;
pub use crate::response::Response;
