//! # spider-engine
//!
//! An asynchronous crawl orchestration engine.
//!
//! Provides the main components: `Crawler`, `Scheduler`, the `Spider`,
//! `Downloader`, `Middleware` and `Pipeline` traits, and the infrastructure
//! that ties them together: a priority scheduler, a bounded task launcher, a
//! request/response/exception middleware chain, an output sink, an event bus
//! and the idle detection that decides when a crawl is complete.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//!
//! const TITLE: RecordSchema = RecordSchema::new("Title", &["url", "title"]);
//!
//! struct MySpider;
//!
//! #[async_trait]
//! impl Spider for MySpider {
//!     fn name(&self) -> &str { "my_spider" }
//!     fn start_urls(&self) -> Vec<&'static str> { vec!["https://example.com"] }
//!     fn parse(&self, response: Response) -> Outputs {
//!         outputs_async(async move {
//!             let record = TITLE.record().with("url", response.url.as_str())?;
//!             Ok(vec![record.into()])
//!         })
//!     }
//! }
//!
//! async fn run_crawler() -> Result<(), SpiderError> {
//!     let crawler = CrawlerBuilder::new(MySpider).build().await?;
//!     crawler.start_crawl().await
//! }
//! ```

pub mod builder;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod events;
pub mod item;
pub mod middleware;
pub mod middlewares;
pub mod pipeline;
pub mod prelude;
pub mod queue;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod spider;
pub mod state;
pub mod stats;

pub use builder::CrawlerBuilder;
pub use config::CrawlerConfig;
pub use crawler::{Crawler, CrawlerProcess};
pub use downloader::{Downloader, DownloaderKind, ReqwestDownloader};
pub use error::{DownloadError, SpiderError};
pub use events::{Event, EventBus, EventKind};
pub use item::{Output, Outputs, Record, RecordSchema};
pub use middleware::Middleware;
pub use pipeline::Pipeline;
pub use request::Request;
pub use response::Response;
pub use scheduler::Scheduler;
pub use spider::Spider;
pub use state::{CrawlerHandle, EngineState};
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio;
