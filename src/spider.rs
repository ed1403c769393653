//! # Spider Module
//!
//! Defines the `Spider` trait, the user-facing description of a crawl.
//!
//! ## Overview
//!
//! A spider names the crawl, provides its seed requests and supplies the
//! default callback, `parse`, used for every response whose request carries
//! no callback of its own. Seeds are a lazy stream: the engine pulls the next
//! seed only when the scheduler has nothing to hand out, so a spider can
//! generate an unbounded or slowly produced seed sequence without
//! buffering it.
//!
//! `opened` and `closed` are invoked through the event bus when the crawl
//! starts and after it has drained.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//!
//! const QUOTE: RecordSchema = RecordSchema::new("Quote", &["text", "url"]);
//!
//! struct QuotesSpider;
//!
//! #[async_trait]
//! impl Spider for QuotesSpider {
//!     fn name(&self) -> &str {
//!         "quotes"
//!     }
//!
//!     fn start_urls(&self) -> Vec<&'static str> {
//!         vec!["https://quotes.example.com/page/1"]
//!     }
//!
//!     fn parse(&self, response: Response) -> Outputs {
//!         outputs_async(async move {
//!             let record = QUOTE
//!                 .record()
//!                 .with("text", response.text()?)?
//!                 .with("url", response.url.as_str())?;
//!             Ok(vec![record.into()])
//!         })
//!     }
//! }
//! ```

use crate::error::SpiderError;
use crate::item::Outputs;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

/// The lazy source of seed requests.
pub type Seeds = BoxStream<'static, Result<Request, SpiderError>>;

/// Defines the contract for a spider.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Returns the initial URLs to start crawling from.
    fn start_urls(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Generates the seed requests. Defaults to one `GET` per start URL.
    fn start_requests(&self) -> Seeds {
        stream::iter(self.start_urls().into_iter().map(Request::get)).boxed()
    }

    /// The callback for responses whose request has none.
    fn parse(&self, response: Response) -> Outputs;

    async fn opened(&self) {}

    /// Invoked once the crawl has drained, with the finish reason.
    async fn closed(&self, _reason: &str) {}
}
