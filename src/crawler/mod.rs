//! # Crawler Module
//!
//! Implements the engine that drives a crawl.
//!
//! ## Overview
//!
//! The crawler module provides the main `Crawler` struct and the components
//! it coordinates while a crawl runs:
//!
//! - **Crawler**: the engine loop, termination detection and draining
//! - **Task Launcher**: bounds the number of units of work running at once
//! - **Middleware Manager**: runs every fetch through the middleware chain
//! - **Request Handler**: the unit of work: fetch, callback, outputs
//! - **Output Sink**: routes produced requests back to the scheduler and
//!   records through the pipelines
//! - **Crawler Process**: runs several crawlers at once under one Ctrl-C
//!   listener
//!
//! Only `Crawler`, `CrawlerProcess` and the finish reasons are public; the
//! rest are implementation details reached through them.

mod core;
mod launcher;
mod middleware_manager;
mod output_sink;
mod process;
mod request_handler;

pub use self::core::{Crawler, FINISH_REASON_FINISHED, FINISH_REASON_SHUTDOWN};
pub use self::process::CrawlerProcess;
pub(crate) use self::middleware_manager::MiddlewareManager;
pub(crate) use self::output_sink::OutputSink;
pub(crate) use self::request_handler::RequestHandler;
