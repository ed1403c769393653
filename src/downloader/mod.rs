//! # Downloader Module
//!
//! The transport boundary of the engine.
//!
//! ## Overview
//!
//! A [`Downloader`] performs one HTTP exchange per call and reports ordinary
//! network or protocol failures as a typed [`DownloadError`] value instead of
//! panicking, so that the middleware chain can react to them in
//! `process_exception`. Backends only implement [`Downloader::download`]; the
//! provided [`Downloader::fetch`] registers the request in the backend's
//! [`ActiveRequests`] for exactly the duration of the exchange, which is what
//! [`Downloader::idle`] reports on.
//!
//! The backend is chosen once, at build time, from [`DownloaderKind`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::downloader::{Downloader, DownloaderKind};
//!
//! let downloader = DownloaderKind::Reqwest.create(&config);
//! downloader.open().await?;
//! let response = downloader.fetch(&request).await?;
//! downloader.close().await?;
//! ```

pub mod active;
mod reqwest;

pub use self::active::{ActiveGuard, ActiveRequests};
pub use self::reqwest::ReqwestDownloader;

use crate::config::CrawlerConfig;
use crate::error::{DownloadError, SpiderError};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capability contract of a transport backend.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Acquires connection resources. Called once before the first fetch.
    async fn open(&self) -> Result<(), SpiderError> {
        Ok(())
    }

    /// Performs one exchange. Implementations must bound its duration.
    async fn download(&self, request: &Request) -> Result<Response, DownloadError>;

    /// The registry of in-flight requests of this backend.
    fn active(&self) -> &ActiveRequests;

    /// Performs one exchange while tracking `request` as in flight.
    async fn fetch(&self, request: &Request) -> Result<Response, DownloadError> {
        let _guard = self.active().track(request);
        self.download(request).await
    }

    /// True iff no fetch is in flight.
    fn idle(&self) -> bool {
        self.active().is_idle()
    }

    /// Releases connection resources. Calling it more than once is harmless.
    async fn close(&self) -> Result<(), SpiderError> {
        Ok(())
    }
}

/// Selects the bundled transport backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderKind {
    #[default]
    Reqwest,
}

impl DownloaderKind {
    /// Builds the backend described by this kind.
    pub fn create(&self, config: &CrawlerConfig) -> Arc<dyn Downloader> {
        match self {
            DownloaderKind::Reqwest => Arc::new(ReqwestDownloader::new(
                config.request_timeout,
                config.verify_ssl,
            )),
        }
    }
}

impl FromStr for DownloaderKind {
    type Err = SpiderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reqwest" => Ok(DownloaderKind::Reqwest),
            other => Err(SpiderError::ConfigurationError(format!(
                "unknown downloader: {other}"
            ))),
        }
    }
}

impl fmt::Display for DownloaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloaderKind::Reqwest => f.write_str("reqwest"),
        }
    }
}
