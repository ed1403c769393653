//! HTTP backend built on `reqwest`.
//!
//! One pooled [`Client`] serves the whole crawl. It is built in `open()` with
//! the configured timeout and TLS verification and dropped in `close()`.
//! Requests that name a proxy get a dedicated client routed through it.

use super::{ActiveRequests, Downloader};
use crate::error::{DownloadError, SpiderError};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::COOKIE;
use reqwest::{Client, Method, Proxy};
use std::time::Duration;
use tracing::{debug, info, trace};

pub struct ReqwestDownloader {
    timeout: Duration,
    verify_ssl: bool,
    client: RwLock<Option<Client>>,
    active: ActiveRequests,
}

impl ReqwestDownloader {
    pub fn new(timeout: Duration, verify_ssl: bool) -> Self {
        ReqwestDownloader {
            timeout,
            verify_ssl,
            client: RwLock::new(None),
            active: ActiveRequests::new(),
        }
    }

    fn build_client(&self, proxy: Option<&str>) -> Result<Client, DownloadError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_ssl);
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| DownloadError::Request(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(DownloadError::from)
    }

    fn client_for(&self, request: &Request) -> Result<Client, DownloadError> {
        match request.proxy.as_deref() {
            Some(proxy) => {
                if self.client.read().is_none() {
                    return Err(DownloadError::NotOpen);
                }
                self.build_client(Some(proxy))
            }
            None => self.client.read().clone().ok_or(DownloadError::NotOpen),
        }
    }
}

impl Default for ReqwestDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), true)
    }
}

fn supported(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::POST
            | Method::PUT
            | Method::PATCH
            | Method::DELETE
            | Method::HEAD
            | Method::OPTIONS
    )
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn open(&self) -> Result<(), SpiderError> {
        let client = self.build_client(None)?;
        *self.client.write() = Some(client);
        info!(
            "Downloader {} opened with timeout {:?}, verify_ssl={}",
            self.name(),
            self.timeout,
            self.verify_ssl
        );
        Ok(())
    }

    async fn download(&self, request: &Request) -> Result<Response, DownloadError> {
        if !supported(&request.method) {
            return Err(DownloadError::UnsupportedMethod(request.method.to_string()));
        }
        let client = self.client_for(request)?;

        debug!("Downloading {}", request);
        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Body(e.to_string()))?;

        trace!("Received {} ({} bytes) for {}", status, body.len(), request);
        Ok(Response::new(request.clone(), url, status, headers, body))
    }

    fn active(&self) -> &ActiveRequests {
        &self.active
    }

    async fn close(&self) -> Result<(), SpiderError> {
        if self.client.write().take().is_some() {
            debug!("Downloader {} closed", self.name());
        }
        Ok(())
    }
}
