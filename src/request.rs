//! # Request Module
//!
//! Defines [`Request`], the fetch intent that flows through the scheduler,
//! the middleware chain and the downloader.
//!
//! A request carries a numeric priority (smaller values are fetched first),
//! an optional callback that turns the eventual [`Response`] into
//! [`Outputs`], and a mutable metadata map. Middlewares use the metadata map
//! for per-request flags such as `dont_retry` and counters such as
//! `retry_times`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::request::Request;
//!
//! let request = Request::get("https://example.com/page/2")?
//!     .with_priority(-1)
//!     .with_meta("dont_retry", true);
//! ```

use crate::error::SpiderError;
use crate::item::Outputs;
use crate::response::Response;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// Metadata key holding how many times a request has been retried.
pub const META_RETRY_TIMES: &str = "retry_times";
/// Metadata key that disables retries for a request when set to `true`.
pub const META_DONT_RETRY: &str = "dont_retry";

/// A user callback turning a response into a lazy sequence of outputs.
pub type Callback = Arc<dyn Fn(Response) -> Outputs + Send + Sync>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A fetch intent.
#[derive(Clone)]
pub struct Request {
    id: u64,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cookies: HashMap<String, String>,
    /// Proxy URL the request should be sent through.
    pub proxy: Option<String>,
    pub body: Bytes,
    /// Label of the text encoding used to decode the response body.
    pub encoding: String,
    /// Smaller values are dequeued first.
    pub priority: i32,
    pub callback: Option<Callback>,
    pub meta: HashMap<String, Value>,
}

impl Request {
    /// Creates a `GET` request with default priority and no callback.
    pub fn new(url: Url) -> Self {
        Request {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
            proxy: None,
            body: Bytes::new(),
            encoding: "utf-8".to_string(),
            priority: 0,
            callback: None,
            meta: HashMap::new(),
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    pub fn get(url: &str) -> Result<Self, SpiderError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Parses `url` and creates a `POST` request carrying `body`.
    pub fn post(url: &str, body: impl Into<Bytes>) -> Result<Self, SpiderError> {
        Ok(Self::new(Url::parse(url)?)
            .with_method(Method::POST)
            .with_body(body))
    }

    /// Process-unique identity of this request. Clones share it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, SpiderError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SpiderError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SpiderError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Sets the callback invoked with this request's response instead of the spider's `parse`.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Response) -> Outputs + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// How many times this request has already been retried.
    pub fn retry_times(&self) -> u32 {
        self.meta
            .get(META_RETRY_TIMES)
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(0)
    }

    /// Whether retries are disabled for this request.
    pub fn dont_retry(&self) -> bool {
        self.meta
            .get(META_DONT_RETRY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The cookies rendered as a single `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.sort();
        Some(pairs.join("; "))
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        let same_callback = match (&self.callback, &other.callback) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.id == other.id
            && self.url == other.url
            && self.method == other.method
            && self.headers == other.headers
            && self.cookies == other.cookies
            && self.proxy == other.proxy
            && self.body == other.body
            && self.encoding == other.encoding
            && self.priority == other.priority
            && self.meta == other.meta
            && same_callback
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("priority", &self.priority)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.method, self.url)
    }
}
