//! # Response Module
//!
//! Defines [`Response`], the outcome of a successful fetch.
//!
//! Every response owns exactly one originating [`Request`], shared read-only
//! through an `Arc`. The body is kept as raw bytes; [`Response::text`]
//! decodes it lazily with the request's declared encoding and caches the
//! result. When the declared encoding does not fit, the `charset` parameter
//! of the `Content-Type` header is tried. If neither works, decoding fails
//! with [`SpiderError::Decode`] instead of falling back silently.

use crate::error::SpiderError;
use crate::request::Request;
use bytes::Bytes;
use encoding_rs::Encoding;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::{Arc, OnceLock};
use url::Url;

/// The result of fetching a [`Request`].
#[derive(Debug, Clone)]
pub struct Response {
    /// The final URL of the exchange.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The request this response answers.
    pub request: Arc<Request>,
    text: OnceLock<String>,
}

impl Response {
    pub fn new(
        request: impl Into<Arc<Request>>,
        url: Url,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Response {
            url,
            status,
            headers,
            body,
            request: request.into(),
            text: OnceLock::new(),
        }
    }

    /// Builds a `200 OK` response for `request` with the given body. Handy for
    /// middlewares that answer from a cache or local data.
    pub fn ok(request: impl Into<Arc<Request>>, body: impl Into<Bytes>) -> Self {
        let request = request.into();
        let url = request.url.clone();
        Self::new(request, url, StatusCode::OK, HeaderMap::new(), body.into())
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self.text = OnceLock::new();
        self
    }

    /// The encoding declared by the originating request.
    pub fn encoding(&self) -> &str {
        &self.request.encoding
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The body decoded as text.
    pub fn text(&self) -> Result<&str, SpiderError> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }
        let decoded = self.decode()?;
        Ok(self.text.get_or_init(|| decoded))
    }

    /// Deserializes the decoded body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SpiderError> {
        Ok(serde_json::from_str(self.text()?)?)
    }

    /// Resolves `url` against the response URL.
    pub fn urljoin(&self, url: &str) -> Result<Url, SpiderError> {
        Ok(self.url.join(url)?)
    }

    fn decode(&self) -> Result<String, SpiderError> {
        let declared = self.encoding();
        if let Some(text) = decode_with(declared, &self.body) {
            return Ok(text);
        }

        match self.declared_charset() {
            Some(charset) => decode_with(&charset, &self.body).ok_or_else(|| SpiderError::Decode {
                encoding: charset,
                message: format!("body of {} is not valid text", self.request),
            }),
            None => Err(SpiderError::Decode {
                encoding: declared.to_string(),
                message: format!(
                    "body of {} is not valid text and no charset is declared",
                    self.request
                ),
            }),
        }
    }

    fn declared_charset(&self) -> Option<String> {
        let content_type = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_string())
        })
    }
}

fn decode_with(label: &str, body: &[u8]) -> Option<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
}
