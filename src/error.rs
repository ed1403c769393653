//! # Error Module
//!
//! Error types shared by every component of the engine.
//!
//! `SpiderError` is the single error type returned across the crate. Fetch
//! failures reported by a [`Downloader`](crate::Downloader) are carried as a
//! typed [`DownloadError`] value so the middleware chain can inspect them in
//! `process_exception` before they surface as a crawl failure.

use thiserror::Error;

/// Failures a downloader backend reports for a single fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// The fetch did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection to the remote host could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be sent or the exchange failed mid-way.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The backend does not support the request method.
    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),

    /// The downloader was used before `open()` or after `close()`.
    #[error("downloader is not open")]
    NotOpen,

    #[error("{0}")]
    Other(String),
}

impl DownloadError {
    /// Short, stable name of the failure kind, used as a stats key.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Connect(_) => "connect",
            DownloadError::Request(_) => "request",
            DownloadError::Body(_) => "body",
            DownloadError::UnsupportedMethod(_) => "unsupported_method",
            DownloadError::NotOpen => "not_open",
            DownloadError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout(err.to_string())
        } else if err.is_connect() {
            DownloadError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            DownloadError::Body(err.to_string())
        } else if err.is_request() {
            DownloadError::Request(err.to_string())
        } else {
            DownloadError::Other(err.to_string())
        }
    }
}

/// The main error type of the crawl engine.
#[derive(Debug, Error)]
pub enum SpiderError {
    /// A transport failure surfaced by the downloader.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Signal raised by a middleware to drop a request without treating it as a failure.
    #[error("request ignored{}", reason_suffix(.reason))]
    IgnoreRequest { reason: Option<String> },

    /// A component produced a value outside of its contract.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// A record was accessed with a key that is not part of its schema.
    #[error("{record} does not support field: {field}")]
    UndeclaredField { record: String, field: String },

    /// A response body could not be decoded with the declared or detected encoding.
    #[error("cannot decode response body as {encoding}: {message}")]
    Decode { encoding: String, message: String },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    GeneralError(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl SpiderError {
    /// Builds the ignore signal with an optional reason.
    pub fn ignore<R: Into<String>>(reason: Option<R>) -> Self {
        SpiderError::IgnoreRequest {
            reason: reason.map(Into::into),
        }
    }

    /// Whether this error is the ignore signal rather than a failure.
    pub fn is_ignore(&self) -> bool {
        matches!(self, SpiderError::IgnoreRequest { .. })
    }

    /// The underlying transport error, if any.
    pub fn as_download_error(&self) -> Option<&DownloadError> {
        match self {
            SpiderError::Download(e) => Some(e),
            _ => None,
        }
    }

    /// Short name of the error kind, used for stats keys.
    pub fn kind(&self) -> &'static str {
        match self {
            SpiderError::Download(e) => e.kind(),
            SpiderError::IgnoreRequest { .. } => "ignore_request",
            SpiderError::InvalidOutput(_) => "invalid_output",
            SpiderError::UndeclaredField { .. } => "undeclared_field",
            SpiderError::Decode { .. } => "decode",
            SpiderError::ConfigurationError(_) => "configuration",
            SpiderError::InvalidUrl(_) => "invalid_url",
            SpiderError::InvalidHeader(_) => "invalid_header",
            SpiderError::Json(_) => "json",
            SpiderError::Io(_) => "io",
            SpiderError::GeneralError(_) => "general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_signal_formats_reason() {
        let err = SpiderError::ignore(Some("response_status/non-200"));
        assert!(err.is_ignore());
        assert_eq!(err.to_string(), "request ignored: response_status/non-200");

        let bare = SpiderError::ignore::<String>(None);
        assert_eq!(bare.to_string(), "request ignored");
    }

    #[test]
    fn download_errors_keep_their_kind() {
        let err: SpiderError = DownloadError::Timeout("60s".into()).into();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(
            err.as_download_error(),
            Some(&DownloadError::Timeout("60s".into()))
        );
        assert!(!err.is_ignore());
    }
}
