//! # Configuration Module
//!
//! [`CrawlerConfig`] gathers every recognized option of a crawl. All fields
//! have defaults, so a JSON document only needs to name the options it
//! changes:
//!
//! ```json
//! { "concurrency": 4, "middlewares": ["default_headers", "retry"], "max_retry_times": 3 }
//! ```
//!
//! Durations are written as whole seconds, except `scheduler_poll_interval`
//! which is written in milliseconds.

use crate::downloader::DownloaderKind;
use crate::error::SpiderError;
use crate::middlewares::{MiddlewareKind, DEFAULT_RETRY_ERROR_KINDS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Options of a crawl, including those consumed by the bundled middlewares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of units of work in flight at once.
    pub concurrency: usize,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    pub verify_ssl: bool,
    pub downloader: DownloaderKind,
    /// Period of the progress log line.
    #[serde(with = "duration_serde")]
    pub status_interval: Duration,
    /// Longest time the engine waits on an empty scheduler before pulling seeds again.
    #[serde(with = "duration_millis_serde")]
    pub scheduler_poll_interval: Duration,
    pub stats_dump: bool,
    pub handle_ctrl_c: bool,
    /// Bundled middlewares, in registration order.
    pub middlewares: Vec<MiddlewareKind>,

    pub user_agent: Option<String>,
    pub default_headers: BTreeMap<String, String>,

    /// Base delay in seconds applied before each download. Zero disables it.
    pub download_delay: f64,
    pub randomize_delay: bool,
    pub random_range: (f64, f64),

    pub retry_http_codes: Vec<u16>,
    pub ignore_http_codes: Vec<u16>,
    pub max_retry_times: u32,
    /// Error kinds, as named by `SpiderError::kind`, that the retry middleware reschedules.
    pub retry_error_kinds: Vec<String>,
    /// Non-2xx statuses that are still handed to callbacks.
    pub allowed_codes: Vec<u16>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            concurrency: 16,
            request_timeout: Duration::from_secs(60),
            verify_ssl: true,
            downloader: DownloaderKind::default(),
            status_interval: Duration::from_secs(5),
            scheduler_poll_interval: Duration::from_millis(100),
            stats_dump: true,
            handle_ctrl_c: true,
            middlewares: Vec::new(),
            user_agent: None,
            default_headers: BTreeMap::new(),
            download_delay: 0.0,
            randomize_delay: true,
            random_range: (0.75, 1.25),
            retry_http_codes: vec![408, 429, 500, 503, 504, 522, 524],
            ignore_http_codes: vec![403, 404],
            max_retry_times: 2,
            retry_error_kinds: DEFAULT_RETRY_ERROR_KINDS.map(String::from).to_vec(),
            allowed_codes: Vec::new(),
        }
    }
}

impl CrawlerConfig {
    /// Parses a JSON document. Missing options keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SpiderError> {
        let config: CrawlerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SpiderError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SpiderError> {
        if self.concurrency == 0 {
            return Err(SpiderError::ConfigurationError(
                "concurrency must be greater than 0.".to_string(),
            ));
        }
        if self.scheduler_poll_interval.is_zero() {
            return Err(SpiderError::ConfigurationError(
                "scheduler_poll_interval must be greater than 0.".to_string(),
            ));
        }
        if self.status_interval.is_zero() {
            return Err(SpiderError::ConfigurationError(
                "status_interval must be greater than 0.".to_string(),
            ));
        }
        if !self.download_delay.is_finite() || self.download_delay < 0.0 {
            return Err(SpiderError::ConfigurationError(
                "download_delay must be a finite, non-negative number.".to_string(),
            ));
        }
        let (low, high) = self.random_range;
        if !low.is_finite() || !high.is_finite() || low < 0.0 || low > high {
            return Err(SpiderError::ConfigurationError(format!(
                "random_range ({low}, {high}) must satisfy 0 <= low <= high."
            )));
        }
        Ok(())
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.scheduler_poll_interval, Duration::from_millis(100));
        assert_eq!(config.retry_http_codes, vec![408, 429, 500, 503, 504, 522, 524]);
        assert_eq!(config.ignore_http_codes, vec![403, 404]);
        assert_eq!(config.max_retry_times, 2);
        assert!(config.middlewares.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CrawlerConfig::from_json_str(
            r#"{
                "concurrency": 4,
                "request_timeout": 10,
                "scheduler_poll_interval": 25,
                "middlewares": ["default_headers", "retry", "response_filter"],
                "user_agent": "test-agent"
            }"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.scheduler_poll_interval, Duration::from_millis(25));
        assert_eq!(
            config.middlewares,
            vec![
                MiddlewareKind::DefaultHeaders,
                MiddlewareKind::Retry,
                MiddlewareKind::ResponseFilter
            ]
        );
        assert_eq!(config.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(config.status_interval, Duration::from_secs(5));
        assert!(config.handle_ctrl_c);
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = CrawlerConfig::default();
        config.download_delay = 0.5;
        config.middlewares = vec![MiddlewareKind::DownloadDelay];
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(CrawlerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(CrawlerConfig::from_json_str(r#"{"concurrency": 0}"#).is_err());
        assert!(CrawlerConfig::from_json_str(r#"{"scheduler_poll_interval": 0}"#).is_err());
        assert!(CrawlerConfig::from_json_str(r#"{"random_range": [1.5, 0.5]}"#).is_err());
        assert!(CrawlerConfig::from_json_str(r#"{"middlewares": ["nope"]}"#).is_err());
        assert!(CrawlerConfig::from_json_str(r#"{"downloader": "curl"}"#).is_err());
    }

    #[test]
    fn rejects_non_finite_delays() {
        for delay in [f64::NAN, f64::INFINITY, -1.0] {
            let config = CrawlerConfig {
                download_delay: delay,
                ..CrawlerConfig::default()
            };
            assert!(config.validate().is_err(), "accepted download_delay {delay}");
        }
        for range in [(f64::NAN, 1.0), (0.5, f64::INFINITY), (f64::NEG_INFINITY, 1.0)] {
            let config = CrawlerConfig {
                random_range: range,
                ..CrawlerConfig::default()
            };
            assert!(config.validate().is_err(), "accepted random_range {range:?}");
        }
    }

    #[test]
    fn retry_error_kinds_are_configurable() {
        assert_eq!(
            CrawlerConfig::default().retry_error_kinds,
            vec!["timeout", "connect", "request", "body"]
        );
        let config =
            CrawlerConfig::from_json_str(r#"{"retry_error_kinds": ["timeout", "decode"]}"#)
                .unwrap();
        assert_eq!(config.retry_error_kinds, vec!["timeout", "decode"]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = CrawlerConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SpiderError::Io(_)));
    }
}
