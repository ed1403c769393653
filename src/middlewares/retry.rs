use crate::error::SpiderError;
use crate::middleware::{ExceptionAction, Hooks, Middleware, ResponseAction};
use crate::request::{Request, META_RETRY_TIMES};
use crate::response::Response;
use crate::stats::StatCollector;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Error kinds retried unless configured otherwise.
pub const DEFAULT_RETRY_ERROR_KINDS: [&str; 4] = ["timeout", "connect", "request", "body"];

/// Reschedules requests that failed in a way worth trying again.
///
/// A response is retried when its status is in `retry_http_codes` and not
/// in `ignore_http_codes`. An error is retried when its kind is listed in
/// `retry_error_kinds`; [`DEFAULT_RETRY_ERROR_KINDS`] covers the transient
/// transport failures.
/// Each retry bumps `meta["retry_times"]`; after `max_retry_times` retries
/// the middleware gives up and lets the original outcome through.
/// `meta["dont_retry"] = true` opts a request out.
pub struct RetryMiddleware {
    retry_http_codes: Vec<u16>,
    ignore_http_codes: Vec<u16>,
    max_retry_times: u32,
    retry_error_kinds: Vec<String>,
    stats: Arc<StatCollector>,
}

impl RetryMiddleware {
    pub fn new(
        retry_http_codes: Vec<u16>,
        ignore_http_codes: Vec<u16>,
        max_retry_times: u32,
        stats: Arc<StatCollector>,
    ) -> Self {
        RetryMiddleware {
            retry_http_codes,
            ignore_http_codes,
            max_retry_times,
            retry_error_kinds: DEFAULT_RETRY_ERROR_KINDS.map(String::from).to_vec(),
            stats,
        }
    }

    /// Replaces the list of retried error kinds, as named by [`SpiderError::kind`].
    pub fn with_error_kinds(mut self, kinds: Vec<String>) -> Self {
        self.retry_error_kinds = kinds;
        self
    }

    fn is_retryable(&self, error: &SpiderError) -> bool {
        let kind = error.kind();
        self.retry_error_kinds.iter().any(|k| k == kind)
    }

    fn retry(&self, request: &Request, reason: &str) -> Option<Request> {
        let retry_times = request.retry_times();
        if retry_times < self.max_retry_times {
            let retry_times = retry_times + 1;
            info!("{} {} retry {} time ...", request, reason, retry_times);
            self.stats.inc_value("retry_count");
            Some(request.clone().with_meta(META_RETRY_TIMES, retry_times))
        } else {
            warn!(
                "{} {} retry max {} times, give up.",
                request, reason, self.max_retry_times
            );
            self.stats.inc_value("retry/max_reached");
            None
        }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn hooks(&self) -> Hooks {
        Hooks::RESPONSE.with_exception()
    }

    async fn process_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<ResponseAction, SpiderError> {
        let status = response.status_code();
        if request.dont_retry() || self.ignore_http_codes.contains(&status) {
            return Ok(ResponseAction::Continue(response));
        }
        if self.retry_http_codes.contains(&status) {
            let reason = format!("response code: {status}");
            if let Some(retry) = self.retry(request, &reason) {
                return Ok(ResponseAction::Reschedule(retry));
            }
        }
        Ok(ResponseAction::Continue(response))
    }

    async fn process_exception(
        &self,
        request: &Request,
        error: &SpiderError,
    ) -> Result<ExceptionAction, SpiderError> {
        if request.dont_retry() || !self.is_retryable(error) {
            return Ok(ExceptionAction::Continue);
        }
        Ok(match self.retry(request, error.kind()) {
            Some(retry) => ExceptionAction::Reschedule(retry),
            None => ExceptionAction::Continue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadError;
    use crate::request::META_DONT_RETRY;
    use reqwest::StatusCode;

    fn middleware(stats: &Arc<StatCollector>) -> RetryMiddleware {
        RetryMiddleware::new(vec![500, 503], vec![404], 2, Arc::clone(stats))
    }

    fn response(request: &Request, status: u16) -> Response {
        Response::ok(request.clone(), "").with_status(StatusCode::from_u16(status).unwrap())
    }

    #[tokio::test]
    async fn retries_retryable_status_until_the_limit() {
        let stats = Arc::new(StatCollector::new());
        let retry = middleware(&stats);
        let mut request = Request::get("https://example.com").unwrap();

        for expected in 1..=2u32 {
            let action = retry
                .process_response(&request, response(&request, 503))
                .await
                .unwrap();
            request = match action {
                ResponseAction::Reschedule(next) => next,
                other => panic!("expected a reschedule, got {other:?}"),
            };
            assert_eq!(request.retry_times(), expected);
        }

        let action = retry
            .process_response(&request, response(&request, 503))
            .await
            .unwrap();
        assert!(matches!(action, ResponseAction::Continue(r) if r.status_code() == 503));
        assert_eq!(stats.get_value("retry_count"), 2);
        assert_eq!(stats.get_value("retry/max_reached"), 1);
    }

    #[tokio::test]
    async fn ignored_and_successful_statuses_pass() {
        let stats = Arc::new(StatCollector::new());
        let retry = middleware(&stats);
        let request = Request::get("https://example.com").unwrap();

        for status in [200, 404] {
            let action = retry
                .process_response(&request, response(&request, status))
                .await
                .unwrap();
            assert!(matches!(action, ResponseAction::Continue(_)));
        }
        assert_eq!(stats.get_value("retry_count"), 0);
    }

    #[tokio::test]
    async fn dont_retry_opts_out() {
        let stats = Arc::new(StatCollector::new());
        let retry = middleware(&stats);
        let request = Request::get("https://example.com")
            .unwrap()
            .with_meta(META_DONT_RETRY, true);

        let action = retry
            .process_response(&request, response(&request, 500))
            .await
            .unwrap();
        assert!(matches!(action, ResponseAction::Continue(_)));

        let error = SpiderError::from(DownloadError::Timeout("slow".into()));
        let action = retry.process_exception(&request, &error).await.unwrap();
        assert!(matches!(action, ExceptionAction::Continue));
    }

    #[tokio::test]
    async fn retries_transport_errors_only() {
        let stats = Arc::new(StatCollector::new());
        let retry = middleware(&stats);
        let request = Request::get("https://example.com").unwrap();

        let timeout = SpiderError::from(DownloadError::Timeout("slow".into()));
        let action = retry.process_exception(&request, &timeout).await.unwrap();
        assert!(matches!(action, ExceptionAction::Reschedule(r) if r.retry_times() == 1));

        let unsupported = SpiderError::from(DownloadError::UnsupportedMethod("TRACE".into()));
        let action = retry.process_exception(&request, &unsupported).await.unwrap();
        assert!(matches!(action, ExceptionAction::Continue));

        let decode = SpiderError::GeneralError("not a transport error".into());
        let action = retry.process_exception(&request, &decode).await.unwrap();
        assert!(matches!(action, ExceptionAction::Continue));
    }

    #[tokio::test]
    async fn configured_error_kinds_replace_the_defaults() {
        let stats = Arc::new(StatCollector::new());
        let retry = middleware(&stats)
            .with_error_kinds(vec!["unsupported_method".into(), "general".into()]);
        let request = Request::get("https://example.com").unwrap();

        let unsupported = SpiderError::from(DownloadError::UnsupportedMethod("TRACE".into()));
        let action = retry.process_exception(&request, &unsupported).await.unwrap();
        assert!(matches!(action, ExceptionAction::Reschedule(r) if r.retry_times() == 1));

        let general = SpiderError::GeneralError("flaky backend".into());
        let action = retry.process_exception(&request, &general).await.unwrap();
        assert!(matches!(action, ExceptionAction::Reschedule(_)));

        let timeout = SpiderError::from(DownloadError::Timeout("slow".into()));
        let action = retry.process_exception(&request, &timeout).await.unwrap();
        assert!(matches!(action, ExceptionAction::Continue));
        assert_eq!(stats.get_value("retry_count"), 2);
    }
}
