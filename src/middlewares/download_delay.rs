use crate::config::CrawlerConfig;
use crate::error::SpiderError;
use crate::middleware::{Hooks, Middleware, RequestAction};
use crate::request::Request;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Waits before every download.
///
/// With randomization on, the wait is drawn uniformly from
/// `[delay * low, delay * high]`.
#[derive(Debug, Clone)]
pub struct DownloadDelayMiddleware {
    delay: f64,
    randomize: bool,
    range: (f64, f64),
}

impl DownloadDelayMiddleware {
    pub fn new(delay: f64, randomize: bool, range: (f64, f64)) -> Self {
        DownloadDelayMiddleware {
            delay,
            randomize,
            range,
        }
    }

    /// `None` when no positive delay is configured.
    pub fn from_config(config: &CrawlerConfig) -> Option<Self> {
        (config.download_delay > 0.0).then(|| {
            Self::new(
                config.download_delay,
                config.randomize_delay,
                config.random_range,
            )
        })
    }

    pub fn next_delay(&self) -> Duration {
        let (low, high) = (self.delay * self.range.0, self.delay * self.range.1);
        let secs = if self.randomize && low.is_finite() && high.is_finite() && low <= high {
            rand::thread_rng().gen_range(low..=high)
        } else {
            self.delay
        };
        // Out-of-range values disable the wait instead of panicking.
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
impl Middleware for DownloadDelayMiddleware {
    fn name(&self) -> &str {
        "download_delay"
    }

    fn hooks(&self) -> Hooks {
        Hooks::REQUEST
    }

    async fn process_request(&self, request: &mut Request) -> Result<RequestAction, SpiderError> {
        let delay = self.next_delay();
        trace!("Delaying {} by {:?}", request, delay);
        tokio::time::sleep(delay).await;
        Ok(RequestAction::Continue)
    }
}
