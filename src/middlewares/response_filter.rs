use crate::error::SpiderError;
use crate::middleware::{Hooks, Middleware, ResponseAction};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use tracing::debug;

/// Ignore reason raised for filtered responses.
pub const NON_200_REASON: &str = "response_status/non-200";

/// Drops responses outside the 2xx range unless their status is allowed.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilterMiddleware {
    allowed_codes: Vec<u16>,
}

impl ResponseFilterMiddleware {
    pub fn new(allowed_codes: Vec<u16>) -> Self {
        ResponseFilterMiddleware { allowed_codes }
    }
}

#[async_trait]
impl Middleware for ResponseFilterMiddleware {
    fn name(&self) -> &str {
        "response_filter"
    }

    fn hooks(&self) -> Hooks {
        Hooks::RESPONSE
    }

    async fn process_response(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<ResponseAction, SpiderError> {
        let status = response.status_code();
        if response.status.is_success() || self.allowed_codes.contains(&status) {
            return Ok(ResponseAction::Continue(response));
        }
        debug!("Filtering {} with status {}", request, status);
        Err(SpiderError::ignore(Some(NON_200_REASON)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    async fn filter(allowed: Vec<u16>, status: u16) -> Result<ResponseAction, SpiderError> {
        let request = Request::get("https://example.com").unwrap();
        let response = Response::ok(request.clone(), "")
            .with_status(StatusCode::from_u16(status).unwrap());
        ResponseFilterMiddleware::new(allowed)
            .process_response(&request, response)
            .await
    }

    #[tokio::test]
    async fn passes_success_and_allowed_codes() {
        assert!(matches!(filter(vec![], 204).await, Ok(ResponseAction::Continue(_))));
        assert!(matches!(filter(vec![404], 404).await, Ok(ResponseAction::Continue(_))));
    }

    #[tokio::test]
    async fn ignores_everything_else() {
        let err = filter(vec![404], 500).await.unwrap_err();
        assert!(matches!(
            err,
            SpiderError::IgnoreRequest { reason: Some(ref r) } if r == NON_200_REASON
        ));
    }
}
