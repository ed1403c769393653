use crate::error::SpiderError;
use crate::middleware::{Hooks, Middleware, RequestAction};
use crate::request::Request;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::BTreeMap;

/// Adds configured headers that a request does not already carry.
#[derive(Debug, Clone)]
pub struct DefaultHeadersMiddleware {
    headers: HeaderMap,
}

impl DefaultHeadersMiddleware {
    pub fn new(
        user_agent: Option<&str>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, SpiderError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SpiderError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SpiderError::InvalidHeader(format!("{name}: {e}")))?;
            map.insert(header, value);
        }
        if let Some(agent) = user_agent {
            if !map.contains_key(USER_AGENT) {
                let value = HeaderValue::from_str(agent)
                    .map_err(|e| SpiderError::InvalidHeader(format!("user-agent: {e}")))?;
                map.insert(USER_AGENT, value);
            }
        }
        Ok(DefaultHeadersMiddleware { headers: map })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl Middleware for DefaultHeadersMiddleware {
    fn name(&self) -> &str {
        "default_headers"
    }

    fn hooks(&self) -> Hooks {
        Hooks::REQUEST
    }

    async fn process_request(&self, request: &mut Request) -> Result<RequestAction, SpiderError> {
        for (name, value) in &self.headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        Ok(RequestAction::Continue)
    }
}
