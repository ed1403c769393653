//! # Middleware Module
//!
//! Defines the [`Middleware`] trait, the interception point around every fetch.
//!
//! ## Overview
//!
//! A middleware may implement any of three hooks:
//!
//! - `process_request` runs in registration order before the download. It
//!   can edit the request in place and let the chain continue, hand back a
//!   different request to be rescheduled, or answer with a response of its
//!   own. Either of the last two skips the remaining request hooks and the
//!   downloader.
//! - `process_response` runs in reverse registration order once a response
//!   exists. It either passes a (possibly replaced) response on or aborts the
//!   chain with a request to reschedule, e.g. a retry.
//! - `process_exception` runs in reverse registration order when the
//!   download or a response hook fails. It can recover with a response or a
//!   request to reschedule, or pass.
//!
//! Which hooks a middleware takes part in is declared once through
//! [`Middleware::hooks`] and read when the middleware is registered.
//! Returning [`SpiderError::IgnoreRequest`] from any hook drops the request
//! quietly: it is counted and published as an `ignored` event, not treated
//! as a failure.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::middleware::{Hooks, Middleware, RequestAction};
//!
//! struct Tagger;
//!
//! #[async_trait::async_trait]
//! impl Middleware for Tagger {
//!     fn name(&self) -> &str { "tagger" }
//!     fn hooks(&self) -> Hooks { Hooks::REQUEST }
//!     async fn process_request(&self, request: &mut Request) -> Result<RequestAction, SpiderError> {
//!         request.meta.insert("tagged".into(), true.into());
//!         Ok(RequestAction::Continue)
//!     }
//! }
//! ```

use crate::error::SpiderError;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;

/// The hooks a middleware takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hooks {
    pub request: bool,
    pub response: bool,
    pub exception: bool,
}

impl Hooks {
    pub const NONE: Hooks = Hooks {
        request: false,
        response: false,
        exception: false,
    };
    pub const REQUEST: Hooks = Hooks {
        request: true,
        ..Hooks::NONE
    };
    pub const RESPONSE: Hooks = Hooks {
        response: true,
        ..Hooks::NONE
    };
    pub const EXCEPTION: Hooks = Hooks {
        exception: true,
        ..Hooks::NONE
    };
    pub const ALL: Hooks = Hooks {
        request: true,
        response: true,
        exception: true,
    };

    pub const fn with_request(mut self) -> Self {
        self.request = true;
        self
    }

    pub const fn with_response(mut self) -> Self {
        self.response = true;
        self
    }

    pub const fn with_exception(mut self) -> Self {
        self.exception = true;
        self
    }
}

/// Outcome of a request hook.
#[derive(Debug)]
pub enum RequestAction {
    /// Pass to the next middleware, then to the downloader.
    Continue,
    /// Skip the download and hand this request back to the scheduler.
    Reschedule(Request),
    /// Skip the download and use this response.
    Respond(Response),
}

/// Outcome of a response hook.
#[derive(Debug)]
pub enum ResponseAction {
    Continue(Response),
    /// Abort the chain and hand this request back to the scheduler.
    Reschedule(Request),
}

/// Outcome of an exception hook.
#[derive(Debug)]
pub enum ExceptionAction {
    /// Not handled here.
    Continue,
    Reschedule(Request),
    Recover(Response),
}

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// The hooks this middleware implements.
    fn hooks(&self) -> Hooks;

    async fn process_request(&self, _request: &mut Request) -> Result<RequestAction, SpiderError> {
        Ok(RequestAction::Continue)
    }

    async fn process_response(
        &self,
        _request: &Request,
        response: Response,
    ) -> Result<ResponseAction, SpiderError> {
        Ok(ResponseAction::Continue(response))
    }

    async fn process_exception(
        &self,
        _request: &Request,
        _error: &SpiderError,
    ) -> Result<ExceptionAction, SpiderError> {
        Ok(ExceptionAction::Continue)
    }
}
