//! Trace-continuity guardrail.
//!
//! Flags incoming requests that carry neither a W3C `traceparent` nor a B3
//! trace header, which usually means a broken upstream caller. Every gap
//! increments a counter tagged with the request path; configuration then
//! decides whether the request proceeds with a warning or is rejected with
//! `428 Precondition Required` before any handler runs.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use http::header::HeaderMap;
use http::Request;
use metrics::counter;
use obskit_core::keys::{HEADER_B3_TRACE_ID, HEADER_TRACEPARENT};
use tower::{Layer, Service};

use crate::config::ObskitConfig;
use crate::problem::Problem;

/// Counter incremented once per request arriving without trace headers.
pub const TRACE_MISSING: &str = "observability.trace.missing";

// ---------------------------------------------------------------------------
// TraceGuardLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing trace-header presence on incoming requests.
#[derive(Debug, Clone)]
pub struct TraceGuardLayer {
    enabled: bool,
    fail_on_missing: bool,
}

impl TraceGuardLayer {
    /// Builds the layer from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.trace_guard.enabled,
            fail_on_missing: config.trace_guard.fail_on_missing,
        }
    }
}

impl<S> Layer<S> for TraceGuardLayer {
    type Service = TraceGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceGuardService {
            inner,
            enabled: self.enabled,
            fail_on_missing: self.fail_on_missing,
        }
    }
}

// ---------------------------------------------------------------------------
// TraceGuardService
// ---------------------------------------------------------------------------

/// Service wrapper that checks trace headers before the request proceeds.
#[derive(Debug, Clone)]
pub struct TraceGuardService<S> {
    inner: S,
    enabled: bool,
    fail_on_missing: bool,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TraceGuardService<S>
where
    S: Service<Request<ReqBody>, Response = Response> + Send,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if self.enabled && !has_trace_headers(req.headers()) {
            let path = req.uri().path().to_owned();
            counter!(TRACE_MISSING, "path" => path.clone()).increment(1);

            if self.fail_on_missing {
                let rejection = Problem::trace_context_missing(&path).into_response();
                return Box::pin(async move { Ok(rejection) });
            }

            tracing::warn!(path = %path, "Missing trace headers for request");
        }

        Box::pin(self.inner.call(req))
    }
}

fn has_trace_headers(headers: &HeaderMap) -> bool {
    headers.contains_key(HEADER_TRACEPARENT) || headers.contains_key(HEADER_B3_TRACE_ID)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
