//! Request latency tap.
//!
//! Times every request and records the sample twice: into the shared
//! [`RequestTimerRegistry`] the SLO aggregator folds, and as a
//! `http.server.requests` histogram for the exporter. Samples are tagged
//! with the route template when the router matched one, falling back to the
//! raw path otherwise, so per-id URLs do not explode the tag space.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use http::{Request, Response};
use metrics::histogram;
use tower::{Layer, Service};

use crate::metrics::timers::{RequestTimerRegistry, HTTP_SERVER_REQUESTS};

// ---------------------------------------------------------------------------
// HttpMetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that samples request latency into a shared registry.
#[derive(Debug, Clone)]
pub struct HttpMetricsLayer {
    registry: Arc<RequestTimerRegistry>,
}

impl HttpMetricsLayer {
    /// Builds the layer around an existing registry so the SLO aggregator
    /// can read the same series this layer writes.
    #[must_use]
    pub fn new(registry: Arc<RequestTimerRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for HttpMetricsLayer {
    type Service = HttpMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricsService {
            inner,
            registry: Arc::clone(&self.registry),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpMetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that times the downstream call.
#[derive(Debug, Clone)]
pub struct HttpMetricsService<S> {
    inner: S,
    registry: Arc<RequestTimerRegistry>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send,
    S::Future: Send + 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| req.uri().path().to_owned(), |m| m.as_str().to_owned());
        let registry = Arc::clone(&self.registry);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let started = Instant::now();
            let result = fut.await;

            if let Ok(response) = &result {
                #[allow(clippy::cast_possible_truncation)]
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let status = response.status().as_u16();

                registry.record(&path, status, elapsed_ms);
                #[allow(clippy::cast_precision_loss)]
                histogram!(
                    HTTP_SERVER_REQUESTS,
                    "path" => path,
                    "status" => status.to_string(),
                )
                .record(elapsed_ms as f64);
            }

            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
