//! Request-context lifecycle middleware.
//!
//! Wraps the entire downstream pipeline in a context-store scope: canonical
//! entries are populated before anything else runs, contributors extend them,
//! and the store is gone when the request ends, whichever way it ends. This
//! layer must be the outermost of the observability stack so its teardown is
//! the last effect on the execution resource.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response};
use obskit_core::keys::{
    ContextKey, HEADER_CORRELATION_ID, HEADER_REQUEST_ID, HEADER_TENANT_ID, HEADER_TRACE_ID,
    HEADER_USER_ID,
};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::ObskitConfig;
use crate::contributor::ContextContributor;
use crate::store;

// ---------------------------------------------------------------------------
// RequestContextLayer
// ---------------------------------------------------------------------------

/// Tower layer installing the request-context lifecycle around a service.
#[derive(Clone)]
pub struct RequestContextLayer {
    enabled: bool,
    service_name: String,
    environment: String,
    contributors: Vec<Arc<dyn ContextContributor>>,
}

impl RequestContextLayer {
    /// Builds the layer from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.context.enabled,
            service_name: config.service_name.clone(),
            environment: config.environment.clone(),
            contributors: Vec::new(),
        }
    }

    /// Registers a contributor. Contributors run in registration order after
    /// the canonical entries are populated.
    #[must_use]
    pub fn with_contributor(self, contributor: impl ContextContributor + 'static) -> Self {
        self.with_shared_contributor(Arc::new(contributor))
    }

    /// Registers an already-shared contributor.
    #[must_use]
    pub fn with_shared_contributor(mut self, contributor: Arc<dyn ContextContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }
}

impl fmt::Debug for RequestContextLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContextLayer")
            .field("enabled", &self.enabled)
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("contributors", &self.contributors.len())
            .finish()
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            state: Arc::new(LayerState {
                enabled: self.enabled,
                service_name: self.service_name.clone(),
                environment: self.environment.clone(),
                contributors: self.contributors.clone(),
            }),
        }
    }
}

struct LayerState {
    enabled: bool,
    service_name: String,
    environment: String,
    contributors: Vec<Arc<dyn ContextContributor>>,
}

// ---------------------------------------------------------------------------
// RequestContextService
// ---------------------------------------------------------------------------

/// Service wrapper that owns the populate/contribute/clear lifecycle for each
/// request it handles.
#[derive(Clone)]
pub struct RequestContextService<S> {
    inner: S,
    state: Arc<LayerState>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestContextService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let state = Arc::clone(&self.state);
        // Swap in the clone so this call keeps the service that was polled ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !state.enabled {
            // Population is off, but downstream code may still rely on a store
            // existing; scope one and tear it down as usual.
            return Box::pin(store::scope(async move {
                let result = inner.call(req).await;
                store::clear_all();
                result
            }));
        }

        let request_id = resolve_request_id(req.headers());
        let span = info_span!(
            "request",
            service = %state.service_name,
            env = %state.environment,
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
            trace_id = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = async move {
            let (parts, body) = req.into_parts();

            store::set(ContextKey::ServiceName, state.service_name.as_str());
            store::set(ContextKey::Environment, state.environment.as_str());
            store::set(ContextKey::RequestId, request_id.as_str());
            copy_header_if_present(&parts.headers, HEADER_USER_ID, ContextKey::UserId);
            copy_header_if_present(&parts.headers, HEADER_TENANT_ID, ContextKey::TenantId);
            copy_header_if_present(&parts.headers, HEADER_CORRELATION_ID, ContextKey::CorrelationId);

            for contributor in &state.contributors {
                contributor.contribute(&parts);
            }
            if let Some(trace_id) = store::get(ContextKey::TraceId) {
                tracing::Span::current().record("trace_id", trace_id.as_str());
            }

            let result = inner.call(Request::from_parts(parts, body)).await;

            // The trace id may have been written at any point up to here;
            // capture it before teardown so the response can echo it.
            let trace_id = store::get(ContextKey::TraceId);
            // Scope drop also clears, but the explicit call keeps the store
            // empty for the rest of this block and covers extended scopes.
            store::clear_all();

            match result {
                Ok(mut response) => {
                    tracing::Span::current().record("outcome", "ok");
                    set_header(response.headers_mut(), HEADER_REQUEST_ID, &request_id);
                    if let Some(trace_id) = &trace_id {
                        set_header(response.headers_mut(), HEADER_TRACE_ID, trace_id);
                    }
                    Ok(response)
                }
                Err(err) => {
                    tracing::Span::current().record("outcome", "error");
                    Err(err)
                }
            }
        };

        Box::pin(store::scope(fut).instrument(span))
    }
}

/// Takes the inbound `X-Request-ID` verbatim when present and non-empty,
/// otherwise generates a fresh identifier. Malformed header bytes count as
/// absent.
fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned)
}

/// Copies a header into the store only when present and non-empty; identity
/// and correlation entries are never written as empty strings.
fn copy_header_if_present(headers: &HeaderMap, header: &str, key: ContextKey) {
    if let Some(value) = headers.get(header).and_then(|value| value.to_str().ok()) {
        if !value.is_empty() {
            store::set(key, value);
        }
    }
}

/// Best-effort response header write; values that are not legal header text
/// are skipped rather than failing the response.
fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
        return;
    };
    let Ok(value) = HeaderValue::from_str(value) else {
        return;
    };
    headers.insert(name, value);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use http::request::Parts;
    use tower::ServiceExt;

    use super::*;

    /// Probe service reporting what it saw in the store through response
    /// headers, so tests can assert on downstream visibility.
    #[derive(Clone)]
    struct CaptureService;

    impl Service<Request<()>> for CaptureService {
        type Response = Response<()>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Response<()>, Infallible>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<()>) -> Self::Future {
            Box::pin(async move {
                let mut response = Response::new(());
                for (header, key) in [
                    ("x-seen-request-id", ContextKey::RequestId.as_str()),
                    ("x-seen-user-id", ContextKey::UserId.as_str()),
                    ("x-seen-service", ContextKey::ServiceName.as_str()),
                    ("x-seen-contrib", "contrib"),
                ] {
                    if let Some(value) = store::get(key) {
                        set_header(response.headers_mut(), header, &value);
                    }
                }
                Ok(response)
            })
        }
    }

    fn test_layer() -> RequestContextLayer {
        let config = ObskitConfig {
            service_name: "orders-api".to_string(),
            environment: "test".to_string(),
            ..ObskitConfig::default()
        };
        RequestContextLayer::new(&config)
    }

    fn header(response: &Response<()>, name: &str) -> Option<String> {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    #[tokio::test]
    async fn populates_store_and_echoes_request_id() {
        let svc = test_layer().layer(CaptureService);
        let req = Request::builder()
            .uri("/orders")
            .header(HEADER_REQUEST_ID, "req-9")
            .header(HEADER_USER_ID, "u1")
            .body(())
            .expect("request");

        let response = svc.oneshot(req).await.expect("response");

        assert_eq!(header(&response, "x-seen-request-id").as_deref(), Some("req-9"));
        assert_eq!(header(&response, "x-seen-user-id").as_deref(), Some("u1"));
        assert_eq!(header(&response, "x-seen-service").as_deref(), Some("orders-api"));
        assert_eq!(header(&response, HEADER_REQUEST_ID).as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn generates_request_id_when_header_empty() {
        let svc = test_layer().layer(CaptureService);
        let req = Request::builder()
            .uri("/orders")
            .header(HEADER_REQUEST_ID, "")
            .body(())
            .expect("request");

        let response = svc.oneshot(req).await.expect("response");

        let echoed = header(&response, HEADER_REQUEST_ID).expect("echoed id");
        assert_eq!(echoed.len(), 36, "generated ids are uuids");
        assert_eq!(header(&response, "x-seen-request-id"), Some(echoed));
    }

    #[tokio::test]
    async fn empty_identity_header_is_not_written() {
        let svc = test_layer().layer(CaptureService);
        let req = Request::builder()
            .uri("/orders")
            .header(HEADER_USER_ID, "")
            .body(())
            .expect("request");

        let response = svc.oneshot(req).await.expect("response");
        assert_eq!(header(&response, "x-seen-user-id"), None);
    }

    #[tokio::test]
    async fn sequential_requests_do_not_share_entries() {
        let svc = test_layer().layer(CaptureService);

        let first = Request::builder()
            .uri("/orders")
            .header(HEADER_USER_ID, "u1")
            .body(())
            .expect("request");
        let response = svc.clone().oneshot(first).await.expect("response");
        assert_eq!(header(&response, "x-seen-user-id").as_deref(), Some("u1"));

        let second = Request::builder().uri("/orders").body(()).expect("request");
        let response = svc.oneshot(second).await.expect("response");
        assert_eq!(header(&response, "x-seen-user-id"), None);
    }

    #[tokio::test]
    async fn contributors_run_in_registration_order() {
        let layer = test_layer()
            .with_contributor(|_: &Parts| store::set("contrib", "first"))
            .with_contributor(|_: &Parts| store::set("contrib", "second"));
        let svc = layer.layer(CaptureService);

        let req = Request::builder().uri("/orders").body(()).expect("request");
        let response = svc.oneshot(req).await.expect("response");

        assert_eq!(header(&response, "x-seen-contrib").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn trace_id_from_contributor_is_echoed() {
        let layer = test_layer().with_contributor(|parts: &Parts| {
            if let Some(value) = parts
                .headers
                .get("traceparent")
                .and_then(|value| value.to_str().ok())
            {
                store::set(ContextKey::TraceId, value);
            }
        });
        let svc = layer.layer(CaptureService);

        let req = Request::builder()
            .uri("/orders")
            .header("traceparent", "00-4bf92f3577b34da6-00f067aa0ba902b7-01")
            .body(())
            .expect("request");
        let response = svc.oneshot(req).await.expect("response");

        assert_eq!(
            header(&response, HEADER_TRACE_ID).as_deref(),
            Some("00-4bf92f3577b34da6-00f067aa0ba902b7-01")
        );
    }

    #[tokio::test]
    async fn disabled_filter_populates_and_echoes_nothing() {
        let config = ObskitConfig {
            context: crate::config::ContextConfig { enabled: false },
            ..ObskitConfig::default()
        };
        let svc = RequestContextLayer::new(&config).layer(CaptureService);

        let req = Request::builder()
            .uri("/orders")
            .header(HEADER_REQUEST_ID, "req-9")
            .body(())
            .expect("request");
        let response = svc.oneshot(req).await.expect("response");

        assert_eq!(header(&response, "x-seen-request-id"), None);
        assert_eq!(header(&response, HEADER_REQUEST_ID), None);
    }

    #[test]
    fn resolve_request_id_prefers_inbound_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("req-1"),
        );
        assert_eq!(resolve_request_id(&headers), "req-1");
    }

    #[test]
    fn resolve_request_id_adopts_nonempty_values_verbatim() {
        // Padding and whitespace are the caller's business; only a truly
        // empty value triggers generation.
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static(" req-1 "),
        );
        assert_eq!(resolve_request_id(&headers), " req-1 ");

        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("   "),
        );
        assert_eq!(resolve_request_id(&headers), "   ");
    }

    #[test]
    fn resolve_request_id_generates_for_missing_or_empty() {
        assert_eq!(resolve_request_id(&HeaderMap::new()).len(), 36);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static(""),
        );
        assert_eq!(resolve_request_id(&headers).len(), 36);
    }
}
