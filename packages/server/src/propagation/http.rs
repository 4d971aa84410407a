//! Outbound HTTP propagation.
//!
//! Stamps the current context's propagated entries onto outbound requests so
//! the next hop can pick them up with its own inbound filter. Propagation is
//! best effort: a value that cannot be represented as a header is skipped,
//! never an error, because an outbound call must not fail on observability's
//! account.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use obskit_core::{inject, Carrier};

use crate::store;

/// [`Carrier`] over HTTP headers.
pub struct HeaderCarrier<'a>(pub &'a mut HeaderMap);

impl Carrier for HeaderCarrier<'_> {
    fn get(&self, name: &str) -> Option<String> {
        self.0
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    fn set(&mut self, name: &str, value: &str) {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            return;
        };
        self.0.insert(name, value);
    }
}

/// Injects the current context into outbound headers. Returns the number of
/// propagated entries present; zero outside a request scope.
pub fn inject_context(headers: &mut HeaderMap) -> usize {
    inject(&store::snapshot(), &mut HeaderCarrier(headers))
}

/// Extension adding context propagation to reqwest request builders.
pub trait PropagateContext {
    /// Stamps the current context's propagated entries onto the request.
    #[must_use]
    fn propagate_context(self) -> Self;
}

impl PropagateContext for reqwest::RequestBuilder {
    fn propagate_context(self) -> Self {
        let mut headers = HeaderMap::new();
        inject_context(&mut headers);
        self.headers(headers)
    }
}
