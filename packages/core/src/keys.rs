//! Canonical context keys and the wire header names they map to.
//!
//! Every component agrees on this fixed enumeration: the lifecycle filter
//! populates these keys, propagation carriers copy a subset of them across
//! process boundaries, and the audit/scheduled instrumentation reads them
//! back. Keys are compared case-sensitively; components may write additional
//! ad-hoc keys, but those carry no header mapping and are cleared by the same
//! boundary that created them.

use std::fmt;

/// The fixed set of context field identifiers.
///
/// Key classes:
/// - *static*: [`ServiceName`](ContextKey::ServiceName),
///   [`Environment`](ContextKey::Environment) -- constant for the lifetime
///   of a unit of work.
/// - *identity*: [`UserId`](ContextKey::UserId),
///   [`TenantId`](ContextKey::TenantId) -- present only when the caller
///   supplied them.
/// - *correlation*: [`RequestId`](ContextKey::RequestId) (always resolved,
///   generated when absent), [`CorrelationId`](ContextKey::CorrelationId)
///   (propagated only when present).
/// - *trace*: [`TraceId`](ContextKey::TraceId),
///   [`SpanId`](ContextKey::SpanId) -- produced by an external tracer; this
///   crate only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// Logical service name, e.g. `payments-api`.
    ServiceName,
    /// Deployment environment, e.g. `prod`, `staging`.
    Environment,
    /// Per-unit-of-work identifier, generated when the caller sent none.
    RequestId,
    /// Caller-supplied correlation identifier spanning multiple requests.
    CorrelationId,
    /// Authenticated user identifier.
    UserId,
    /// Tenant identifier in multi-tenant deployments.
    TenantId,
    /// Trace identifier written by the external tracer.
    TraceId,
    /// Span identifier written by the external tracer.
    SpanId,
}

impl ContextKey {
    /// The store key string under which this field is kept.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ContextKey::ServiceName => "service",
            ContextKey::Environment => "env",
            ContextKey::RequestId => "requestId",
            ContextKey::CorrelationId => "correlationId",
            ContextKey::UserId => "userId",
            ContextKey::TenantId => "tenantId",
            ContextKey::TraceId => "traceId",
            ContextKey::SpanId => "spanId",
        }
    }

    /// The inbound/outbound header name for this field, for the keys that
    /// cross process boundaries. Static and trace keys never travel as
    /// request headers and return `None`.
    #[must_use]
    pub const fn header(self) -> Option<&'static str> {
        match self {
            ContextKey::RequestId => Some(HEADER_REQUEST_ID),
            ContextKey::CorrelationId => Some(HEADER_CORRELATION_ID),
            ContextKey::UserId => Some(HEADER_USER_ID),
            ContextKey::TenantId => Some(HEADER_TENANT_ID),
            _ => None,
        }
    }
}

impl AsRef<str> for ContextKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

/// Request identifier header, echoed back on responses.
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
/// Cross-request correlation identifier header.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-ID";
/// Authenticated user identifier header.
pub const HEADER_USER_ID: &str = "X-User-ID";
/// Tenant identifier header.
pub const HEADER_TENANT_ID: &str = "X-Tenant-ID";
/// Response-only echo of the trace id resolved during a request.
pub const HEADER_TRACE_ID: &str = "X-Trace-ID";

/// W3C trace-context propagation header checked by the trace guardrail.
pub const HEADER_TRACEPARENT: &str = "traceparent";
/// B3 (Zipkin) trace id header, the guardrail's legacy alternative.
pub const HEADER_B3_TRACE_ID: &str = "X-B3-TraceId";

/// The four context fields copied onto every outbound carrier and read back
/// from every inbound one, in injection order.
pub const PROPAGATED_KEYS: [ContextKey; 4] = [
    ContextKey::RequestId,
    ContextKey::CorrelationId,
    ContextKey::UserId,
    ContextKey::TenantId,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strings_are_stable() {
        assert_eq!(ContextKey::ServiceName.as_str(), "service");
        assert_eq!(ContextKey::Environment.as_str(), "env");
        assert_eq!(ContextKey::RequestId.as_str(), "requestId");
        assert_eq!(ContextKey::CorrelationId.as_str(), "correlationId");
        assert_eq!(ContextKey::UserId.as_str(), "userId");
        assert_eq!(ContextKey::TenantId.as_str(), "tenantId");
        assert_eq!(ContextKey::TraceId.as_str(), "traceId");
        assert_eq!(ContextKey::SpanId.as_str(), "spanId");
    }

    #[test]
    fn propagated_keys_all_map_to_headers() {
        for key in PROPAGATED_KEYS {
            assert!(key.header().is_some(), "{key} must have a header name");
        }
    }

    #[test]
    fn static_and_trace_keys_have_no_request_header() {
        assert_eq!(ContextKey::ServiceName.header(), None);
        assert_eq!(ContextKey::Environment.header(), None);
        assert_eq!(ContextKey::TraceId.header(), None);
        assert_eq!(ContextKey::SpanId.header(), None);
    }
}
