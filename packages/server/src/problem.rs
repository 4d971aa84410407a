//! RFC 7807 problem bodies and the unhandled-failure boundary.
//!
//! An error that bubbles out of a handler gets three things here: the active
//! request span marked failed, one error log carrying the canonical identity
//! fields, and a detail-free problem body whose reference id the caller can
//! quote to support.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use obskit_core::{ContextKey, Redactor};
use serde::Serialize;

use crate::config::ObskitConfig;
use crate::store;

/// RFC 7807 problem body. Serialized names follow the wire format.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// URN identifying the error class.
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Short human-readable summary.
    pub title: String,
    /// HTTP status this problem is served with.
    pub status: u16,
    /// Safe-to-expose explanation.
    pub detail: String,
    /// Canonical request id, when one is in scope.
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Distributed trace id, when one is in scope.
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Problem {
    /// Detail-free 500 body. Reads the request and trace ids from the
    /// current context store; internals of the failure never leak.
    #[must_use]
    pub fn internal_error() -> Self {
        let request_id =
            store::get(ContextKey::RequestId).unwrap_or_else(|| "unknown".to_owned());
        Self {
            type_uri: "urn:error:internal".to_owned(),
            title: "Internal Server Error".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: format!("An internal error occurred. Reference: {request_id}"),
            request_id: Some(request_id),
            trace_id: store::get(ContextKey::TraceId),
        }
    }

    /// 428 body for requests the trace guardrail rejected.
    #[must_use]
    pub fn trace_context_missing(path: &str) -> Self {
        Self {
            type_uri: "urn:error:trace-context-missing".to_owned(),
            title: "Precondition Required".to_owned(),
            status: StatusCode::PRECONDITION_REQUIRED.as_u16(),
            detail: format!(
                "Missing required trace propagation headers on {path}. \
                 Ensure the upstream service propagates context."
            ),
            request_id: store::get(ContextKey::RequestId),
            trace_id: None,
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        (
            status,
            [("content-type", "application/problem+json")],
            body,
        )
            .into_response()
    }
}

/// Errors a handler can bubble out of the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    #[error("missing trace propagation headers on {path}")]
    MissingTraceContext { path: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for BoundaryError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingTraceContext { path } => {
                Problem::trace_context_missing(&path).into_response()
            }
            Self::Internal(error) => ErrorBoundary::default().render_internal(&error),
        }
    }
}

/// Renders unhandled failures at the edge of the pipeline.
///
/// Disabling the boundary skips the enrichment log; the problem body is
/// returned either way so callers never see a bare failure. Error text is
/// passed through the PII redactor before it reaches the log.
#[derive(Debug, Clone)]
pub struct ErrorBoundary {
    enabled: bool,
    redactor: Arc<Redactor>,
}

impl Default for ErrorBoundary {
    fn default() -> Self {
        Self {
            enabled: true,
            redactor: Arc::new(Redactor::default()),
        }
    }
}

impl ErrorBoundary {
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.exception_handler.enabled,
            redactor: Arc::new(Redactor::new(config.redaction)),
        }
    }

    /// Marks the active span failed, logs once with the canonical identity
    /// fields already in scope, and returns the detail-free 500 body.
    pub fn render_internal(&self, error: &anyhow::Error) -> Response {
        tracing::Span::current().record("outcome", "error");

        if self.enabled {
            let error_text = error.to_string();
            tracing::error!(
                user_id = store::get(ContextKey::UserId).as_deref().unwrap_or("-"),
                request_id = store::get(ContextKey::RequestId).as_deref().unwrap_or("-"),
                correlation_id = store::get(ContextKey::CorrelationId)
                    .as_deref()
                    .unwrap_or("-"),
                error = %self.redactor.redact(&error_text),
                "Unhandled failure"
            );
        }

        Problem::internal_error().into_response()
    }
}
