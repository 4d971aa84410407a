//! Tower middleware layers for the observability stack.
//!
//! - [`request_context`]: Context-store lifecycle around every request
//! - [`trace_guard`]: Trace-continuity guardrail
//! - [`http_metrics`]: Request latency tap
//! - [`pipeline`]: Composes all layers into a single stack

pub mod http_metrics;
pub mod pipeline;
pub mod request_context;
pub mod trace_guard;

pub use http_metrics::HttpMetricsLayer;
pub use pipeline::ObservabilityStack;
pub use request_context::RequestContextLayer;
pub use trace_guard::TraceGuardLayer;
