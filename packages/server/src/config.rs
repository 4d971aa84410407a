//! Configuration surface for the observability layer.
//!
//! Everything defaults to enabled with safe behavior (warn, don't reject) so
//! dropping the stack into a service changes no request outcomes until a
//! deployment opts into stricter settings.

use obskit_core::RedactionOptions;

/// Top-level configuration consumed by the middleware stack, the propagation
/// carriers, and the instrumentation wrappers.
#[derive(Debug, Clone)]
pub struct ObskitConfig {
    /// Logical service name written into every context under `service`.
    pub service_name: String,
    /// Deployment environment written into every context under `env`.
    pub environment: String,
    /// Request-context lifecycle filter settings.
    pub context: ContextConfig,
    /// Trace-presence guardrail settings.
    pub trace_guard: TraceGuardConfig,
    /// External tracer sampling ratio. Read-only here: surfaced in the
    /// startup banner, never applied by this crate.
    pub sampling: SamplingConfig,
    /// Context capture across task/worker-pool submissions.
    pub async_propagation: PropagationConfig,
    /// Context injection/extraction on queued messages.
    pub messaging_propagation: PropagationConfig,
    /// Unhandled-failure boundary settings.
    pub exception_handler: ExceptionHandlerConfig,
    /// Audit emitter settings.
    pub audit: AuditConfig,
    /// PII masking rule options.
    pub redaction: RedactionOptions,
}

impl Default for ObskitConfig {
    fn default() -> Self {
        Self {
            service_name: "obskit".to_string(),
            environment: "dev".to_string(),
            context: ContextConfig::default(),
            trace_guard: TraceGuardConfig::default(),
            sampling: SamplingConfig::default(),
            async_propagation: PropagationConfig::default(),
            messaging_propagation: PropagationConfig::default(),
            exception_handler: ExceptionHandlerConfig::default(),
            audit: AuditConfig::default(),
            redaction: RedactionOptions::default(),
        }
    }
}

/// Lifecycle filter switch. When disabled the filter still scopes a store
/// around each request (downstream code may rely on one existing) but writes
/// nothing into it.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Populate canonical entries and echo response headers.
    pub enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Trace-presence guardrail behavior.
#[derive(Debug, Clone)]
pub struct TraceGuardConfig {
    /// Check inbound requests for trace-propagation headers.
    pub enabled: bool,
    /// Reject requests missing both headers instead of logging a warning.
    pub fail_on_missing: bool,
}

impl Default for TraceGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_on_missing: false,
        }
    }
}

/// External tracer sampling ratio, carried for operator visibility.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Fraction of traces the external tracer keeps, in `[0.0, 1.0]`.
    pub probability: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { probability: 1.0 }
    }
}

/// On/off switch shared by the async and messaging propagation paths.
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Copy context across this boundary.
    pub enabled: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Unhandled-failure boundary settings.
#[derive(Debug, Clone)]
pub struct ExceptionHandlerConfig {
    /// Emit the enriched error log when rendering an internal-error body.
    pub enabled: bool,
}

impl Default for ExceptionHandlerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Audit emitter switch.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Emit audit records. When off, `AuditLogger` calls are no-ops.
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ObskitConfig::default();
        assert_eq!(config.service_name, "obskit");
        assert_eq!(config.environment, "dev");
        assert!(config.context.enabled);
        assert!(config.trace_guard.enabled);
        assert!(!config.trace_guard.fail_on_missing);
        assert!((config.sampling.probability - 1.0).abs() < f64::EPSILON);
        assert!(config.async_propagation.enabled);
        assert!(config.messaging_propagation.enabled);
        assert!(config.exception_handler.enabled);
        assert!(config.audit.enabled);
        assert!(!config.redaction.mask_credit_cards);
    }
}
