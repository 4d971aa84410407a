//! Audit event emitter.
//!
//! Audit records ride the normal logging pipeline under a dedicated target
//! so a sink can route them to a separate destination without touching
//! application logs. The action-specific fields pass through the context
//! store for the duration of exactly one record: they are added, the record
//! is emitted, and a guard removes precisely those keys again, leaving
//! ambient identity (request id, trace id) untouched.

use std::sync::Arc;

use obskit_core::{ContextKey, Redactor};

use crate::config::ObskitConfig;
use crate::store;

/// Logging target audit records are emitted under.
pub const AUDIT_TARGET: &str = "audit";

/// Store key for the action performed, e.g. `USER_LOGIN` or `DATA_EXPORT`.
pub const AUDIT_ACTION: &str = "audit.action";
/// Store key for who performed the action.
pub const AUDIT_ACTOR: &str = "audit.actor";
/// Store key for the resource acted upon.
pub const AUDIT_RESOURCE: &str = "audit.resource";
/// Store key for the result, e.g. `SUCCESS`, `FAILURE`, `DENIED`.
pub const AUDIT_OUTCOME: &str = "audit.outcome";
/// Store key for optional free-form detail.
pub const AUDIT_DETAIL: &str = "audit.detail";

/// Emits standardized audit events for security and compliance trails.
///
/// Emission is best effort: it never fails the caller's unit of work, and a
/// disabled logger emits nothing at all. The audit keys are owned by this
/// emitter; anything a caller wrote under them is replaced and removed. The
/// free-form detail field passes through the PII redactor before emission;
/// the fixed fields are controlled vocabulary and go out as given.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    enabled: bool,
    redactor: Arc<Redactor>,
}

impl AuditLogger {
    /// Builds the logger from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.audit.enabled,
            redactor: Arc::new(Redactor::new(config.redaction)),
        }
    }

    /// Emits one audit record with the standard fields.
    pub fn log(&self, action: &str, actor: &str, resource: &str, outcome: &str) {
        self.emit(action, actor, resource, outcome, None);
    }

    /// Emits one audit record with additional free-form detail.
    pub fn log_with_detail(
        &self,
        action: &str,
        actor: &str,
        resource: &str,
        outcome: &str,
        detail: &str,
    ) {
        self.emit(action, actor, resource, outcome, Some(detail));
    }

    fn emit(
        &self,
        action: &str,
        actor: &str,
        resource: &str,
        outcome: &str,
        detail: Option<&str>,
    ) {
        if !self.enabled {
            return;
        }

        let detail = detail.map(|d| self.redactor.redact(d).into_owned());

        store::set(AUDIT_ACTION, action);
        store::set(AUDIT_ACTOR, actor);
        store::set(AUDIT_RESOURCE, resource);
        store::set(AUDIT_OUTCOME, outcome);
        if let Some(detail) = &detail {
            store::set(AUDIT_DETAIL, detail.clone());
        }
        // Removal must run whatever happens between here and return.
        let _guard = AuditKeysGuard;

        let request_id = store::get(ContextKey::RequestId);
        let trace_id = store::get(ContextKey::TraceId);

        match &detail {
            Some(detail) => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    event = action,
                    actor,
                    resource,
                    outcome,
                    detail = %detail,
                    request_id = request_id.as_deref().unwrap_or("-"),
                    trace_id = trace_id.as_deref().unwrap_or("-"),
                    "AUDIT"
                );
            }
            None => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    event = action,
                    actor,
                    resource,
                    outcome,
                    request_id = request_id.as_deref().unwrap_or("-"),
                    trace_id = trace_id.as_deref().unwrap_or("-"),
                    "AUDIT"
                );
            }
        }
    }
}

/// Removes the audit keys, and only those, when it goes out of scope.
struct AuditKeysGuard;

impl Drop for AuditKeysGuard {
    fn drop(&mut self) {
        store::remove(AUDIT_ACTION);
        store::remove(AUDIT_ACTOR);
        store::remove(AUDIT_RESOURCE);
        store::remove(AUDIT_OUTCOME);
        store::remove(AUDIT_DETAIL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;

    fn logger(enabled: bool) -> AuditLogger {
        let config = ObskitConfig {
            audit: AuditConfig { enabled },
            ..ObskitConfig::default()
        };
        AuditLogger::new(&config)
    }

    #[tokio::test]
    async fn audit_keys_vanish_and_canonical_identity_survives() {
        let logger = logger(true);

        store::scope(async {
            store::set(ContextKey::RequestId, "req-1");

            logger.log("USER_LOGIN", "alice", "/api/login", "SUCCESS");

            assert_eq!(store::get(ContextKey::RequestId).as_deref(), Some("req-1"));
            assert_eq!(store::get(AUDIT_ACTION), None);
            assert_eq!(store::get(AUDIT_ACTOR), None);
            assert_eq!(store::get(AUDIT_RESOURCE), None);
            assert_eq!(store::get(AUDIT_OUTCOME), None);
        })
        .await;
    }

    #[tokio::test]
    async fn detail_key_is_removed_too() {
        let logger = logger(true);

        store::scope(async {
            logger.log_with_detail(
                "PERMISSION_CHANGE",
                "ops-bot",
                "tenant/t-1",
                "DENIED",
                "missing approval",
            );
            assert_eq!(store::get(AUDIT_DETAIL), None);
            assert!(store::is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn only_audit_keys_are_removed() {
        let logger = logger(true);

        store::scope(async {
            store::set(ContextKey::UserId, "alice");
            store::set("workerName", "bus-consumer");

            logger.log("DATA_EXPORT", "alice", "report-7", "SUCCESS");

            assert_eq!(store::get(ContextKey::UserId).as_deref(), Some("alice"));
            assert_eq!(store::get("workerName").as_deref(), Some("bus-consumer"));
        })
        .await;
    }

    #[tokio::test]
    async fn disabled_logger_leaves_no_trace_in_the_store() {
        let logger = logger(false);

        store::scope(async {
            logger.log("USER_LOGIN", "alice", "/api/login", "SUCCESS");
            assert!(store::is_empty());
        })
        .await;
    }

    #[test]
    fn emitting_outside_a_scope_is_harmless() {
        let logger = logger(true);
        logger.log("USER_LOGIN", "alice", "/api/login", "FAILURE");
        assert!(!store::is_active());
    }
}
