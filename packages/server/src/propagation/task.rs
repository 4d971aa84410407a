//! Context propagation across task boundaries.
//!
//! Tokio tasks do not inherit task-locals, so work handed to `spawn`, a
//! worker pool, or the blocking pool loses the request context unless a
//! snapshot rides along. The propagator captures the store at submission
//! time and re-installs it around the wrapped work, keeping log correlation
//! intact on whatever execution resource the work lands on.

use std::future::Future;

use obskit_core::ContextSnapshot;
use tokio::task::JoinHandle;

use crate::config::ObskitConfig;
use crate::store;

/// Captures context at submission time and rehydrates it around deferred
/// work. Cheap to clone; one per application is typical.
#[derive(Debug, Clone)]
pub struct TaskPropagator {
    enabled: bool,
}

impl TaskPropagator {
    /// Builds the propagator from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.async_propagation.enabled,
        }
    }

    /// The snapshot to carry: the live store when enabled, empty otherwise.
    /// A disabled propagator still scopes the work so writes inside it
    /// cannot touch the submitter's store.
    fn capture(&self) -> ContextSnapshot {
        if self.enabled {
            store::snapshot()
        } else {
            ContextSnapshot::empty()
        }
    }

    /// Wraps a future so it runs under the submitter's context. The snapshot
    /// is taken now, not when the future first polls.
    pub fn wrap_future<F>(&self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        store::scope_with(self.capture(), future)
    }

    /// Wraps a closure for synchronous execution paths.
    pub fn wrap_fn<F, R>(&self, f: F) -> impl FnOnce() -> R
    where
        F: FnOnce() -> R,
    {
        let snapshot = self.capture();
        move || store::sync_scope(snapshot, f)
    }

    /// Spawns onto the runtime with the submitter's context installed.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.wrap_future(future))
    }

    /// Runs blocking work on the blocking pool with context installed.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(self.wrap_fn(f))
    }
}

#[cfg(test)]
mod tests {
    use obskit_core::ContextKey;

    use super::*;
    use crate::config::PropagationConfig;

    fn propagator(enabled: bool) -> TaskPropagator {
        let config = ObskitConfig {
            async_propagation: PropagationConfig { enabled },
            ..ObskitConfig::default()
        };
        TaskPropagator::new(&config)
    }

    #[tokio::test]
    async fn snapshot_is_taken_at_wrap_time() {
        let propagator = propagator(true);

        let wrapped = store::scope(async {
            store::set(ContextKey::RequestId, "req-early");
            let wrapped =
                propagator.wrap_future(async { store::get(ContextKey::RequestId) });
            // Later writes must not reach work already wrapped.
            store::set(ContextKey::RequestId, "req-late");
            wrapped
        })
        .await;

        assert_eq!(wrapped.await.as_deref(), Some("req-early"));
    }

    #[tokio::test]
    async fn spawned_task_sees_the_submitting_context() {
        let propagator = propagator(true);

        let handle = store::scope(async {
            store::set(ContextKey::UserId, "alice");
            store::set(ContextKey::RequestId, "req-1");
            propagator.spawn(async {
                (
                    store::get(ContextKey::UserId),
                    store::get(ContextKey::RequestId),
                )
            })
        })
        .await;

        let (user, request) = handle.await.expect("task joins");
        assert_eq!(user.as_deref(), Some("alice"));
        assert_eq!(request.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn disabled_propagator_hands_over_an_empty_store() {
        let propagator = propagator(false);

        let wrapped = store::scope(async {
            store::set(ContextKey::UserId, "alice");
            propagator.wrap_future(async {
                assert!(store::is_active());
                store::get(ContextKey::UserId)
            })
        })
        .await;

        assert_eq!(wrapped.await, None);
    }

    #[tokio::test]
    async fn blocking_work_carries_context() {
        let propagator = propagator(true);

        let handle = store::scope(async {
            store::set(ContextKey::TenantId, "t-9");
            propagator.spawn_blocking(|| store::get(ContextKey::TenantId))
        })
        .await;

        assert_eq!(handle.await.expect("task joins").as_deref(), Some("t-9"));
    }

    #[tokio::test]
    async fn failures_inside_wrapped_work_reach_the_caller() {
        let propagator = propagator(true);

        let result: Result<(), &str> = propagator
            .wrap_future(async { Err("downstream refused") })
            .await;

        assert_eq!(result, Err("downstream refused"));
    }

    #[tokio::test]
    async fn wrapped_work_cannot_write_back_into_the_submitter() {
        let propagator = propagator(true);

        store::scope(async {
            store::set(ContextKey::RequestId, "req-1");
            propagator
                .wrap_future(async {
                    store::set(ContextKey::RequestId, "req-hijacked");
                })
                .await;
            assert_eq!(store::get(ContextKey::RequestId).as_deref(), Some("req-1"));
        })
        .await;
    }
}
