//! Context-propagating worker pool.
//!
//! A named, bounded pool for fire-and-forget work submitted from request
//! handlers. Submitted work carries the submitter's context snapshot, and a
//! utilization gauge (active permits over capacity) is republished on every
//! acquire and release so saturation is visible before it hurts.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

use crate::propagation::task::TaskPropagator;

/// Gauge tracking active permits over capacity, 0.0 to 1.0, tagged `name`.
pub const POOL_UTILIZATION: &str = "worker.pool.utilization";

/// Errors from submitting work to a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("worker pool is saturated, try again later")]
    Saturated,
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Named, semaphore-bounded pool running work under the submitter's context.
///
/// Clones share the same permits and counters, so a pool can be handed to
/// any number of handlers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    propagator: TaskPropagator,
}

impl WorkerPool {
    /// Creates a pool with the given concurrency capacity (at least 1).
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize, propagator: TaskPropagator) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(AtomicUsize::new(0)),
            propagator,
        }
    }

    /// Submits work, waiting for a permit when the pool is full. The context
    /// snapshot is taken here, on the submitting task, not when the work
    /// eventually runs.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the pool has been closed.
    pub async fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.run_with(permit, future))
    }

    /// Submits work without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Saturated`] when no permit is free, or
    /// [`PoolError::Closed`] once the pool has been closed.
    pub fn try_submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::Closed => PoolError::Closed,
                TryAcquireError::NoPermits => PoolError::Saturated,
            })?;
        Ok(self.run_with(permit, future))
    }

    fn run_with<F>(&self, permit: OwnedSemaphorePermit, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = ActiveGuard::enter(
            self.name.clone(),
            Arc::clone(&self.active),
            self.capacity,
            permit,
        );
        let wrapped = self.propagator.wrap_future(future);
        tokio::spawn(async move {
            let result = wrapped.await;
            drop(guard);
            result
        })
    }

    /// Pool name used as the gauge tag.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured concurrency capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Work currently holding a permit.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Active permits over capacity, 0.0 to 1.0.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let value = self.active() as f64 / self.capacity as f64;
        value
    }

    /// Closes the pool. Running work finishes; every submit from now on
    /// fails with [`PoolError::Closed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}

// ---------------------------------------------------------------------------
// ActiveGuard
// ---------------------------------------------------------------------------

/// Holds one permit for the lifetime of a unit of work. Dropping it, on any
/// exit path including a panic, returns the permit and republishes the
/// gauge.
struct ActiveGuard {
    name: String,
    active: Arc<AtomicUsize>,
    capacity: usize,
    _permit: OwnedSemaphorePermit,
}

impl ActiveGuard {
    fn enter(
        name: String,
        active: Arc<AtomicUsize>,
        capacity: usize,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        publish_utilization(&name, now, capacity);
        Self {
            name,
            active,
            capacity,
            _permit: permit,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self
            .active
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        publish_utilization(&self.name, now, self.capacity);
    }
}

fn publish_utilization(name: &str, active: usize, capacity: usize) {
    #[allow(clippy::cast_precision_loss)]
    let value = active as f64 / capacity as f64;
    gauge!(POOL_UTILIZATION, "name" => name.to_owned()).set(value);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
