//! Observability stack composition.
//!
//! Bundles the three request layers plus the shared latency registry and the
//! SLO aggregator reading from it. Layer ordering follows the outer-to-inner
//! convention: the first layer listed processes the request first on the way
//! in and the response last on the way out.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::http_metrics::HttpMetricsLayer;
use super::request_context::RequestContextLayer;
use super::trace_guard::TraceGuardLayer;
use crate::config::ObskitConfig;
use crate::contributor::ContextContributor;
use crate::metrics::slo::SloAggregator;
use crate::metrics::timers::RequestTimerRegistry;

/// The composed Tower layer type produced by [`ObservabilityStack::layers`].
///
/// This type alias keeps signatures readable. Each layer wraps the next in a
/// `Stack`, from outermost (first applied) to innermost (last applied).
pub type ObservabilityLayers = tower::layer::util::Stack<
    HttpMetricsLayer,
    tower::layer::util::Stack<
        TraceGuardLayer,
        tower::layer::util::Stack<RequestContextLayer, tower::layer::util::Identity>,
    >,
>;

/// Everything needed to wire observability into an axum router.
///
/// Owns the latency registry so the metrics tap and the SLO aggregator see
/// the same series. Build one per application, register contributors, then
/// apply [`ObservabilityStack::layers`] to the router.
pub struct ObservabilityStack {
    config: ObskitConfig,
    contributors: Vec<Arc<dyn ContextContributor>>,
    registry: Arc<RequestTimerRegistry>,
    aggregator: Arc<SloAggregator>,
}

impl ObservabilityStack {
    /// Builds the stack from configuration with a fresh latency registry.
    #[must_use]
    pub fn new(config: ObskitConfig) -> Self {
        let registry = Arc::new(RequestTimerRegistry::new());
        let aggregator = Arc::new(SloAggregator::new(Arc::clone(&registry)));
        Self {
            config,
            contributors: Vec::new(),
            registry,
            aggregator,
        }
    }

    /// Registers a context contributor. Contributors run in registration
    /// order once the canonical entries are populated.
    #[must_use]
    pub fn with_contributor(mut self, contributor: impl ContextContributor + 'static) -> Self {
        self.contributors.push(Arc::new(contributor));
        self
    }

    /// Shared latency registry written by the metrics tap.
    #[must_use]
    pub fn registry(&self) -> Arc<RequestTimerRegistry> {
        Arc::clone(&self.registry)
    }

    /// SLO aggregator folding [`ObservabilityStack::registry`].
    #[must_use]
    pub fn aggregator(&self) -> Arc<SloAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Composed Tower stack for `Router::layer`.
    ///
    /// **Layer ordering (outermost to innermost):**
    /// 1. `RequestContext` -- context-store scope around everything below
    /// 2. `TraceGuard` -- trace-continuity check before any handler work
    /// 3. `HttpMetrics` -- latency tap closest to the router
    #[must_use]
    pub fn layers(&self) -> ObservabilityLayers {
        let mut context = RequestContextLayer::new(&self.config);
        for contributor in &self.contributors {
            context = context.with_shared_contributor(Arc::clone(contributor));
        }

        ServiceBuilder::new()
            .layer(context)
            .layer(TraceGuardLayer::new(&self.config))
            .layer(HttpMetricsLayer::new(Arc::clone(&self.registry)))
            .into_inner()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
