//! Obskit Server — scoped context store, HTTP lifecycle middleware,
//! propagation carriers, and SLO guardrails.

pub mod audit;
pub mod config;
pub mod contributor;
pub mod metrics;
pub mod middleware;
pub mod pool;
pub mod problem;
pub mod propagation;
pub mod scheduled;
pub mod startup;
pub mod store;

pub use audit::AuditLogger;
pub use config::ObskitConfig;
pub use contributor::ContextContributor;
pub use middleware::ObservabilityStack;
pub use pool::WorkerPool;
pub use problem::{BoundaryError, Problem};
pub use propagation::{PropagateContext, TaskPropagator};
pub use scheduled::{ScheduledInstrumentation, ScheduledTask};
