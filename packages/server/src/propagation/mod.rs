//! Context propagation across execution and process boundaries.
//!
//! - [`task`]: Snapshot-carrying wrappers for spawned and blocking work
//! - [`http`]: Outbound header injection for HTTP clients
//! - [`messaging`]: Producer and consumer interceptors for message buses

pub mod http;
pub mod messaging;
pub mod task;

pub use http::{inject_context, HeaderCarrier, PropagateContext};
pub use messaging::{ConsumerInterceptor, ProducerInterceptor};
pub use task::TaskPropagator;
