//! Request timers and the SLO gauges derived from them.

pub mod slo;
pub mod timers;

pub use slo::{SloAggregator, SloSnapshot};
pub use timers::RequestTimerRegistry;
