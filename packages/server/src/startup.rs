//! Startup banner and build-info gauge.

use metrics::gauge;

use crate::config::ObskitConfig;

/// Gauge permanently set to 1, tagged with the crate version, so dashboards
/// can correlate behavior changes with deployments.
pub const APP_INFO: &str = "app.info";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const RULER: &str =
    "=============================================================================";

/// Logs a one-shot summary of the active observability configuration and
/// registers the build-info gauge. Call once, after the subscriber is
/// installed.
pub fn print_banner(config: &ObskitConfig) {
    let mode = if (config.sampling.probability - 1.0).abs() < f64::EPSILON {
        "(Full)"
    } else {
        "(Sampled)"
    };

    tracing::info!(
        concat!(
            "\n{ruler}\n",
            "   OBSERVABILITY ACTIVE   ::   service: {service} v{version}\n",
            "{ruler}\n",
            "   Environment : {environment}\n",
            "   Tracing     : [sample rate: {rate}] {mode}\n",
            "   Async prop  : {async_prop}\n",
            "   Trace guard : [fail-fast: {fail_fast}]\n",
            "   Logging     : [structured + pii masking]\n",
            "{ruler}"
        ),
        ruler = RULER,
        service = config.service_name,
        version = VERSION,
        environment = config.environment,
        rate = config.sampling.probability,
        mode = mode,
        async_prop = if config.async_propagation.enabled {
            "ENABLED"
        } else {
            "DISABLED"
        },
        fail_fast = config.trace_guard.fail_on_missing,
    );

    gauge!(APP_INFO, "version" => VERSION).set(1.0);
}
