//! Demo server wiring the full observability stack end to end.
//!
//! Routes:
//! - `GET /hello` -- logs inside the request scope and returns text
//! - `GET /boom` -- always fails, showing the error boundary's problem body
//! - `POST /audit` -- emits an audit record for a fake export
//! - `POST /work` -- stamps an envelope, submits pool work, consumes the
//!   envelope on the worker side, and reports the request id it carried
//! - `GET /metrics` -- Prometheus exposition of every gauge and timer
//!
//! ```text
//! cargo run --bin obskit-demo -- --fail-on-missing
//! curl -H 'traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01' \
//!     http://127.0.0.1:8080/hello
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use obskit_core::{ContextKey, MessageEnvelope};
use obskit_server::config::{ObskitConfig, TraceGuardConfig};
use obskit_server::propagation::{ConsumerInterceptor, ProducerInterceptor, TaskPropagator};
use obskit_server::scheduled::{ScheduledInstrumentation, ScheduledRunner, ScheduledTask};
use obskit_server::{startup, store, AuditLogger, BoundaryError, ObservabilityStack, WorkerPool};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Demo server for the obskit observability stack.
#[derive(Parser, Debug)]
#[command(name = "obskit-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "OBSKIT_DEMO_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Logical service name stamped into every request context.
    #[arg(long, env = "OBSKIT_SERVICE_NAME", default_value = "obskit-demo")]
    service_name: String,

    /// Deployment environment stamped into every request context.
    #[arg(long, env = "OBSKIT_ENVIRONMENT", default_value = "dev")]
    environment: String,

    /// Reject requests missing trace headers with 428 instead of warning.
    #[arg(long, env = "OBSKIT_TRACE_FAIL_ON_MISSING")]
    fail_on_missing: bool,

    /// Emit logs as JSON instead of human-readable lines.
    #[arg(long, env = "OBSKIT_DEMO_JSON_LOGS")]
    json_logs: bool,

    /// Worker pool capacity for `/work` submissions.
    #[arg(long, default_value_t = 4)]
    pool_capacity: usize,

    /// Seconds between scheduled heartbeat executions.
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: u64,

    /// Seconds between SLO gauge refreshes.
    #[arg(long, default_value_t = 10)]
    slo_refresh_secs: u64,

    /// Maximum seconds a request may take before timing out.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
}

/// Shared handles the route handlers need.
#[derive(Clone)]
struct DemoState {
    pool: WorkerPool,
    audit: AuditLogger,
    producer: ProducerInterceptor,
    consumer: ConsumerInterceptor,
    prometheus: PrometheusHandle,
}

/// Scheduled task that proves the instrumentation runs outside requests.
#[derive(Debug, Default)]
struct Heartbeat {
    beats: u64,
}

#[async_trait]
impl ScheduledTask for Heartbeat {
    fn name(&self) -> &str {
        "demo.heartbeat"
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        self.beats += 1;
        tracing::info!(beats = self.beats, "Demo heartbeat");
        Ok(())
    }
}

/// Logs inside the request scope; the subscriber output shows the ids the
/// lifecycle filter resolved for this request.
async fn hello_handler() -> String {
    tracing::info!("Hello endpoint called");
    let request_id = store::get(ContextKey::RequestId).unwrap_or_default();
    format!("Hello from request {request_id}\n")
}

/// Always fails so the boundary's enriched log and problem body can be
/// observed from a terminal.
async fn boom_handler() -> Result<String, BoundaryError> {
    Err(anyhow::anyhow!("demo dependency refused the connection").into())
}

/// Emits an audit record attributed to the request's user, if one arrived.
async fn audit_handler(State(state): State<DemoState>) -> Json<serde_json::Value> {
    let actor = store::get(ContextKey::UserId).unwrap_or_else(|| "anonymous".to_string());
    state.audit.log("report.export", &actor, "report-42", "SUCCESS");
    Json(json!({ "audited": true, "actor": actor }))
}

/// Stamps an envelope with the request context, hands it to the worker pool,
/// and consumes the envelope on the worker side. The response reports the
/// request id the work carried across both hops.
async fn work_handler(
    State(state): State<DemoState>,
) -> Result<Json<serde_json::Value>, BoundaryError> {
    let mut envelope = MessageEnvelope::new("demo.jobs", b"{\"kind\":\"recompute\"}".to_vec());
    let stamped = state.producer.on_send(&mut envelope);

    let consumer = state.consumer.clone();
    let handle = state
        .pool
        .submit(async move {
            consumer.on_consume(&envelope);
            tracing::info!("Processing demo job");
            store::get(ContextKey::RequestId).unwrap_or_default()
        })
        .await
        .map_err(anyhow::Error::new)?;
    let carried = handle.await.map_err(anyhow::Error::new)?;

    Ok(Json(json!({
        "stamped_headers": stamped,
        "carried_request_id": carried,
        "pool_utilization": state.pool.utilization(),
    })))
}

/// Prometheus exposition for everything the stack records.
async fn metrics_handler(State(state): State<DemoState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

/// Lifts the W3C trace id and span id out of an inbound `traceparent`
/// header so they land in logs next to the request id.
fn lift_traceparent(parts: &Parts) {
    let Some(value) = parts
        .headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };

    let mut fields = value.split('-');
    if let Some(trace_id) = fields.nth(1) {
        store::set(ContextKey::TraceId, trace_id);
    }
    if let Some(span_id) = fields.next() {
        store::set(ContextKey::SpanId, span_id);
    }
}

/// Permissive CORS for a demo: any origin, GET and POST, any headers.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

fn init_tracing(json_logs: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("installing the Prometheus recorder")?;

    let config = ObskitConfig {
        service_name: args.service_name.clone(),
        environment: args.environment.clone(),
        trace_guard: TraceGuardConfig {
            fail_on_missing: args.fail_on_missing,
            ..TraceGuardConfig::default()
        },
        ..ObskitConfig::default()
    };

    startup::print_banner(&config);

    let stack = ObservabilityStack::new(config.clone()).with_contributor(lift_traceparent);
    let aggregator = stack.aggregator();
    let mut refresher = aggregator.start_refresher(Duration::from_secs(args.slo_refresh_secs));

    let pool = WorkerPool::new("demo", args.pool_capacity, TaskPropagator::new(&config));
    let mut heartbeat = ScheduledRunner::start(
        Heartbeat::default(),
        Duration::from_secs(args.heartbeat_secs),
        ScheduledInstrumentation::new(&config),
    );

    let state = DemoState {
        pool: pool.clone(),
        audit: AuditLogger::new(&config),
        producer: ProducerInterceptor::new(&config),
        consumer: ConsumerInterceptor::new(&config),
        prometheus,
    };

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/boom", get(boom_handler))
        .route("/audit", post(audit_handler))
        .route("/work", post(work_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(args.request_timeout_secs),
                ))
                .layer(stack.layers()),
        )
        .with_state(state);

    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    tracing::info!("HTTP listener bound to {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat.stop().await;
    refresher.stop().await;
    pool.close();
    tracing::info!("Demo server stopped");
    Ok(())
}
