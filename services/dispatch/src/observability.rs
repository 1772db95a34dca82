//! Logging and metrics for the dispatch service.
//!
//! Tracing goes to stdout through the fmt layer, filtered by `RUST_LOG`
//! (default `info`). Metrics go to a process-wide Prometheus recorder and are
//! rendered at `/metrics` on their own listener, away from the resource tree.
//!
//! Both are installed at most once per process; repeated calls return the
//! existing recorder handle.
use metrics::{Unit, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING: OnceLock<()> = OnceLock::new();
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install tracing and the metrics recorder.
pub fn init_observability(service_name: &str) -> anyhow::Result<PrometheusHandle> {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();
    });
    let handle = recorder()?;
    tracing::debug!(service = service_name, "logging and metrics ready");
    Ok(handle)
}

/// Serve the Prometheus text format at `/metrics` on `addr`.
pub async fn serve_metrics<F>(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "metrics listener bound");
    serve_metrics_on(handle, listener, shutdown).await
}

async fn serve_metrics_on<F>(
    handle: PrometheusHandle,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

fn recorder() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        // Lost a concurrent install; the winner stored its handle first.
        return RECORDER
            .get()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("install metrics recorder: {err}"));
    }
    describe_dispatch_metrics();
    Ok(RECORDER.get_or_init(|| handle).clone())
}

fn describe_dispatch_metrics() {
    describe_counter!(
        "dispatch_requests_total",
        Unit::Count,
        "Requests by outcome: handled, an error code, or panic."
    );
    describe_counter!(
        "dispatch_cache_lookups_total",
        Unit::Count,
        "Provider cache lookups by cache and hit or miss."
    );
    describe_gauge!(
        "dispatch_in_flight_requests",
        Unit::Count,
        "Requests admitted and not yet answered."
    );
}
