//! Warden dispatch service entry point.
//!
//! # Purpose
//! Wires configuration, storage and the resource tree, then starts the plain
//! acceptor, the optional TLS acceptor and the metrics endpoint.
//!
//! # Notes
//! On shutdown the acceptors stop taking connections first; the process then
//! waits for in-flight requests to drain before exiting.
use anyhow::Context;
use dispatch::api::Reply;
use dispatch::app::build_router;
use dispatch::config::{ServiceConfig, StorageBackend};
use dispatch::listener::{load_tls_config, serve_plain, serve_tls};
use dispatch::observability;
use dispatch::service::{Service, ServiceBuilder};
use dispatch::store::AccessStore;
use dispatch::store::memory::InMemoryStore;
use dispatch::store::postgres::PostgresStore;
use dispatch::tree::{RootConfig, handler};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use warden_authz::{DefaultPermissions, Inheritance, Permissions, Verb};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env_or_yaml().context("service config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ServiceConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability(&config.name)?;
    let service = build_service(&config).await?;
    let lifecycle = service.lifecycle().clone();
    let io_timeout = Duration::from_secs(config.io_timeout_secs);
    let router = build_router(service.clone());

    let metrics_task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(observability::serve_metrics(
            metrics_handle,
            config.metrics_bind,
            async move { lifecycle.drained().await },
        ))
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    let plain_task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(serve_plain(
            listener,
            router.clone(),
            io_timeout,
            async move { lifecycle.shutdown_requested().await },
        ))
    };

    let tls_task = match &config.tls {
        Some(tls) => {
            let tls_config = load_tls_config(&tls.certificate_path, &tls.private_key_path)
                .context("load tls certificate")?;
            let listener = tokio::net::TcpListener::bind(tls.bind_addr)
                .await
                .with_context(|| format!("bind {}", tls.bind_addr))?;
            let lifecycle = lifecycle.clone();
            Some(tokio::spawn(serve_tls(
                listener,
                tls_config,
                router,
                io_timeout,
                async move { lifecycle.shutdown_requested().await },
            )))
        }
        None => None,
    };

    shutdown.await;
    lifecycle.begin_shutdown();
    if tokio::time::timeout(DRAIN_TIMEOUT, lifecycle.drained())
        .await
        .is_err()
    {
        tracing::warn!(
            in_flight = lifecycle.in_flight(),
            "in-flight requests did not drain in time"
        );
    }

    let _ = plain_task.await;
    if let Some(task) = tls_task {
        let _ = task.await;
    }
    metrics_task.abort();
    let _ = metrics_task.await;
    tracing::info!(service = %service.name(), "service stopped");
    Ok(())
}

async fn build_service(config: &ServiceConfig) -> anyhow::Result<Service> {
    let store: Arc<dyn AccessStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };

    ServiceBuilder::from_config(config)
        .store(store)
        .root(status_root())
        .build()
        .map_err(|errors| {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::anyhow!("invalid service configuration: {}", details.join("; "))
        })
}

/// The root answers reads with the service name and store health.
fn status_root() -> RootConfig {
    let read = Permissions::from_verbs([Verb::Read]);
    RootConfig::default()
        .defaults(DefaultPermissions::new(
            read,
            read,
            Inheritance {
                other_user_permissions: true,
                ..Inheritance::default()
            },
        ))
        .on(
            Verb::Read,
            handler(|_principal, _request, service| async move {
                let healthy = service.health().await.is_ok();
                Ok(Reply::json()
                    .data("service", service.name())
                    .data("store", service.store().backend_name())
                    .data("healthy", healthy))
            }),
        )
}
