//! Plain and TLS acceptors.
//!
//! Both acceptors run the same accept loop: accept a TCP connection, wrap it
//! (TLS handshake or nothing) within the I/O deadline, then serve it with
//! hyper's auto HTTP/1 + HTTP/2 connection builder. Each acceptor stops when
//! its own shutdown future resolves; connections already accepted keep
//! running until their requests finish.
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("read PEM from {path}: {reason}")]
    Pem { path: PathBuf, reason: String },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("tls configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server TLS configuration from a PEM certificate chain and private key.
/// Protocol versions and cipher suites are rustls's safe defaults.
pub fn load_tls_config(
    certificate_path: &Path,
    private_key_path: &Path,
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let pem_error = |path: &Path, err: rustls::pki_types::pem::Error| TlsError::Pem {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    let certs = CertificateDer::pem_file_iter(certificate_path)
        .map_err(|err| pem_error(certificate_path, err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| pem_error(certificate_path, err))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(certificate_path.to_path_buf()));
    }
    let key = PrivateKeyDer::from_pem_file(private_key_path)
        .map_err(|err| pem_error(private_key_path, err))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

pub async fn serve_plain<F>(
    listener: TcpListener,
    router: Router,
    io_timeout: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    accept_loop(listener, router, io_timeout, shutdown, |stream| async move {
        Ok::<_, std::io::Error>(stream)
    })
    .await
}

pub async fn serve_tls<F>(
    listener: TcpListener,
    tls: Arc<rustls::ServerConfig>,
    router: Router,
    io_timeout: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let acceptor = TlsAcceptor::from(tls);
    accept_loop(listener, router, io_timeout, shutdown, move |stream| {
        let acceptor = acceptor.clone();
        async move { acceptor.accept(stream).await }
    })
    .await
}

async fn accept_loop<F, W, Fut, IO>(
    listener: TcpListener,
    router: Router,
    io_timeout: Duration,
    shutdown: F,
    wrap: W,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
    W: Fn(TcpStream) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = std::io::Result<IO>> + Send + 'static,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "listener accepting connections");
    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, addr = %local_addr, "accept failed");
                    continue;
                }
            },
        };
        let router = router.clone();
        let wrap = wrap.clone();
        tokio::spawn(async move {
            let io = match tokio::time::timeout(io_timeout, wrap(stream)).await {
                Ok(Ok(io)) => io,
                Ok(Err(err)) => {
                    tracing::debug!(%peer, error = %err, "connection setup failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(%peer, "connection setup timed out");
                    return;
                }
            };
            let mut builder = auto::Builder::new(TokioExecutor::new());
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(io_timeout);
            let service = TowerToHyperService::new(router);
            if let Err(err) = builder.serve_connection(TokioIo::new(io), service).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
    tracing::info!(addr = %local_addr, "listener stopped accepting connections");
    Ok(())
}
