//! gRPC front end.
//!
//! Shutdown, whether requested over RPC or by a signal, runs one sequence:
//! wait for the workers to go idle, write the profiling table, answer the
//! caller, then stop accepting connections. The tonic server is given
//! [`SHUTDOWN_GRACE_PERIOD`] to finish open connections before its task is
//! aborted.
//!
//! The server also answers gRPC reflection queries for both protobuf
//! packages.

mod error;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::OnceCell;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::pool::WorkerPool;
use crate::profiling::ProfilingRegistry;
use crate::proto::FILE_DESCRIPTOR_SET;
use crate::proto::routing as pb;
use crate::proto::routing::routing_service_server::{RoutingService, RoutingServiceServer};

pub use error::ServerError;

/// How long open connections may take to finish after shutdown starts.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Where the profiling table is written on shutdown.
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub output_dir: PathBuf,
    pub build_id: String,
}

type FlushOutcome = Result<Option<PathBuf>, Arc<ServerError>>;

/// Runs the shutdown sequence at most once.
pub struct Shutdown {
    pool: Arc<WorkerPool>,
    profiling: Arc<ProfilingRegistry>,
    output: OutputSettings,
    token: CancellationToken,
    outcome: OnceCell<FlushOutcome>,
}

impl Shutdown {
    pub fn new(
        pool: Arc<WorkerPool>,
        profiling: Arc<ProfilingRegistry>,
        output: OutputSettings,
    ) -> Self {
        Self {
            pool,
            profiling,
            output,
            token: CancellationToken::new(),
            outcome: OnceCell::new(),
        }
    }

    /// Token cancelled once shutdown has been triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drain the pool and flush profiling data, then trigger shutdown.
    ///
    /// A failed flush is returned to the caller but shutdown proceeds.
    /// Concurrent and repeated calls share the first call's outcome.
    pub async fn run(&self) -> FlushOutcome {
        let outcome = self
            .outcome
            .get_or_init(|| async {
                info!("shutdown requested, draining workers");
                self.pool.drain().await;
                self.flush().await.map_err(Arc::new)
            })
            .await
            .clone();

        if let Err(e) = &outcome {
            error!(error = %e, "profiling flush failed, shutting down anyway");
        }
        // Cancelling only stops new connections. tonic still delivers the
        // replies of open streams, this caller's included.
        self.token.cancel();
        outcome
    }

    async fn flush(&self) -> Result<Option<PathBuf>, ServerError> {
        let profiling = Arc::clone(&self.profiling);
        let output = self.output.clone();
        let path = tokio::task::spawn_blocking(move || {
            profiling.flush(&output.output_dir, &output.build_id)
        })
        .await??;
        Ok(path)
    }
}

/// gRPC handler for the routing service.
#[derive(Clone)]
pub struct RouterGrpc {
    pool: Arc<WorkerPool>,
    shutdown: Arc<Shutdown>,
}

impl RouterGrpc {
    pub fn new(pool: Arc<WorkerPool>, shutdown: Arc<Shutdown>) -> Self {
        Self { pool, shutdown }
    }
}

#[tonic::async_trait]
impl RoutingService for RouterGrpc {
    async fn get_route(
        &self,
        request: Request<pb::Request>,
    ) -> Result<Response<pb::Response>, Status> {
        let request = request.into_inner();
        match self.pool.route(request).await {
            Ok(response) => Ok(Response::new(response)),
            Err(e) => {
                warn!(error = %e, "routing request failed");
                Err(e.into())
            }
        }
    }

    async fn shutdown(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::Empty>, Status> {
        match self.shutdown.run().await {
            Ok(_) => Ok(Response::new(pb::Empty {})),
            Err(e) => Err(Status::internal(e.to_string())),
        }
    }
}

/// Serve until a shutdown RPC or SIGINT/SIGTERM.
pub async fn serve(
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    profiling: Arc<ProfilingRegistry>,
    output: OutputSettings,
) -> Result<(), ServerError> {
    serve_until(listener, pool, profiling, output, wait_for_signal()).await
}

/// Serve until a shutdown RPC or until `signal` resolves. Either way the
/// full shutdown sequence runs before the listener closes.
pub async fn serve_until(
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    profiling: Arc<ProfilingRegistry>,
    output: OutputSettings,
    signal: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let addr = listener.local_addr().map_err(ServerError::Listener)?;
    let shutdown = Arc::new(Shutdown::new(Arc::clone(&pool), profiling, output));
    let token = shutdown.token();

    let service = RoutingServiceServer::new(RouterGrpc::new(pool, Arc::clone(&shutdown)));
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let stopped = token.clone();
    let mut server = tokio::spawn(
        Server::builder()
            .add_service(service)
            .add_service(reflection)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stopped.cancelled().await
            }),
    );
    info!(%addr, "routing server listening");

    tokio::select! {
        _ = token.cancelled() => {}
        _ = signal => {
            info!("shutdown signal received");
            // Errors are logged by `run`; the process stops regardless.
            let _ = shutdown.run().await;
        }
        joined = &mut server => {
            joined??;
            warn!("server stopped without a shutdown request");
            return Ok(());
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            warn!(
                grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "connections still open after grace period, aborting server"
            );
            server.abort();
        }
    }

    info!("routing server stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
