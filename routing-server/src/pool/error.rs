use crate::engine::EngineError;
use crate::service::RouteError;

/// Errors from the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker
    #[error("worker pool must have at least one worker")]
    NoWorkers,

    /// Worker thread could not be started
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// A worker failed to materialize its engine
    #[error("worker {worker} failed to warm up: {source}")]
    Warmup {
        worker: usize,
        #[source]
        source: EngineError,
    },

    /// A worker thread died while warming up
    #[error("a worker panicked while warming up")]
    WarmupPanicked,

    /// `warm_all` was already called
    #[error("worker pool is already warm")]
    AlreadyWarm,

    /// Requests arrived before `warm_all` completed
    #[error("worker pool is not warm")]
    NotWarm,

    /// Pool no longer accepts requests
    #[error("worker pool is shutting down")]
    Closed,

    /// A permit was granted but no worker was idle
    #[error("no idle worker despite a free permit")]
    NoIdleWorker,

    /// Worker thread is gone
    #[error("worker {0} is no longer running")]
    WorkerLost(usize),

    /// The request itself failed
    #[error(transparent)]
    Route(#[from] RouteError),
}

impl From<PoolError> for tonic::Status {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Route(err) => err.into(),
            PoolError::Closed | PoolError::NotWarm => tonic::Status::unavailable(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
