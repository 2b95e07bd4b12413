use crate::profiling::ProfilingError;

/// Errors from running the gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not be inspected
    #[error("listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// tonic transport failure
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Server or flush task failed to complete
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Reflection descriptors could not be registered
    #[error("reflection setup failed: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// Profiling data could not be written on shutdown
    #[error("profiling flush failed: {0}")]
    Flush(#[from] ProfilingError),
}
