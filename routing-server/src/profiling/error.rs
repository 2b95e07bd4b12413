use std::path::PathBuf;

/// Errors writing the profiling table.
#[derive(Debug, thiserror::Error)]
pub enum ProfilingError {
    /// Output directory or file could not be created or written
    #[error("failed to write profiling output {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization failed
    #[error("failed to write profiling table: {0}")]
    Csv(#[from] csv::Error),
}
