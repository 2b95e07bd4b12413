//! Engine error types.

use std::path::PathBuf;

/// Errors from materializing or running a routing engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Scenario file could not be read
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scenario file is not valid JSON for the scenario schema
    #[error("failed to parse scenario {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Scenario data is inconsistent
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// The engine could not answer a query
    #[error("routing failed: {0}")]
    Routing(String),
}
