//! Server configuration.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use tracing::info;

/// Default gRPC port.
pub const DEFAULT_PORT: u16 = 50051;

/// Errors in the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// At least one routing worker is required
    #[error("thread count must be at least 1")]
    NoThreads,

    /// Sample rates are plain decimal numbers like `1` or `0.1`
    #[error("invalid sample rate {0:?}")]
    InvalidSample(String),
}

/// Configuration of the routing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Scenario snapshot every worker materializes
    pub scenario: PathBuf,
    /// Optional identifier store loaded before warm-up
    pub id_store: Option<PathBuf>,
    /// Base directory for profiling output
    pub output_dir: PathBuf,
    /// Number of routing workers
    pub threads: usize,
    /// Port to listen on
    pub port: u16,
    /// Whether per-request profiling is recorded
    pub profiling: bool,
    /// Sample rate substituted into `<n>pct` file name tokens
    pub sample: Option<String>,
    /// Reduce URL-like input paths to their file name
    pub local_files: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scenario: PathBuf::from("scenario.json"),
            id_store: None,
            output_dir: PathBuf::from("output"),
            threads: 1,
            port: DEFAULT_PORT,
            profiling: true,
            sample: None,
            local_files: false,
        }
    }
}

impl ServerConfig {
    pub fn new(scenario: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            scenario: scenario.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_id_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.id_store = Some(path.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    pub fn with_local_files(mut self, local_files: bool) -> Self {
        self.local_files = local_files;
        self
    }

    /// Check the configuration and rewrite input paths for the sample rate
    /// and local files.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }

        if let Some(sample) = &self.sample {
            if !is_sample_rate(sample) {
                return Err(ConfigError::InvalidSample(sample.clone()));
            }
            self.scenario = adjust_path(&self.scenario, sample);
            self.id_store = self.id_store.map(|path| adjust_path(&path, sample));
        }

        if self.local_files {
            self.scenario = PathBuf::from(file_name_from_url(&self.scenario.to_string_lossy()));
            self.id_store = self
                .id_store
                .map(|path| PathBuf::from(file_name_from_url(&path.to_string_lossy())));
        }

        Ok(self)
    }
}

/// `<digits>pct` tokens in input file names.
static SAMPLE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+pct").expect("sample token pattern is valid"));

/// Plain decimal sample rates such as `25` or `0.1`.
static SAMPLE_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("sample rate pattern is valid"));

fn is_sample_rate(sample: &str) -> bool {
    SAMPLE_RATE.is_match(sample)
}

fn adjust_path(path: &Path, sample: &str) -> PathBuf {
    let name = path.to_string_lossy();
    let adjusted = adjust_sample(&name, sample);
    if adjusted != name {
        info!(from = %name, to = %adjusted, "adjusting file name for sample");
    }
    PathBuf::from(adjusted)
}

/// Replace every `<digits>pct` token in `name` with `<sample>pct`.
pub fn adjust_sample(name: &str, sample: &str) -> String {
    SAMPLE_TOKEN
        .replace_all(name, NoExpand(&format!("{sample}pct")))
        .into_owned()
}

/// The last path segment of a URL or path.
pub fn file_name_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_substitution() {
        assert_eq!(
            adjust_sample("berlin-v6.4-10pct.plans.xml.gz", "1"),
            "berlin-v6.4-1pct.plans.xml.gz"
        );
        assert_eq!(adjust_sample("a-3pct-b-25pct", "0.1"), "a-0.1pct-b-0.1pct");
        assert_eq!(adjust_sample("no-sample.json", "1"), "no-sample.json");
        assert_eq!(adjust_sample("10pc", "1"), "10pc");
        assert_eq!(adjust_sample("pct", "1"), "pct");
    }

    #[test]
    fn file_names_from_urls() {
        assert_eq!(
            file_name_from_url("https://svn.example.org/scenarios/berlin/network.json"),
            "network.json"
        );
        assert_eq!(file_name_from_url("local.json"), "local.json");
        assert_eq!(file_name_from_url("dir/"), "");
    }

    #[test]
    fn resolve_applies_sample_and_local_files() {
        let config = ServerConfig::new("https://host/x/scenario-10pct.json", "out")
            .with_id_store("https://host/x/ids-10pct.bin")
            .with_sample("25")
            .with_local_files(true)
            .resolve()
            .unwrap();

        assert_eq!(config.scenario, PathBuf::from("scenario-25pct.json"));
        assert_eq!(config.id_store, Some(PathBuf::from("ids-25pct.bin")));
    }

    #[test]
    fn resolve_rejects_bad_values() {
        assert!(matches!(
            ServerConfig::default().with_threads(0).resolve(),
            Err(ConfigError::NoThreads)
        ));
        assert!(matches!(
            ServerConfig::default().with_sample("ten").resolve(),
            Err(ConfigError::InvalidSample(_))
        ));
        assert!(matches!(
            ServerConfig::default().with_sample("1.2.3").resolve(),
            Err(ConfigError::InvalidSample(_))
        ));
        assert!(matches!(
            ServerConfig::default().with_sample(".5").resolve(),
            Err(ConfigError::InvalidSample(_))
        ));
        assert!(ServerConfig::default().with_sample("0.1").resolve().is_ok());
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.threads, 1);
        assert!(config.profiling);
        assert!(!config.local_files);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ConfigError::NoThreads.to_string(),
            "thread count must be at least 1"
        );
        assert_eq!(
            ConfigError::InvalidSample("x".into()).to_string(),
            "invalid sample rate \"x\""
        );
    }
}
