use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use routing_server::BUILD_ID;
use routing_server::config::ServerConfig;
use routing_server::engine::{EngineFactory, TimetableEngineFactory};
use routing_server::ids::{IdRegistry, IdStore};
use routing_server::pool::WorkerPool;
use routing_server::profiling::ProfilingRegistry;
use routing_server::server::{self, OutputSettings};
use routing_server::service::ServiceContext;

/// gRPC transit routing server for remote simulations
#[derive(Parser, Debug)]
#[command(name = "routing-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scenario snapshot (JSON)
    #[arg(long)]
    scenario: PathBuf,

    /// Identifier store registered before warm-up
    #[arg(long)]
    id_store: Option<PathBuf>,

    /// Base output directory
    #[arg(long)]
    output: PathBuf,

    /// Number of routing workers
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Port to listen on
    #[arg(long, default_value_t = routing_server::config::DEFAULT_PORT)]
    port: u16,

    /// Sample rate substituted into `<n>pct` file names
    #[arg(long)]
    sample: Option<String>,

    /// Use local copies of URL inputs (file name only)
    #[arg(long)]
    local_files: bool,

    /// Disable per-request profiling
    #[arg(long)]
    no_profile: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let mut config = ServerConfig::new(cli.scenario, cli.output)
            .with_threads(cli.threads)
            .with_port(cli.port)
            .with_profiling(!cli.no_profile)
            .with_local_files(cli.local_files);
        if let Some(path) = cli.id_store {
            config = config.with_id_store(path);
        }
        if let Some(sample) = cli.sample {
            config = config.with_sample(sample);
        }
        config
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(filter)
        .init();

    let config = ServerConfig::from(Cli::parse());
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "routing server failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.resolve()?;
    info!(
        scenario = %config.scenario.display(),
        output = %config.output_dir.display(),
        threads = config.threads,
        profile = config.profiling,
        sample = ?config.sample,
        build = BUILD_ID,
        "starting routing server"
    );

    std::fs::create_dir_all(&config.output_dir)?;

    let ids = match &config.id_store {
        Some(path) => IdRegistry::register(IdStore::load(path)?),
        None => IdRegistry::empty(),
    };

    let profiling = Arc::new(ProfilingRegistry::new(config.threads, config.profiling));
    let ctx = ServiceContext::new(Arc::new(ids), Arc::clone(&profiling));
    let factory: Arc<dyn EngineFactory> = Arc::new(TimetableEngineFactory::new(&config.scenario));

    info!(threads = config.threads, "initializing workers");
    let mut pool = WorkerPool::new(config.threads, factory, ctx)?;
    pool.warm_all()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let output = OutputSettings {
            output_dir: config.output_dir.clone(),
            build_id: BUILD_ID.to_string(),
        };
        server::serve(listener, Arc::new(pool), profiling, output).await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
