use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

use slidecast::airplay::MdnsDirectory;
use slidecast::config::AppConfig;
use slidecast::database::SqliteStore;
use slidecast::logging;
use slidecast::playback::DeviceWorker;
use slidecast::render::CommandRenderer;
use slidecast::supervisor::{ProcessLauncher, Supervisor};

/// Slideshows on every wireless display on the network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover receivers and keep one worker running per receiver (default)
    Supervise,
    /// Play the slideshow assigned to one device until it is unassigned
    Worker {
        /// Device name as advertised by the receiver
        device_name: String,
    },
    /// Write a default configuration file and exit
    InitConfig,
    /// Create an empty slideshow database with the expected schema and exit
    InitDatabase,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging_with_debug(cli.debug) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command.unwrap_or(Command::Supervise) {
        Command::Supervise => supervise(cli.config, cli.debug).await,
        Command::Worker { device_name } => worker(cli.config, device_name).await,
        Command::InitConfig => init_config(cli.config),
        Command::InitDatabase => init_database(cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(config: Option<PathBuf>) -> anyhow::Result<(PathBuf, AppConfig)> {
    let path = config.unwrap_or_else(AppConfig::default_config_path);
    let app_config = AppConfig::load_or_create(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((path, app_config))
}

async fn supervise(config: Option<PathBuf>, debug: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let (config_path, app_config) = load_config(config)?;
    logging::log_configuration_status(&config_path, &app_config);

    let directory =
        MdnsDirectory::new(&app_config.discovery).context("Failed to start mDNS discovery")?;
    let launcher = ProcessLauncher::for_current_exe(Some(&config_path), debug)
        .context("Failed to locate the worker executable")?;

    info!("Starting supervisor");
    let mut supervisor = Supervisor::new(directory, launcher, &app_config.supervisor);
    let terminated = supervisor.run_until(shutdown_signal()).await;

    logging::log_shutdown_info(terminated, started.elapsed());
    Ok(())
}

async fn worker(config: Option<PathBuf>, device_name: String) -> anyhow::Result<()> {
    let (_, app_config) = load_config(config)?;

    let store = SqliteStore::open_read_only(app_config.get_database_path())
        .await
        .context("Failed to open slideshow database")?;

    let directory =
        MdnsDirectory::new(&app_config.discovery).context("Failed to start mDNS discovery")?;
    let renderer = CommandRenderer::new(app_config.renderer.clone());

    let worker = DeviceWorker::new(
        device_name,
        directory,
        store,
        renderer,
        app_config.playback.clone(),
    );
    let exit = worker.run().await?;
    info!("Worker for {} finished: {:?}", worker.device_name(), exit);

    Ok(())
}

fn init_config(config: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config.unwrap_or_else(AppConfig::default_config_path);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    AppConfig::default().save_to_file(&path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn init_database(config: Option<PathBuf>) -> anyhow::Result<()> {
    let (_, app_config) = load_config(config)?;
    let store = SqliteStore::create(app_config.get_database_path())
        .await
        .context("Failed to create slideshow database")?;
    info!("Slideshow database ready at {}", store.path().display());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
