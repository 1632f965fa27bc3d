use anyhow::Context;
use clap::{Parser, ValueEnum};
use mockyard::config::{EngineConfig, DEFAULT_CONTROL_PORT};
use mockyard::control_api::ControlApiServer;
use mockyard::project::load_project_file;
use mockyard::{EngineEvent, FleetManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "mockyard", version, about = "Mock server engine")]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Project file to load (JSON or YAML); may be repeated
    #[arg(short, long = "project")]
    projects: Vec<PathBuf>,
    /// Control API port
    #[arg(long, env = "MOCKYARD_CONTROL_PORT")]
    control_port: Option<u16>,
    /// Start every server of the first project
    #[arg(long)]
    start_all: bool,
    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Mirror engine notifications into the process log.
fn spawn_event_logger(fleet: &FleetManager, shutdown: CancellationToken) {
    let mut events = fleet.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(EngineEvent::ServersConsole { project, log }) => info!(
                    "[{}/{}] {} {} -> {} ({:?})",
                    project,
                    log.server,
                    log.request.method,
                    log.request.path,
                    log.response.status,
                    log.log_type
                ),
                Ok(EngineEvent::HostIpChanged { previous, current }) => warn!(
                    "Host IP changed ({:?} -> {}); restart or close the running servers",
                    previous, current
                ),
                Ok(other) => tracing::debug!("Event {}", other.kind()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger lagged, {} events dropped", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.projects.extend(args.projects.iter().cloned());
    if let Some(port) = args.control_port {
        config.control.port = port;
    }
    config.validate()?;

    let fleet = Arc::new(FleetManager::new(config.app.clone())?);
    let shutdown = CancellationToken::new();
    spawn_event_logger(&fleet, shutdown.clone());

    let mut first = None;
    for path in &config.projects {
        let tree = load_project_file(path)?;
        let name = fleet.register_project(tree)?;
        info!("Registered project '{}' from {}", name, path.display());
        first.get_or_insert(name);
    }
    if let Some(name) = first {
        fleet.load_project(&name).await?;
        if args.start_all {
            for (server, result) in fleet.start_all().await? {
                if let Err(e) = result {
                    error!("Server '{}' failed to start: {}", server, e);
                }
            }
        }
    }

    if let Some(ip) = mockyard::fleet::detect_host_ip().await {
        fleet.observe_host_ip(&ip.to_string());
    }
    let watcher = fleet.spawn_host_ip_watcher(shutdown.clone());

    let addr: SocketAddr = format!("{}:{}", config.control.host, config.control.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid control address {}:{}",
                config.control.host, config.control.port
            )
        })?;
    let api = ControlApiServer::bind(addr, Arc::clone(&fleet))
        .await
        .with_context(|| format!("Failed to bind control API on {addr}"))?;
    let api_task = tokio::spawn(api.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    if fleet.active_project().is_some() {
        fleet.close_all().await?;
    }
    if let Some(watcher) = watcher {
        watcher.await.ok();
    }
    api_task.await??;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args);
    info!(
        "Starting mockyard {} (control port default {})",
        env!("CARGO_PKG_VERSION"),
        DEFAULT_CONTROL_PORT
    );

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
