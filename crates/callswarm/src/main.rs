//! # callswarm
//!
//! Swarm orchestrator server binary — wires together all crates and
//! starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callswarm_runtime::{
    JsonDirectory, ProviderDirectory, SimulationPlan, StandardSource, StaticDirectory, SwarmConfig,
    SwarmOrchestrator,
};
use callswarm_server::{metrics, router, AppState};
use callswarm_settings::CallswarmSettings;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Callswarm orchestrator server.
#[derive(Parser, Debug)]
#[command(name = "callswarm", about = "Appointment-booking swarm orchestrator")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.callswarm/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the provider directory JSON file (overrides settings).
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Path to the per-provider simulation plan (overrides settings).
    #[arg(long)]
    simulation: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,callswarm=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(cli: &Cli) -> CallswarmSettings {
    let settings = match &cli.settings {
        Some(path) => callswarm_settings::load_settings_from_path(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, ?path, "failed to load settings, using defaults");
            CallswarmSettings::default()
        }),
        None => callswarm_settings::load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CallswarmSettings::default()
        }),
    };
    callswarm_settings::init_settings(settings);
    (*callswarm_settings::get_settings()).clone()
}

fn build_directory(
    cli: &Cli,
    settings: &CallswarmSettings,
) -> Arc<dyn ProviderDirectory> {
    let path = cli
        .directory
        .clone()
        .or_else(|| settings.directory.path.clone());
    match path {
        Some(path) => match JsonDirectory::from_path(&path) {
            Ok(directory) => {
                tracing::info!(path = %path.display(), "provider directory loaded");
                Arc::new(directory)
            }
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "provider directory unusable, using built-in set");
                Arc::new(StaticDirectory)
            }
        },
        None => {
            tracing::info!("no provider directory configured, using built-in set");
            Arc::new(StaticDirectory)
        }
    }
}

fn build_plan(cli: &Cli, settings: &CallswarmSettings) -> SimulationPlan {
    let path = cli
        .simulation
        .clone()
        .or_else(|| settings.directory.simulation_path.clone());
    match path {
        Some(path) => SimulationPlan::from_path_or_empty(&path),
        None => SimulationPlan::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let settings = load_settings(&args);
    let handle = metrics::install_recorder();

    let directory = build_directory(&args, &settings);
    let plan = build_plan(&args, &settings);
    let orchestrator = Arc::new(SwarmOrchestrator::new(
        SwarmConfig::from_settings(&settings.swarm),
        directory,
        Arc::new(StandardSource::new(plan)),
    ));

    let state = Arc::new(AppState::new(
        orchestrator,
        handle,
        settings.server.webhook_secret.clone(),
    ));
    let app = router(state);

    let host = args.host.unwrap_or_else(|| settings.server.host.clone());
    let port = args.port.unwrap_or(settings.server.port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    let addr = listener.local_addr().context("failed to read bound addr")?;
    tracing::info!(
        %addr,
        demo_mode = settings.swarm.demo_mode,
        max_agents = settings.swarm.max_agents,
        "callswarm listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for ctrl-c");
    } else {
        tracing::info!("shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_settings_driven_bind() {
        let cli = Cli::parse_from(["callswarm"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_custom_bind() {
        let cli = Cli::parse_from(["callswarm", "--host", "127.0.0.1", "--port", "9000"]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn cli_paths() {
        let cli = Cli::parse_from([
            "callswarm",
            "--directory",
            "/tmp/providers.json",
            "--simulation",
            "/tmp/plan.json",
        ]);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/providers.json")));
        assert_eq!(cli.simulation, Some(PathBuf::from("/tmp/plan.json")));
    }

    #[test]
    fn directory_falls_back_to_static_set() {
        let cli = Cli::parse_from(["callswarm"]);
        let settings = CallswarmSettings::default();
        let directory = build_directory(&cli, &settings);
        assert!(!directory.providers_for("dentist", 15).is_empty());
    }

    #[test]
    fn bad_directory_path_falls_back_to_static_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, "{broken").unwrap();
        let cli = Cli::parse_from(["callswarm", "--directory", path.to_str().unwrap()]);
        let settings = CallswarmSettings::default();
        let directory = build_directory(&cli, &settings);
        assert!(!directory.providers_for("dentist", 15).is_empty());
    }
}
