// src/main.rs - Stepper host entry point
use clap::Parser;
use gpio_stepper::board::Board;
use gpio_stepper::config::{self, BackendKind, HostConfig};
use gpio_stepper::hardware;
use gpio_stepper::registry::MotorRegistry;
use gpio_stepper::store::ConfigStore;
use gpio_stepper::web;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SETTINGS: &str = "stepper.toml";

/// Web-controlled stepper motor host
#[derive(Parser, Debug)]
#[command(name = "stepper-host", about = "Drive step/direction motor drivers from a web API.")]
struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the motor pin configuration (JSON)
    #[arg(short, long)]
    pins: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:5000
    #[arg(short, long)]
    bind: Option<String>,

    /// Never touch real GPIO
    #[arg(long)]
    simulate: bool,
}

fn load_settings(cli: &Cli) -> Result<HostConfig, config::SettingsError> {
    let mut settings = match &cli.config {
        Some(path) => config::load_config(&path.to_string_lossy())?,
        None if Path::new(DEFAULT_SETTINGS).exists() => config::load_config(DEFAULT_SETTINGS)?,
        None => {
            tracing::info!("No settings file given; using defaults");
            HostConfig::default()
        }
    };
    if let Some(pins) = &cli.pins {
        settings.motors.pin_config = pins.clone();
    }
    if let Some(bind) = &cli.bind {
        settings.server.bind = bind.clone();
    }
    if cli.simulate {
        settings.gpio.backend = BackendKind::Simulated;
    }
    settings.validate()?;
    Ok(settings)
}

async fn shutdown_signal(registry: Arc<MotorRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown requested; stopping all motors");
    registry.emergency_stop().await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting stepper host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let settings = load_settings(&cli).map_err(|e| {
        tracing::error!("Failed to load settings: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    let actuator = hardware::open_backend(&settings.gpio)?;
    tracing::info!(
        "GPIO backend: {}{}",
        actuator.name(),
        if actuator.is_simulated() { " (mock mode)" } else { "" }
    );

    tracing::info!("Pin configuration: {}", settings.motors.pin_config.display());
    let store = ConfigStore::new(settings.motors.pin_config.clone(), Board::raspberry_pi());
    let registry = Arc::new(MotorRegistry::new(store, actuator, settings.pulse.clone()));
    for (name, motor) in registry.status() {
        tracing::info!("  {}: {}", name, motor.config.assignment);
    }

    let app = web::api::create_router(registry.clone());
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    tracing::info!("Stepper host stopped");
    Ok(())
}
