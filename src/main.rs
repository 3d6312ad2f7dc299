use double_pendulum_sim::config::{ScenarioConfig, ServerConfig};
use double_pendulum_sim::ui::{configure, AppState};
use double_pendulum_sim::{derive_equations, derive_equations_2d, derive_equations_3d};
use double_pendulum_sim::{simulate_with, IntegrationOptions};

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Damped double pendulum simulator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the simulation API over HTTP.
    Serve {
        /// YAML server configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        bind: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Simulate one YAML scenario and print the trajectory as JSON.
    Run {
        scenario: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
}

fn init_tracing() {
    // Logs go to stderr so `run` output stays clean JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_scenario(path: PathBuf, pretty: bool) -> Result<()> {
    let scenario = ScenarioConfig::load(&path)?;
    let equations = derive_equations(scenario.dimension)?;
    let initial = scenario.initial_conditions.resolve()?;
    let options = IntegrationOptions {
        tolerance: scenario.tolerance,
        ..Default::default()
    };
    let trajectory = simulate_with(
        &scenario.parameters,
        &initial,
        scenario.duration,
        equations,
        &options,
    )
    .with_context(|| format!("simulating {}", path.display()))?;
    info!(samples = trajectory.len(), "scenario finished");

    let json = if pretty {
        serde_json::to_string_pretty(&trajectory)?
    } else {
        serde_json::to_string(&trajectory)?
    };
    println!("{json}");
    Ok(())
}

async fn serve(config: Option<PathBuf>, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let mut cfg = match config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = bind {
        cfg.bind = bind;
    }
    if let Some(port) = port {
        cfg.port = port;
    }

    // Derive both models up front; a broken model must stop start-up
    derive_equations_2d().context("planar model")?;
    derive_equations_3d().context("spherical model")?;

    let address = (cfg.bind.clone(), cfg.port);
    let static_dir = cfg.static_dir.clone();
    info!(bind = %cfg.bind, port = cfg.port, "starting server");
    let state = web::Data::new(AppState { config: cfg });

    HttpServer::new(move || {
        let app = App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure);
        match &static_dir {
            Some(dir) => app.service(Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind(address)?
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();
    match Args::parse().command {
        Command::Serve { config, bind, port } => serve(config, bind, port).await,
        Command::Run { scenario, pretty } => run_scenario(scenario, pretty),
    }
}
