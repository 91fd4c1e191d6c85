//! Command-line interface for swarmlink.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::StaticTokenValidator;
use crate::config::{self, Settings};
use crate::control::ControlPlane;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::server;
use crate::sim::{Scenario, TickMode};

#[derive(Parser)]
#[command(
    name = "swarmlink",
    about = "Agent control plane and tick-gated simulation coordinator",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default settings file.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
    /// Run the control plane: listener, heartbeat sweep, timeout sweep.
    Serve {
        /// Settings file path (defaults to ~/.swarmlink/settings.json).
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Drive a scripted local-agent simulation from a scenario file.
    Simulate {
        /// Scenario JSON file.
        #[arg(long)]
        scenario: PathBuf,
        /// Maximum ticks to run.
        #[arg(long)]
        ticks: Option<u32>,
        /// Settings file path; built-in defaults are used when absent.
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init { force } => run_init(force),
            Commands::Serve { settings } => run_serve(settings).await,
            Commands::Simulate {
                scenario,
                ticks,
                settings,
            } => run_simulate(&scenario, ticks, settings).await,
        }
    }
}

fn run_init(force: bool) -> Result<()> {
    let path = config::get_settings_path()?;
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    config::save_settings(&Settings::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run_serve(settings_path: Option<PathBuf>) -> Result<()> {
    let settings = config::load_settings(settings_path.as_deref())?;
    let events = EventBus::default();
    let validator = Arc::new(StaticTokenValidator::from_auth(&settings.auth));
    let control = Arc::new(ControlPlane::new(&settings, events, validator));
    let sweepers = control.spawn_sweepers();

    let listener = server::bind(&settings.listen_addr).await?;
    tokio::select! {
        result = server::run_server(listener, control) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    for handle in sweepers {
        handle.abort();
    }
    Ok(())
}

async fn run_simulate(
    scenario_path: &PathBuf,
    ticks: Option<u32>,
    settings_path: Option<PathBuf>,
) -> Result<()> {
    let settings = match settings_path {
        Some(p) => config::load_settings(Some(&p))?,
        None => Settings::default(),
    };
    let scenario = Scenario::load(scenario_path)?;
    if scenario.has_remote_agents() {
        return Err(Error::Config(
            "scenario contains remote agents; run them against a serving control plane".to_string(),
        ));
    }

    let events = EventBus::default();
    let mut engine = scenario.build_engine(&settings.simulation, events)?;
    engine.start(scenario.initial_message())?;

    let limit = ticks.unwrap_or(settings.simulation.tick_budget);
    let auto = engine.mode() == TickMode::Auto;
    let delay = engine.auto_delay();

    let mut ran = 0u32;
    for _ in 0..limit {
        let outcome = engine.advance_tick()?;
        if outcome.completed {
            break;
        }
        ran += 1;
        tracing::info!(
            tick = outcome.tick,
            enqueued = outcome.messages_enqueued,
            "Tick advanced"
        );
        if auto {
            tokio::time::sleep(delay).await;
        }
    }

    println!(
        "Ran {} ticks, final status {:?}, tick index {}",
        ran,
        engine.status(),
        engine.tick_index()
    );
    Ok(())
}
