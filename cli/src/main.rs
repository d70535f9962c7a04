//! Command-line driver for inflation lattice runs
//!
//! Usage:
//!   `inflation-lattice run <config.json> [--out DIR]`
//!   `inflation-lattice check <config.json>`
//!
//! The config file holds the run configuration under `run` and the
//! zero-mode model parameters under `model`.

use clap::{Parser, Subcommand};
use inflation_lattice_core_rs::{
    CsvExporter, Driver, JsonCheckpointSink, RunConfig, RunReport, SimulationState,
    ZeroModeEngine, ZeroModeParams,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "inflation-lattice")]
#[command(about = "Run homogeneous, linear and lattice evolution over an ensemble")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulation
    Run {
        /// Path to the JSON config file
        config: PathBuf,

        /// Output directory for checkpoints and CSV tables
        #[arg(long = "out", default_value = "output")]
        out: PathBuf,
    },

    /// Validate a config file and print its fingerprint
    Check {
        /// Path to the JSON config file
        config: PathBuf,
    },
}

/// On-disk config file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    run: RunConfig,
    model: ZeroModeParams,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,inflation_lattice_core_rs=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load(path: &Path) -> Result<ConfigFile, String> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let file: ConfigFile = serde_json::from_str(&json)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    file.run
        .validate()
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(file)
}

fn run(file: ConfigFile, out: &Path) -> Result<RunReport, String> {
    let fingerprint = file.run.fingerprint().map_err(|e| e.to_string())?;
    let engine = ZeroModeEngine::new(file.model).map_err(|e| e.to_string())?;
    let sink = JsonCheckpointSink::new(out, fingerprint);
    let exporter = CsvExporter::new(out);

    let mut state = SimulationState::new(&file.run.initial);
    let mut driver = Driver::new(file.run, Box::new(engine), Box::new(sink))
        .map_err(|e| e.to_string())?
        .with_exporter(Box::new(exporter));

    driver.run(&mut state).map_err(|e| e.to_string())
}

fn main() {
    init_logging();

    let args = Args::parse();

    match args.command {
        Command::Check { config } => {
            let file = match load(&config) {
                Ok(file) => file,
                Err(e) => {
                    error!("{}", e);
                    process::exit(1);
                }
            };
            match file.run.fingerprint() {
                Ok(hash) => println!("{}", hash),
                Err(e) => {
                    error!("Failed to fingerprint config: {}", e);
                    process::exit(1);
                }
            }
        }
        Command::Run { config, out } => {
            let file = match load(&config) {
                Ok(file) => file,
                Err(e) => {
                    error!("{}", e);
                    process::exit(1);
                }
            };

            info!("Config: {}", config.display());
            info!("Output: {}", out.display());

            let report = match run(file, &out) {
                Ok(report) => report,
                Err(e) => {
                    error!("Run failed: {}", e);
                    process::exit(1);
                }
            };

            let failed = report.members.iter().filter(|m| !m.is_completed()).count();
            if failed > 0 {
                warn!("{} of {} run(s) failed", failed, report.members.len());
            }

            println!("fingerprint      {}", report.config_fingerprint);
            println!("runs             {}", report.members.len());
            println!("steps            {}", report.tally.total());
            println!("  homogeneous    {}", report.tally.homogeneous);
            println!("  linear         {}", report.tally.linear);
            println!("  non-linear     {}", report.tally.nonlinear);
            println!("elapsed          {:.3} s", report.timing.elapsed.as_secs_f64());
            if let Some(per_step) = report.timing.seconds_per_step {
                println!("per step         {:.3e} s", per_step);
            }
        }
    }
}
