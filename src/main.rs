use clap::Parser;
use disagg_sim::report::Report;
use disagg_sim::simulator::{load_config, Simulator};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "disagg-sim", about = "Discrete-time simulator of a disaggregated inference serving fleet")]
struct Cli {
    /// Path to a YAML or JSON fleet configuration.
    config: String,

    /// Override the configured max_time.
    #[arg(long)]
    max_time: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), disagg_sim::error::SimError> {
    let mut config = load_config(&cli.config)?;
    if let Some(max_time) = cli.max_time {
        config.max_time = max_time;
    }

    let mut sim = Simulator::new(config)?;
    sim.run()?;

    let report = Report::from_jobs(sim.now(), &sim.finished);
    let json = serde_json::to_string_pretty(&report).map_err(|e| disagg_sim::error::SimError::Config(e.to_string()))?;
    println!("{json}");
    Ok(())
}
