use crate::config::{OutputFormat, SimulationConfig};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Virtual surface drifter (FAD) simulations over daily ocean currents.
///
/// Without arguments the whole-Pacific run is executed with its built-in settings.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// TOML file overriding any of the built-in settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root directory holding the MOi and NEMO-MEDUSA input data
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Trajectory output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Simulated run length in days
    #[arg(long)]
    pub runtime_days: Option<f64>,

    /// Worker threads for the particle kernels (defaults to all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Log level or RUST_LOG-style filter (e.g. debug, fad_drift::field=trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Built-in settings, then the config file, then command-line flags.
    pub fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_file(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(root) = &self.data_root {
            config.fieldset.data_root = root.clone();
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(days) = self.runtime_days {
            config.run.runtime_days = days;
        }
        if let Some(threads) = self.threads {
            config.run.threads = Some(threads);
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn get_args() -> Args {
    Args::parse()
}
