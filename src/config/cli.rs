use crate::config::toml_config::EtlConfig;
use crate::utils::error::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "geo-etl.toml";

#[derive(Debug, Clone, Default, Parser)]
#[command(version)]
#[command(about = "Geocoding ETL for environmental-damage case spreadsheets")]
pub struct CliConfig {
    /// TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Input CSV, overrides `input.path`
    #[arg(long, short)]
    pub input: Option<String>,

    /// Output directory, overrides `load.output_path`
    #[arg(long, short)]
    pub output: Option<String>,

    /// Parallel workers, overrides `pipeline.workers`
    #[arg(long, short)]
    pub workers: Option<usize>,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Validate configuration and input, then stop")]
    pub dry_run: bool,
}

impl CliConfig {
    /// Loads the configuration file (if any) and applies the flags on top.
    pub fn load(&self) -> Result<EtlConfig> {
        let mut config = match &self.config {
            Some(path) => EtlConfig::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                EtlConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => EtlConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    pub fn apply_to(&self, config: &mut EtlConfig) {
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if let Some(output) = &self.output {
            config.load.output_path = output.clone();
        }
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        config.logging.verbose |= self.verbose;
        config.logging.json |= self.json_logs;
    }
}
