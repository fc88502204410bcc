// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Hierarchical configuration of a job generation run.
//!
//! Settings are gathered from several sources. Where the same setting is
//! supplied more than once the following priority order applies:
//! 1. Command-line interface.
//! 1. Environment variables, prefixed with `GWR_JOBGEN_` (e.g.
//!    `GWR_JOBGEN_TRAFFIC_TYPE=transpose`).
//! 1. A TOML configuration file given with `--conf-file` (or
//!    `GWR_JOBGEN_CONF_FILE`). Partial files are allowed.
//! 1. Default values (see [Settings::default]).
//!
//! All command-line fields are optional so that unset values do not hide
//! those from lower priority sources.
//!
//! The merged [Settings] are then resolved into a [RunConfig], which is where
//! pattern and testbench names are checked and the mesh is validated.

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::builder::PossibleValuesParser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::mesh::{
    DEFAULT_HBM_BASE, DEFAULT_MEM_SIZE, DEFAULT_NUM_X, DEFAULT_NUM_Y, MeshConfig,
};
use crate::testbench::{BurstConfig, Testbench};
use crate::topology::{DEFAULT_SEED, Direction, TrafficPattern};
use crate::types::{JobGenError, JobGenResult};

pub const ENV_PREFIX: &str = "GWR_JOBGEN_";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Accept integers in decimal or `0x`-prefixed hex.
fn parse_u64(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid integer '{value}': {e}"))
}

/// Command-line arguments.
#[derive(Parser, Debug, Default, Serialize)]
#[command(about = "Generate DMA job files for the mesh and chimney testbenches")]
pub struct Cli {
    /// Directory the job files are written to
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Number of narrow bursts issued by each DMA engine
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_narrow_bursts: Option<usize>,

    /// Number of wide bursts issued by each DMA engine
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_wide_bursts: Option<usize>,

    /// Beats per narrow burst
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrow_burst_length: Option<u64>,

    /// Beats per wide burst
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wide_burst_length: Option<u64>,

    /// Generate traffic in both directions between the chimneys
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub bidir: bool,

    /// The testbench to generate jobs for
    #[arg(long, value_parser = PossibleValuesParser::new(Testbench::NAMES))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tb: Option<String>,

    /// The traffic pattern used by the mesh testbench
    #[arg(long, value_parser = PossibleValuesParser::new(TrafficPattern::names()))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_type: Option<String>,

    /// Whether nodes read from or write to their target
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rw: Option<Direction>,

    /// Number of tiles in the x dimension
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_x: Option<usize>,

    /// Number of tiles in the y dimension
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_y: Option<usize>,

    /// Bytes of memory at each tile (power of two)
    #[arg(long, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_size: Option<u64>,

    /// Base address of the HBM channels
    #[arg(long, value_parser = parse_u64)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hbm_base: Option<u64>,

    /// Seed for the random number generator used by `uniform` traffic
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Level of log message to display
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LevelFilter>,

    /// Generate and check all jobs without writing any files
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub dry_run: bool,

    /// Path to additional configuration file
    ///
    /// This additional configuration file must contain TOML, and set values for
    /// any of the other options.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_file: Option<PathBuf>,
}

/// The merged settings from all configuration sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub out_dir: PathBuf,
    pub num_narrow_bursts: usize,
    pub num_wide_bursts: usize,
    pub narrow_burst_length: u64,
    pub wide_burst_length: u64,
    pub bidir: bool,
    pub tb: String,
    pub traffic_type: String,
    pub rw: Direction,
    pub num_x: usize,
    pub num_y: usize,
    pub mem_size: u64,
    pub hbm_base: u64,
    pub seed: u64,
    pub log_level: LevelFilter,
    pub dry_run: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let bursts = BurstConfig::default();
        Self {
            out_dir: PathBuf::from("test/jobs"),
            num_narrow_bursts: bursts.num_narrow_bursts,
            num_wide_bursts: bursts.num_wide_bursts,
            narrow_burst_length: bursts.narrow_burst_length,
            wide_burst_length: bursts.wide_burst_length,
            bidir: false,
            tb: Testbench::DmaMesh.name().to_string(),
            traffic_type: TrafficPattern::Uniform.name().to_string(),
            rw: Direction::Read,
            num_x: DEFAULT_NUM_X,
            num_y: DEFAULT_NUM_Y,
            mem_size: DEFAULT_MEM_SIZE,
            hbm_base: DEFAULT_HBM_BASE,
            seed: DEFAULT_SEED,
            log_level: LevelFilter::Info,
            dry_run: false,
            conf_file: None,
        }
    }
}

impl Settings {
    /// Parse the command line and merge it with all other sources.
    pub fn parse_all_sources() -> JobGenResult<Settings> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> JobGenResult<Settings> {
        Self::from_cli_with_env_prefix(cli, ENV_PREFIX)
    }

    /// Merge the sources, reading environment variables with the given prefix.
    pub fn from_cli_with_env_prefix(cli: Cli, env_prefix: &str) -> JobGenResult<Settings> {
        let conf_file = cli.conf_file.clone().or_else(|| {
            env::var_os(format!("{env_prefix}CONF_FILE")).map(PathBuf::from)
        });

        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(conf_file) = &conf_file {
            figment = figment_conf_file_merge(figment, conf_file)?;
        }
        figment
            .merge(Env::prefixed(env_prefix))
            .merge(Serialized::defaults(cli))
            .extract()
            .map_err(|e| JobGenError::InvalidConfig(e.to_string()))
    }

    /// Check the settings and turn them into the configuration of a run.
    pub fn resolve(&self) -> JobGenResult<RunConfig> {
        Ok(RunConfig {
            testbench: self.tb.parse()?,
            pattern: self.traffic_type.parse()?,
            direction: self.rw,
            bidir: self.bidir,
            mesh: MeshConfig::new(self.num_x, self.num_y, self.mem_size, self.hbm_base)?,
            bursts: BurstConfig {
                narrow_burst_length: self.narrow_burst_length,
                wide_burst_length: self.wide_burst_length,
                num_narrow_bursts: self.num_narrow_bursts,
                num_wide_bursts: self.num_wide_bursts,
            },
            seed: self.seed,
            out_dir: self.out_dir.clone(),
            dry_run: self.dry_run,
        })
    }
}

fn figment_conf_file_merge(figment: Figment, conf_file: &Path) -> JobGenResult<Figment> {
    // Figment silently skips missing files, but one that was asked for must exist
    if !conf_file.is_file() {
        return Err(JobGenError::InvalidConfig(format!(
            "configuration file {} not found",
            conf_file.display()
        )));
    }
    Ok(figment.merge(Toml::file(conf_file)))
}

/// Everything needed to generate and emit the jobs of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub testbench: Testbench,
    pub pattern: TrafficPattern,
    pub direction: Direction,
    pub bidir: bool,
    pub mesh: MeshConfig,
    pub bursts: BurstConfig,
    pub seed: u64,
    pub out_dir: PathBuf,
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            testbench: Testbench::DmaMesh,
            pattern: TrafficPattern::Uniform,
            direction: Direction::Read,
            bidir: false,
            mesh: MeshConfig::default(),
            bursts: BurstConfig::default(),
            seed: DEFAULT_SEED,
            out_dir: PathBuf::from("test/jobs"),
            dry_run: false,
        }
    }
}
