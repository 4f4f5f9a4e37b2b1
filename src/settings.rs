use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::vector::Vec3;


/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub job: JobSettings,
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Longest client line accepted, newline excluded.
    pub max_line_bytes: usize,
}

/// Settings that every job worker sees.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JobSettings {
    /// Minimum interval between two "work" progress messages.
    pub progress_interval_ms: u64,
    /// Sleep slice of a paused worker.
    pub pause_poll_ms: u64,
    /// Bins kept on each side of the object extent when cropping.
    pub crop_margin: usize,
    /// Largest accumulation grid a job may allocate.
    pub max_grid_cells: usize,
}

impl JobSettings {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 9000,
                max_line_bytes: 64 << 20,
            },
            job: JobSettings::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: 1000,
            pause_poll_ms: 50,
            crop_margin: 2,
            max_grid_cells: 1 << 23,
        }
    }
}

/// Loads `config/default.toml` alone, without environment or command-line overrides.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("loading default configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("deserializing default configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads the layered configuration: built-in defaults, then the config
/// file, then `RADIOPORTRAIT_*` environment variables, then `args`.
pub fn load_config(args: &CliArgs) -> Result<Settings> {
    let config_file = match retrieve_project_root() {
        Ok(root) => {
            let local_config = root.join("config/local.toml");
            if local_config.exists() {
                Some(local_config)
            } else {
                Some(root.join("config/default.toml"))
            }
        }
        Err(_) => None,
    };

    let mut builder = Config::builder().add_source(
        Config::try_from(&Settings::default()).context("encoding built-in defaults")?,
    );
    if let Some(path) = &config_file {
        builder = builder.add_source(File::from(path.clone()).required(false));
    }
    let settings = builder
        .add_source(
            Environment::with_prefix("RADIOPORTRAIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("deserializing configuration")?;

    args.apply(&mut config);
    validate_config(&config)?;

    tracing::debug!(?config_file, "configuration loaded");
    Ok(config)
}

/// Retrieve the project root directory.
///
/// In order: `CARGO_MANIFEST_DIR`, `RADIOPORTRAIT_ROOT_DIR`, then the
/// nearest ancestor of the executable that contains a `config` directory.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("RADIOPORTRAIT_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("locating the executable")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(PathBuf::from)
        .context("no ancestor of the executable contains a config directory")
}

fn validate_config(config: &Settings) -> Result<()> {
    ensure!(config.server.port > 0, "server port must be non-zero");
    ensure!(
        config.server.max_line_bytes > 0,
        "maximum line length must be greater than 0"
    );
    ensure!(
        config.job.progress_interval_ms > 0,
        "progress interval must be greater than 0"
    );
    ensure!(config.job.pause_poll_ms > 0, "pause poll must be greater than 0");
    ensure!(config.job.max_grid_cells > 0, "grid cell ceiling must be greater than 0");
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "radioportrait - physical-optics radar portraits of triangle meshes")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the portrait server.
    Serve(ServeArgs),
    /// Compute one portrait from a mesh file and exit.
    Solve(SolveArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Minimum interval between progress messages, in milliseconds.
    #[arg(long)]
    pub progress_ms: Option<u64>,

    /// Log filter directive, e.g. `debug` or `radioportrait=trace`.
    #[arg(long)]
    pub log: Option<String>,
}

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Wavefront .obj mesh. Every triangle is treated as visible.
    #[arg(short, long)]
    pub mesh: PathBuf,

    /// Frequency band: 0 = P, 1 = L, 2 = S, 3 = C, 4 = X, 5 = Ka.
    #[arg(short, long, default_value_t = 5)]
    pub band: i64,

    /// Incident direction as `x,y,z`.
    #[arg(
        short,
        long,
        value_parser = parse_direction,
        allow_hyphen_values = true,
        default_value = "0,0,-1"
    )]
    pub direction: Vec3,

    /// Transmit polarization: 0 = vertical, 1 = horizontal.
    #[arg(long, default_value_t = 0)]
    pub tx: i64,

    /// Receive polarization: 0 = vertical, 1 = horizontal.
    #[arg(long, default_value_t = 0)]
    pub rx: i64,

    /// Image the range axis.
    #[arg(long)]
    pub range: bool,

    /// Image the azimuth axis.
    #[arg(long)]
    pub azimuth: bool,

    /// Image the elevation axis.
    #[arg(long)]
    pub elevation: bool,

    /// Add the mirror paths of a reflecting z = 0 plane.
    #[arg(long)]
    pub ground_plane: bool,

    /// Write the result message to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Bins kept on each side of the object extent.
    #[arg(long)]
    pub crop_margin: Option<usize>,
}

impl CliArgs {
    /// Overrides configuration values with the ones given on the command line.
    pub fn apply(&self, config: &mut Settings) {
        match &self.command {
            Command::Serve(args) => {
                if let Some(host) = &args.host {
                    config.server.host = host.clone();
                }
                if let Some(port) = args.port {
                    config.server.port = port;
                }
                if let Some(ms) = args.progress_ms {
                    config.job.progress_interval_ms = ms;
                }
                if let Some(filter) = &args.log {
                    config.log_filter = filter.clone();
                }
            }
            Command::Solve(args) => {
                if let Some(margin) = args.crop_margin {
                    config.job.crop_margin = margin;
                }
            }
        }
    }
}

/// Parse a direction in the format "x,y,z"
fn parse_direction(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("Invalid direction '{}'. Expected 'x,y,z'", s));
    }
    let mut xyz = [0.0; 3];
    for (value, part) in xyz.iter_mut().zip(&parts) {
        *value = part
            .parse::<f64>()
            .map_err(|_| format!("Failed to parse direction component: {}", part))?;
    }
    Ok(Vec3::new(xyz[0], xyz[1], xyz[2]))
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Listen: {}:{}
  - Max Line Length: {} bytes
  - Progress Interval: {} ms
  - Pause Poll: {} ms
  - Crop Margin: {} bins
  - Max Grid Cells: {}
  - Log Filter: {}
  ",
            self.server.host,
            self.server.port,
            self.server.max_line_bytes,
            self.job.progress_interval_ms,
            self.job.pause_poll_ms,
            self.job.crop_margin,
            self.job.max_grid_cells,
            self.log_filter,
        )
    }
}
