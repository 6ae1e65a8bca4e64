//! Run configuration – reads `~/.roverlink/config.toml` or `--config <path>`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roverlink_emulator::EmulatorConfig;
use roverlink_perception::DEFAULT_MAX_AGE;
use roverlink_runtime::ListenerConfig;
use roverlink_types::{RoverError, RoverProfile, default_profiles};
use serde::{Deserialize, Serialize};

/// Tuning for the emulator and listener plus per-rover profile overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Emulator cycle period.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Standard deviation of the injected Gaussian noise.  `0` disables it.
    #[serde(default = "default_noise_stddev")]
    pub noise_stddev: f32,

    /// Noise RNG seed; `0` seeds from the OS.
    #[serde(default)]
    pub noise_seed: u64,

    /// Partial scans idle for longer than this are dropped by the listener.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: f64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Directory that relative `data_file` paths are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Entries here replace the built-in profile with the same ID, or add
    /// new rovers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rovers: BTreeMap<String, RoverProfile>,
}

fn default_cycle_interval_ms() -> u64 {
    100
}
fn default_noise_stddev() -> f32 {
    0.5
}
fn default_stale_after_secs() -> f64 {
    2.0
}
fn default_sweep_interval_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            noise_stddev: default_noise_stddev(),
            noise_seed: 0,
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            data_dir: None,
            rovers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Built-in profiles with the `[rovers.<id>]` entries merged over them.
    pub fn profiles(&self) -> BTreeMap<String, RoverProfile> {
        let mut profiles = default_profiles();
        profiles.extend(self.rovers.clone());
        profiles
    }

    /// Look up a rover by ID.
    pub fn profile(&self, rover_id: &str) -> Result<RoverProfile, RoverError> {
        self.profiles()
            .remove(rover_id)
            .ok_or_else(|| RoverError::UnknownRover(rover_id.to_string()))
    }

    /// Resolve a data file path against `data_dir` when it is relative.
    pub fn resolve_data_file(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.data_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn emulator_config(&self, noise_enabled: bool) -> EmulatorConfig {
        EmulatorConfig {
            cycle_interval: Duration::from_millis(self.cycle_interval_ms),
            noise_stddev: (noise_enabled && self.noise_stddev > 0.0).then_some(self.noise_stddev),
            noise_seed: self.noise_seed,
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            stale_after: Duration::try_from_secs_f64(self.stale_after_secs).unwrap_or(DEFAULT_MAX_AGE),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }

    /// Reject values the runtime cannot use.
    pub fn validate(&self) -> Result<(), RoverError> {
        if self.cycle_interval_ms == 0 {
            return Err(RoverError::Config("cycle_interval_ms must be positive".into()));
        }
        if !self.noise_stddev.is_finite() || self.noise_stddev < 0.0 {
            return Err(RoverError::Config(format!(
                "noise_stddev must be a non-negative number, got {}",
                self.noise_stddev
            )));
        }
        if self.stale_after_secs <= 0.0 || Duration::try_from_secs_f64(self.stale_after_secs).is_err() {
            return Err(RoverError::Config(format!(
                "stale_after_secs must be positive, got {}",
                self.stale_after_secs
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(RoverError::Config("sweep_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Return the path to `~/.roverlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roverlink").join("config.toml")
}

/// Load the effective configuration.
///
/// An explicit `path` must exist.  Without one, `~/.roverlink/config.toml`
/// is read if present and defaults are used otherwise.  Environment
/// overrides are applied last, then the result is validated.
pub fn load(path: Option<&Path>) -> Result<Config, RoverError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?
            .ok_or_else(|| RoverError::Config(format!("config file {} not found", p.display())))?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RoverError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `ROVERLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVERLINK_CYCLE_MS` | `cycle_interval_ms` |
/// | `ROVERLINK_NOISE_STDDEV` | `noise_stddev` |
/// | `ROVERLINK_STALE_SECS` | `stale_after_secs` |
/// | `ROVERLINK_DATA_DIR` | `data_dir` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(ms) = lookup("ROVERLINK_CYCLE_MS").and_then(|v| v.parse().ok()) {
        cfg.cycle_interval_ms = ms;
    }
    if let Some(sigma) = lookup("ROVERLINK_NOISE_STDDEV").and_then(|v| v.parse().ok()) {
        cfg.noise_stddev = sigma;
    }
    if let Some(secs) = lookup("ROVERLINK_STALE_SECS").and_then(|v| v.parse().ok()) {
        cfg.stale_after_secs = secs;
    }
    if let Some(dir) = lookup("ROVERLINK_DATA_DIR") {
        cfg.data_dir = Some(PathBuf::from(dir));
    }
}
