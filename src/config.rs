//! Simulation settings loaded from TOML, with defaults and validation.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::NetError;
use crate::fidelity::PurificationScheme;
use crate::resource::FailedPairScope;
use crate::topology::{HostId, TopologySpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("configuration invalid: {0}")]
    Validation(String),
}

impl From<ConfigError> for NetError {
    fn from(err: ConfigError) -> Self {
        NetError::Config(err.to_string())
    }
}

/// Closed interval a value is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min) || !(0.0..=1.0).contains(&self.max) {
            return Err(ConfigError::Validation(format!(
                "{name} bounds must lie in [0, 1], got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(ConfigError::Validation(format!(
                "{name} min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Bootstrap and policy parameters of a simulated network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimConfig {
    #[serde(default = "default_qubits_per_host")]
    pub qubits_per_host: usize,
    #[serde(default = "default_pairs_per_channel")]
    pub pairs_per_channel: usize,
    /// Multiplier applied to every held fidelity on each timeslot.
    #[serde(default = "default_decoherence_factor")]
    pub decoherence_factor: f64,
    #[serde(default = "default_unit_range")]
    pub qubit_fidelity: Range,
    /// Range the on-demand and replay probabilities of each channel are
    /// drawn from.
    #[serde(default = "default_unit_range")]
    pub channel_probability: Range,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub failed_pair_scope: FailedPairScope,
    #[serde(default)]
    pub swap_formula: PurificationScheme,
}

const fn default_qubits_per_host() -> usize {
    10
}

const fn default_pairs_per_channel() -> usize {
    10
}

const fn default_decoherence_factor() -> f64 {
    0.9
}

const fn default_unit_range() -> Range {
    Range::new(0.2, 1.0)
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            qubits_per_host: default_qubits_per_host(),
            pairs_per_channel: default_pairs_per_channel(),
            decoherence_factor: default_decoherence_factor(),
            qubit_fidelity: default_unit_range(),
            channel_probability: default_unit_range(),
            seed: None,
            failed_pair_scope: FailedPairScope::default(),
            swap_formula: PurificationScheme::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decoherence_factor > 0.0 && self.decoherence_factor <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "decoherence factor must lie in (0, 1], got {}",
                self.decoherence_factor
            )));
        }
        self.qubit_fidelity.validate("qubit fidelity")?;
        self.channel_probability.validate("channel probability")?;
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SimConfig =
            toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// `[topology]` table of a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum TopologySection {
    Line { hosts: usize },
    Ring { hosts: usize },
    Grid { rows: usize, cols: usize },
    Edges { edges: Vec<(HostId, HostId)> },
}

impl From<TopologySection> for TopologySpec {
    fn from(section: TopologySection) -> Self {
        match section {
            TopologySection::Line { hosts } => TopologySpec::Line { hosts },
            TopologySection::Ring { hosts } => TopologySpec::Ring { hosts },
            TopologySection::Grid { rows, cols } => TopologySpec::Grid { rows, cols },
            TopologySection::Edges { edges } => TopologySpec::Edges(edges),
        }
    }
}

/// Full config file: simulation parameters plus an optional topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub simulation: SimConfig,
    #[serde(default)]
    pub topology: Option<TopologySection>,
}

impl ConfigFile {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        file.simulation.validate()?;
        Ok(file)
    }
}

pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::from_toml_str(&contents)
}
