//! Configuration for the minting pipeline.

use std::path::{Path, PathBuf};

use bitcoin::Network;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default value for `datadir` in [`Config`].
const DEFAULT_DATADIR: &str = "batchmint-data";

/// Default flat fee rate (sat/vB) passed to the prover.
const DEFAULT_FEE_RATE: u64 = 1;

/// Default delay before advancing past a completed output, in ms.
const DEFAULT_SUCCESS_ADVANCE_DELAY: u64 = 1_000;

/// Default delay before advancing past a failed output, in ms.
const DEFAULT_FAILURE_ADVANCE_DELAY: u64 = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which Bitcoin network the run targets.
    pub network: Network,

    /// The data directory where the progress database resides.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    pub bitcoind: BitcoindConfig,

    pub prover: ProverConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    /// Bitcoind JSON-RPC endpoint.
    pub rpc_url: String,

    pub rpc_user: String,

    pub rpc_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    /// Proving service endpoint; payloads are POSTed here.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Flat fee rate (sat/vB) put in every prover request.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,

    /// Delay before advancing past a completed output, in ms.
    #[serde(default = "default_success_advance_delay")]
    pub success_advance_delay_ms: u64,

    /// Delay before advancing past a failed output, in ms.
    #[serde(default = "default_failure_advance_delay")]
    pub failure_advance_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            success_advance_delay_ms: DEFAULT_SUCCESS_ADVANCE_DELAY,
            failure_advance_delay_ms: DEFAULT_FAILURE_ADVANCE_DELAY,
        }
    }
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_fee_rate() -> u64 {
    DEFAULT_FEE_RATE
}

fn default_success_advance_delay() -> u64 {
    DEFAULT_SUCCESS_ADVANCE_DELAY
}

fn default_failure_advance_delay() -> u64 {
    DEFAULT_FAILURE_ADVANCE_DELAY
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
