//! Benchmark configuration file.

use crate::rate_limiter::RateLimitConfig;
use crate::report::field;
use memobench_types::COMPUTE_UNIT_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub use solana_sdk::native_token::LAMPORTS_PER_SOL;

/// Base fee per signature, in lamports.
pub const BASE_FEE_LAMPORTS: u64 = 5_000;

/// Errors loading or validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result of [`BenchConfig::load`].
#[derive(Debug)]
pub enum ConfigOutcome {
    /// An existing file was read.
    Loaded(BenchConfig),
    /// No file existed; a default template was written to this path.
    Created(PathBuf),
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Base58-encoded 64-byte keypair of the paying wallet.
    pub private_key: String,

    /// HTTP JSON-RPC endpoint for reads.
    pub rpc_url: String,

    /// WebSocket endpoint; derived from `rpc_url` when empty.
    pub ws_url: String,

    /// Endpoint transactions are sent to; `rpc_url` when empty.
    pub send_rpc_url: String,

    /// Transactions per second.
    pub rate_limit: u64,

    /// Rate limiter burst; `rate_limit` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u64>,

    /// Number of transactions to send.
    pub tx_count: u64,

    /// Priority fee in lamports per compute unit.
    pub prio_fee: f64,

    /// `maxRetries` for `sendTransaction`.
    pub node_retries: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            rpc_url: "http://node.foo.cc".to_string(),
            ws_url: String::new(),
            send_rpc_url: String::new(),
            rate_limit: 200,
            burst: None,
            tx_count: 100,
            prio_fee: 0.0,
            node_retries: 0,
        }
    }
}

impl BenchConfig {
    /// Read the config at `path`, or write the default template there if it
    /// does not exist.
    pub fn load(path: &Path) -> Result<ConfigOutcome, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::default().save(path)?;
                info!(path = %path.display(), "Config file saved, edit the config and restart");
                return Ok(ConfigOutcome::Created(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(ConfigOutcome::Loaded(config))
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the benchmark cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.trim().is_empty() {
            return Err(ConfigError::Invalid("private_key is empty".into()));
        }
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc_url is empty".into()));
        }
        if self.tx_count == 0 {
            return Err(ConfigError::Invalid("tx_count must be at least 1".into()));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid("rate_limit must be at least 1".into()));
        }
        if self.burst == Some(0) {
            return Err(ConfigError::Invalid("burst must be at least 1".into()));
        }
        if !self.prio_fee.is_finite() || self.prio_fee < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "prio_fee must be a non-negative number, got {}",
                self.prio_fee
            )));
        }
        Ok(())
    }

    /// WebSocket URL, derived from the RPC URL when not set.
    pub fn ws_url(&self) -> String {
        if !self.ws_url.is_empty() {
            return self.ws_url.clone();
        }
        self.rpc_url
            .replace("https://", "wss://")
            .replace("http://", "ws://")
    }

    /// URL transactions are submitted to.
    pub fn send_url(&self) -> &str {
        if self.send_rpc_url.is_empty() {
            &self.rpc_url
        } else {
            &self.send_rpc_url
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let clamp = |v: u64| v.min(u32::MAX as u64) as u32;
        let rate = clamp(self.rate_limit);
        RateLimitConfig::new(rate, self.burst.map(clamp).unwrap_or(rate))
    }

    /// Worst-case cost of one transaction in lamports.
    pub fn cost_per_tx(&self) -> u64 {
        (self.prio_fee * COMPUTE_UNIT_LIMIT as f64) as u64 + BASE_FEE_LAMPORTS
    }

    /// Settings echoed in the run log.
    pub fn echo_lines(&self) -> Vec<String> {
        let mut lines = vec![
            field("RPC URL", &self.rpc_url),
            field("WS URL", self.ws_url()),
            field("RPC Send URL", self.send_url()),
            field("Transaction Count", self.tx_count),
            field("Rate Limit", self.rate_limit),
        ];
        if let Some(burst) = self.burst {
            lines.push(field("Burst", burst));
        }
        lines.push(field(
            "Priority Fee/CU",
            format!(
                "{:.6} Lamports ({:.9} SOL)",
                self.prio_fee,
                self.cost_per_tx() as f64 / LAMPORTS_PER_SOL as f64
            ),
        ));
        lines.push(field("Node Retries", self.node_retries));
        lines
    }
}
