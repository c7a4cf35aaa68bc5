use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_INPUT_BYTES, DEFAULT_PBKDF2_ITERATIONS};

/// Top-level configuration (loaded from pixvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PvConfig {
    pub crypto: CryptoConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

/// Container encryption parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iterations (default: 100000)
    pub pbkdf2_iterations: u32,
    /// Plaintext bytes per chunk (default: 10 MiB)
    pub chunk_size: usize,
    /// Inputs above this size are rejected before any work starts
    pub max_input_bytes: u64,
}

/// Chunk dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Offload chunk cipher work to the worker pool
    pub parallel: bool,
    /// Worker count (0 = available parallelism)
    pub workers: usize,
    /// Chunk tasks allowed in flight at once (0 = 2 x workers)
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            workers: 0,
            max_in_flight: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl EngineConfig {
    /// Worker count with `0` resolved to the machine's available parallelism.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// In-flight bound with `0` resolved to twice the worker count.
    pub fn resolved_max_in_flight(&self) -> usize {
        if self.max_in_flight > 0 {
            self.max_in_flight
        } else {
            self.resolved_workers() * 2
        }
    }
}

impl PvConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> crate::PvResult<()> {
        if self.crypto.chunk_size == 0 {
            return Err(crate::PvError::Config("crypto.chunk_size must be > 0".into()));
        }
        if self.crypto.pbkdf2_iterations == 0 {
            return Err(crate::PvError::Config(
                "crypto.pbkdf2_iterations must be > 0".into(),
            ));
        }
        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(crate::PvError::Config(format!(
                "log.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}
