pub mod config;
pub mod error;

pub use error::{PvError, PvResult};

/// Plaintext bytes per full chunk (10 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// PBKDF2-HMAC-SHA256 iteration count for password-derived keys
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Largest plaintext accepted by the engine unless overridden in config (2 GiB)
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 2 * 1024 * 1024 * 1024;
