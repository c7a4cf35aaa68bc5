use thiserror::Error;

pub type PvResult<T> = Result<T, PvError>;

#[derive(Debug, Error)]
pub enum PvError {
    /// Absent or oversized input
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed container structure
    #[error("invalid container format: {0}")]
    Format(String),

    #[error("container is password-protected but no password was supplied")]
    MissingPassword,

    /// Password-less container without a usable embedded key
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// AEAD tag mismatch. Deliberately carries no detail: a wrong password
    /// and tampered ciphertext must be indistinguishable to the caller.
    #[error("authentication failed: wrong password or corrupted data")]
    Authentication,

    #[error("payload of {needed} bytes exceeds image capacity of {capacity} bytes")]
    Capacity { needed: usize, capacity: usize },

    /// Stego header declares an implausible payload length
    #[error("no valid hidden payload: {0}")]
    Corruption(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Worker pool failure (worker gone, task panicked)
    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
