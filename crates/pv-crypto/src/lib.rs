//! pv-crypto: the pixvault container format
//!
//! Architecture: Chunk-then-Encrypt with AES-256-GCM
//!
//! Pipeline: plaintext → fixed-size chunk → encrypt (per-chunk nonce) → concatenate → append metadata
//!
//! Container layout:
//! ```text
//! [16 bytes: salt][12 bytes: base nonce][sealed chunks ...][metadata JSON][4 bytes: metadata length, BE]
//! ```
//!
//! Key provenance:
//! ```text
//! Password → PBKDF2-HMAC-SHA256 (100k iterations, salt) → 256-bit key   (never stored)
//! No password → random 256-bit key, embedded in metadata              (self-decrypting)
//! ```
//!
//! Chunk `i` is sealed under the base nonce with its last 4 bytes advanced by
//! `i` (big-endian counter), with AAD = `i || chunk_count`.

pub mod chunk;
pub mod container;
pub mod kdf;
pub mod keys;
pub mod metadata;

pub use chunk::{chunk_nonce, decrypt_chunk, encrypt_chunk, ChunkPosition};
pub use container::{build_container, parse_container, prepare_key, split_ciphertext, ParsedContainer};
pub use kdf::{derive_key, KdfParams};
pub use keys::{
    export_key, generate_nonce, generate_random_key, generate_salt, import_key, ContainerKey,
};
pub use metadata::{Metadata, SecurityTier};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of the PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Container format version written into metadata
pub const FORMAT_VERSION: &str = "1";
