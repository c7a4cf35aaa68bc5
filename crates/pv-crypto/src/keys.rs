//! Key material: container keys, salts, nonces, raw key export/import

use pv_core::{PvError, PvResult};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};

/// A 256-bit container encryption key. Zeroized on drop.
///
/// Either derived from a password (see [`crate::kdf::derive_key`]) or
/// generated at random for password-less containers.
#[derive(Clone)]
pub struct ContainerKey {
    bytes: [u8; KEY_SIZE],
}

impl ContainerKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContainerKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 16-byte PBKDF2 salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate random 12-byte base nonce material for a container.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Generate a random 256-bit key for a password-less container.
pub fn generate_random_key() -> ContainerKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ContainerKey::from_bytes(bytes)
}

/// Export a key as raw bytes. The copy is zeroized when dropped.
pub fn export_key(key: &ContainerKey) -> Zeroizing<[u8; KEY_SIZE]> {
    Zeroizing::new(*key.as_bytes())
}

/// Import a key from raw bytes; anything other than 32 bytes is rejected.
pub fn import_key(raw: &[u8]) -> PvResult<ContainerKey> {
    let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
        PvError::MalformedMetadata(format!(
            "embedded key has wrong size: {} bytes (expected {KEY_SIZE})",
            raw.len()
        ))
    })?;
    Ok(ContainerKey::from_bytes(bytes))
}
