//! Key derivation: PBKDF2-HMAC-SHA256 password → container key

use hmac::Hmac;
use pbkdf2::pbkdf2;
use pv_core::{PvError, PvResult, DEFAULT_PBKDF2_ITERATIONS};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::keys::ContainerKey;
use crate::{KEY_SIZE, SALT_SIZE};

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// HMAC-SHA256 rounds (default: 100000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// Deterministic for a given (password, salt, iterations). The salt is
/// stored in the container header; the derived key never is.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> PvResult<ContainerKey> {
    if password.expose_secret().is_empty() {
        return Err(PvError::KeyDerivation("password must not be empty".into()));
    }
    if params.iterations == 0 {
        return Err(PvError::KeyDerivation(
            "PBKDF2 iterations must be >= 1".into(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::<Hmac<Sha256>>(
        password.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    )
    .map_err(|e| PvError::KeyDerivation(format!("PBKDF2 failed: {e}")))?;

    Ok(ContainerKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Use fast params for testing
    fn fast() -> KdfParams {
        KdfParams { iterations: 10 }
    }

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("test-password-123");
        let salt = [1u8; 16];

        let key1 = derive_key(&password, &salt, &fast()).unwrap();
        let key2 = derive_key(&password, &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let salt = [1u8; 16];

        let key1 = derive_key(&SecretString::from("password-a"), &salt, &fast()).unwrap();
        let key2 = derive_key(&SecretString::from("password-b"), &salt, &fast()).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different passwords must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_salts() {
        let password = SecretString::from("same-password");

        let key1 = derive_key(&password, &[1u8; 16], &fast()).unwrap();
        let key2 = derive_key(&password, &[2u8; 16], &fast()).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_kdf_iteration_count_matters() {
        assert_eq!(KdfParams::default().iterations, 100_000);

        let password = SecretString::from("passwd");
        let salt = [7u8; 16];
        let a = derive_key(&password, &salt, &KdfParams { iterations: 1 }).unwrap();
        let b = derive_key(&password, &salt, &KdfParams { iterations: 2 }).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_kdf_rejects_empty_password() {
        let result = derive_key(&SecretString::from(""), &[0u8; 16], &fast());
        assert!(matches!(result, Err(PvError::KeyDerivation(_))));
    }

    #[test]
    fn test_kdf_rejects_zero_iterations() {
        let result = derive_key(
            &SecretString::from("pw"),
            &[0u8; 16],
            &KdfParams { iterations: 0 },
        );
        assert!(matches!(result, Err(PvError::KeyDerivation(_))));
    }
}
