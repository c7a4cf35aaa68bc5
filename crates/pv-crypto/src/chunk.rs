//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Sealed chunk format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! nonce = base_nonce with bytes 8..12 replaced by (BE u32 of those bytes) + chunk_index
//! AAD   = chunk_index (4 bytes, big-endian) || chunk_count (4 bytes, big-endian)
//! ```
//!
//! Nonces are never stored per chunk: every chunk of a container derives its
//! own nonce from the container's base nonce and its index, so no two chunks
//! under one key share a nonce. The AAD binds each chunk to its position and
//! to the total count, so reordered, dropped, or appended chunks fail to
//! authenticate.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use pv_core::{PvError, PvResult};

use crate::keys::ContainerKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Where a chunk sits in its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    /// Zero-based chunk index
    pub index: u32,
    /// Number of chunks in the container
    pub count: u32,
}

impl ChunkPosition {
    pub fn new(index: u32, count: u32) -> Self {
        Self { index, count }
    }

    /// AAD: index (4 bytes BE) || count (4 bytes BE)
    fn aad(&self) -> [u8; 8] {
        let mut aad = [0u8; 8];
        aad[..4].copy_from_slice(&self.index.to_be_bytes());
        aad[4..].copy_from_slice(&self.count.to_be_bytes());
        aad
    }
}

/// Derive the nonce for chunk `index` from the container's base nonce.
///
/// The trailing 4 bytes are a big-endian counter advanced (wrapping) by the
/// chunk index; the leading 8 bytes are kept as-is.
pub fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    let counter = u32::from_be_bytes([base[8], base[9], base[10], base[11]]).wrapping_add(index);
    nonce[8..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Encrypt a single chunk with AES-256-GCM.
///
/// Returns: `[ciphertext][16-byte tag]` (plaintext length + 16)
pub fn encrypt_chunk(
    key: &ContainerKey,
    base_nonce: &[u8; NONCE_SIZE],
    position: ChunkPosition,
    plaintext: &[u8],
) -> PvResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce_bytes = chunk_nonce(base_nonce, position.index);
    let aad = position.aad();

    cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| PvError::Validation(format!("chunk {} encryption failed: {e}", position.index)))
}

/// Decrypt and verify a single sealed chunk.
///
/// Any tag mismatch (wrong key, flipped bit, wrong position) is reported as
/// [`PvError::Authentication`] with no further detail.
pub fn decrypt_chunk(
    key: &ContainerKey,
    base_nonce: &[u8; NONCE_SIZE],
    position: ChunkPosition,
    sealed: &[u8],
) -> PvResult<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(PvError::Format(format!(
            "sealed chunk {} too short: {} bytes (minimum {TAG_SIZE})",
            position.index,
            sealed.len()
        )));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce_bytes = chunk_nonce(base_nonce, position.index);
    let aad = position.aad();

    cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: sealed,
                aad: &aad,
            },
        )
        .map_err(|_| PvError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_random_key;
    use proptest::prelude::*;

    const BASE: [u8; NONCE_SIZE] = [0x11; NONCE_SIZE];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_random_key();
        let plaintext = b"hello, encrypted world!";
        let pos = ChunkPosition::new(0, 1);

        let sealed = encrypt_chunk(&key, &BASE, pos, plaintext).unwrap();
        let opened = decrypt_chunk(&key, &BASE, pos, &sealed).unwrap();

        assert_eq!(&opened, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_random_key();
        let pos = ChunkPosition::new(0, 1);

        let sealed = encrypt_chunk(&key, &BASE, pos, b"").unwrap();
        assert_eq!(sealed.len(), TAG_SIZE);
        let opened = decrypt_chunk(&key, &BASE, pos, &sealed).unwrap();

        assert_eq!(opened, b"");
    }

    #[test]
    fn test_sealed_size() {
        let key = generate_random_key();
        let sealed = encrypt_chunk(&key, &BASE, ChunkPosition::new(0, 1), &[0u8; 1000]).unwrap();

        // plaintext (1000) + tag (16) = 1016
        assert_eq!(sealed.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let key1 = generate_random_key();
        let key2 = generate_random_key();
        let pos = ChunkPosition::new(0, 1);

        let sealed = encrypt_chunk(&key1, &BASE, pos, b"secret data").unwrap();
        let result = decrypt_chunk(&key2, &BASE, pos, &sealed);

        assert!(matches!(result, Err(PvError::Authentication)));
    }

    #[test]
    fn test_decrypt_wrong_index() {
        let key = generate_random_key();

        let sealed = encrypt_chunk(&key, &BASE, ChunkPosition::new(0, 2), b"secret data").unwrap();
        let result = decrypt_chunk(&key, &BASE, ChunkPosition::new(1, 2), &sealed);

        assert!(
            matches!(result, Err(PvError::Authentication)),
            "wrong chunk index must fail (nonce and AAD mismatch)"
        );
    }

    #[test]
    fn test_decrypt_wrong_count() {
        let key = generate_random_key();

        let sealed = encrypt_chunk(&key, &BASE, ChunkPosition::new(0, 3), b"secret data").unwrap();
        let result = decrypt_chunk(&key, &BASE, ChunkPosition::new(0, 2), &sealed);

        assert!(
            matches!(result, Err(PvError::Authentication)),
            "truncated container must fail (AAD mismatch)"
        );
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = generate_random_key();
        let pos = ChunkPosition::new(0, 1);

        let mut sealed = encrypt_chunk(&key, &BASE, pos, b"secret data").unwrap();
        sealed[3] ^= 0x01;

        let result = decrypt_chunk(&key, &BASE, pos, &sealed);
        assert!(matches!(result, Err(PvError::Authentication)), "tampered ciphertext must fail");
    }

    #[test]
    fn test_short_sealed_chunk_is_format_error() {
        let key = generate_random_key();
        let result = decrypt_chunk(&key, &BASE, ChunkPosition::new(0, 1), &[0u8; 15]);
        assert!(matches!(result, Err(PvError::Format(_))));
    }

    #[test]
    fn test_chunk_nonces_are_distinct() {
        let nonces: std::collections::HashSet<_> = (0..1000).map(|i| chunk_nonce(&BASE, i)).collect();
        assert_eq!(nonces.len(), 1000);
        assert_eq!(chunk_nonce(&BASE, 0), BASE, "chunk 0 uses the base nonce");
    }

    #[test]
    fn test_chunk_nonce_counter_is_big_endian_and_wraps() {
        let mut base = [0u8; NONCE_SIZE];
        base[8..].copy_from_slice(&0xFFFF_FFFEu32.to_be_bytes());

        let n1 = chunk_nonce(&base, 1);
        assert_eq!(&n1[8..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        let n2 = chunk_nonce(&base, 2);
        assert_eq!(&n2[8..], &[0, 0, 0, 0]);
        assert_eq!(&n2[..8], &base[..8], "prefix is untouched");
    }

    #[test]
    fn test_same_plaintext_different_chunks_differ() {
        let key = generate_random_key();
        let a = encrypt_chunk(&key, &BASE, ChunkPosition::new(0, 2), b"same bytes").unwrap();
        let b = encrypt_chunk(&key, &BASE, ChunkPosition::new(1, 2), b"same bytes").unwrap();
        assert_ne!(a, b, "distinct nonces must yield distinct ciphertexts");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn seal_open_at_any_position(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            base in any::<[u8; NONCE_SIZE]>(),
            (count, index) in (1u32..=u32::MAX).prop_flat_map(|c| (Just(c), 0..c)),
        ) {
            let key = generate_random_key();
            let pos = ChunkPosition::new(index, count);

            let sealed = encrypt_chunk(&key, &base, pos, &plaintext).unwrap();
            prop_assert_eq!(sealed.len(), plaintext.len() + TAG_SIZE);
            prop_assert_eq!(decrypt_chunk(&key, &base, pos, &sealed).unwrap(), plaintext);

            // Same bytes claimed at another position must not open
            let moved = ChunkPosition::new(index.wrapping_add(1) % count.max(2), count.max(2));
            if moved != pos {
                prop_assert!(matches!(
                    decrypt_chunk(&key, &base, moved, &sealed),
                    Err(PvError::Authentication)
                ));
            }
        }

        #[test]
        fn distinct_indices_get_distinct_nonces(
            base in any::<[u8; NONCE_SIZE]>(),
            a in any::<u32>(),
            b in any::<u32>(),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(chunk_nonce(&base, a), chunk_nonce(&base, b));
            prop_assert_eq!(&chunk_nonce(&base, a)[..8], &base[..8]);
        }
    }
}
