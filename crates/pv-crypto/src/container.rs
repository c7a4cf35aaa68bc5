//! Container assembly and parsing
//!
//! ```text
//! offset 0        : salt[16]
//! offset 16       : base nonce[12]
//! offset 28       : sealed chunks, concatenated in index order
//! offset N-4-M    : metadata JSON, M bytes
//! offset N-4      : M as u32 big-endian
//! ```
//!
//! Chunks carry no length markers. Every chunk but the last seals exactly
//! `chunk_size` plaintext bytes, so chunk boundaries follow from the region
//! length, the chunk size, and the chunk count recorded in the metadata.

use pv_core::{PvError, PvResult};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::ContainerKey;
use crate::metadata::Metadata;
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Salt + base nonce
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// Metadata length trailer
pub const TRAILER_SIZE: usize = 4;

/// Smallest byte count a well-formed container can have
pub const MIN_CONTAINER_SIZE: usize = 32 + TRAILER_SIZE;

/// A container split into its parts. Borrows the ciphertext region from the input.
#[derive(Debug)]
pub struct ParsedContainer<'a> {
    pub salt: [u8; SALT_SIZE],
    pub nonce_material: [u8; NONCE_SIZE],
    pub ciphertext_region: &'a [u8],
    pub metadata: Metadata,
}

/// Concatenate header, sealed chunks (in the given order) and metadata.
pub fn build_container<C: AsRef<[u8]>>(
    salt: &[u8; SALT_SIZE],
    nonce_material: &[u8; NONCE_SIZE],
    chunks: &[C],
    metadata: &Metadata,
) -> PvResult<Vec<u8>> {
    let meta_bytes = metadata.to_bytes()?;
    let meta_len = u32::try_from(meta_bytes.len())
        .map_err(|_| PvError::Validation("metadata record exceeds 4 GiB".into()))?;

    let body: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(HEADER_SIZE + body + meta_bytes.len() + TRAILER_SIZE);
    out.extend_from_slice(salt);
    out.extend_from_slice(nonce_material);
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out.extend_from_slice(&meta_bytes);
    out.extend_from_slice(&meta_len.to_be_bytes());

    debug!(
        chunks = chunks.len(),
        ciphertext = body,
        metadata = meta_bytes.len(),
        total = out.len(),
        "container built"
    );
    Ok(out)
}

/// Split container bytes into header, ciphertext region and metadata.
pub fn parse_container(bytes: &[u8]) -> PvResult<ParsedContainer<'_>> {
    if bytes.len() < MIN_CONTAINER_SIZE {
        return Err(PvError::Format(format!(
            "container too short: {} bytes (minimum {MIN_CONTAINER_SIZE})",
            bytes.len()
        )));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_SIZE);
    let meta_len = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize;

    let meta_start = body.len().checked_sub(meta_len).ok_or_else(|| {
        PvError::Format(format!(
            "metadata length {meta_len} exceeds container size {}",
            bytes.len()
        ))
    })?;
    if meta_start < HEADER_SIZE {
        return Err(PvError::Format(format!(
            "metadata offset {meta_start} overlaps the {HEADER_SIZE}-byte header"
        )));
    }

    let metadata = Metadata::from_bytes(&body[meta_start..])?;

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&bytes[..SALT_SIZE]);
    let mut nonce_material = [0u8; NONCE_SIZE];
    nonce_material.copy_from_slice(&bytes[SALT_SIZE..HEADER_SIZE]);

    Ok(ParsedContainer {
        salt,
        nonce_material,
        ciphertext_region: &body[HEADER_SIZE..meta_start],
        metadata,
    })
}

/// Slice the ciphertext region into sealed chunks, in index order.
///
/// The region must hold exactly `chunks_count` chunks where all but the
/// last seal `chunk_size` bytes and the last seals the non-empty remainder
/// (or nothing, for a single-chunk empty plaintext).
pub fn split_ciphertext<'a>(region: &'a [u8], metadata: &Metadata) -> PvResult<Vec<&'a [u8]>> {
    let count = metadata.chunks_count as usize;
    if count == 0 {
        return Err(PvError::Format("container declares zero chunks".into()));
    }
    let chunk_size = usize::try_from(metadata.chunk_size)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| PvError::Format(format!("invalid chunk size {}", metadata.chunk_size)))?;
    let sealed_full = chunk_size
        .checked_add(TAG_SIZE)
        .ok_or_else(|| PvError::Format("chunk size overflow".into()))?;

    let full_len = (count - 1)
        .checked_mul(sealed_full)
        .ok_or_else(|| PvError::Format("chunk count overflow".into()))?;
    let last_len = region.len().checked_sub(full_len).ok_or_else(|| {
        PvError::Format(format!(
            "ciphertext region of {} bytes cannot hold {count} chunks",
            region.len()
        ))
    })?;
    let last_min = if count == 1 { TAG_SIZE } else { TAG_SIZE + 1 };
    if last_len < last_min || last_len > sealed_full {
        return Err(PvError::Format(format!(
            "final chunk of {last_len} sealed bytes does not fit chunk size {chunk_size}"
        )));
    }

    if let Some(original) = metadata.original_size {
        let plain = (count as u64 - 1) * chunk_size as u64 + (last_len - TAG_SIZE) as u64;
        if plain != original {
            return Err(PvError::Format(format!(
                "ciphertext holds {plain} plaintext bytes, metadata declares {original}"
            )));
        }
    }

    let mut chunks: Vec<&[u8]> = region[..full_len].chunks(sealed_full).collect();
    chunks.push(&region[full_len..]);
    Ok(chunks)
}

/// Recover the container key from the password or the embedded key.
pub fn prepare_key(
    metadata: &Metadata,
    password: Option<&SecretString>,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> PvResult<ContainerKey> {
    if metadata.has_password {
        let password = password
            .filter(|p| !p.expose_secret().is_empty())
            .ok_or(PvError::MissingPassword)?;
        derive_key(password, salt, params)
    } else {
        metadata.embedded_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{decrypt_chunk, encrypt_chunk, ChunkPosition};
    use crate::keys::generate_random_key;

    const SALT: [u8; SALT_SIZE] = [0xA5; SALT_SIZE];
    const NONCE: [u8; NONCE_SIZE] = [0x5A; NONCE_SIZE];

    fn sealed_chunks(key: &ContainerKey, plain: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        let pieces: Vec<&[u8]> = plain.chunks(chunk_size).collect();
        let count = pieces.len() as u32;
        pieces
            .iter()
            .enumerate()
            .map(|(i, p)| encrypt_chunk(key, &NONCE, ChunkPosition::new(i as u32, count), p).unwrap())
            .collect()
    }

    #[test]
    fn test_build_parse_roundtrip() {
        let key = generate_random_key();
        let plain: Vec<u8> = (0..100u8).collect();
        let chunks = sealed_chunks(&key, &plain, 32);
        let meta = Metadata::with_embedded_key("data.bin", "application/octet-stream", 4, 32, 100, &key);

        let bytes = build_container(&SALT, &NONCE, &chunks, &meta).unwrap();
        let parsed = parse_container(&bytes).unwrap();

        assert_eq!(parsed.salt, SALT);
        assert_eq!(parsed.nonce_material, NONCE);
        assert_eq!(parsed.metadata, meta);
        assert_eq!(parsed.ciphertext_region.len(), 100 + 4 * TAG_SIZE);

        let split = split_ciphertext(parsed.ciphertext_region, &parsed.metadata).unwrap();
        assert_eq!(split.len(), 4);
        let key = prepare_key(&parsed.metadata, None, &parsed.salt, &KdfParams::default()).unwrap();
        let mut out = Vec::new();
        for (i, sealed) in split.iter().enumerate() {
            out.extend(decrypt_chunk(&key, &NONCE, ChunkPosition::new(i as u32, 4), sealed).unwrap());
        }
        assert_eq!(out, plain);
    }

    #[test]
    fn test_layout_offsets() {
        let meta = Metadata::with_password("a", "b", 1, 16, 0);
        let chunks = vec![vec![0xCCu8; TAG_SIZE]];
        let bytes = build_container(&SALT, &NONCE, &chunks, &meta).unwrap();

        let meta_len = meta.to_bytes().unwrap().len();
        assert_eq!(&bytes[..16], &SALT);
        assert_eq!(&bytes[16..28], &NONCE);
        assert_eq!(&bytes[28..28 + TAG_SIZE], &chunks[0][..]);
        let trailer = &bytes[bytes.len() - 4..];
        assert_eq!(u32::from_be_bytes(trailer.try_into().unwrap()) as usize, meta_len);
    }

    #[test]
    fn test_too_short() {
        let result = parse_container(&[0u8; MIN_CONTAINER_SIZE - 1]);
        assert!(matches!(result, Err(PvError::Format(_))));
    }

    #[test]
    fn test_metadata_length_past_start() {
        let mut bytes = vec![0u8; 64];
        bytes[60..].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(parse_container(&bytes), Err(PvError::Format(_))));
    }

    #[test]
    fn test_metadata_overlapping_header() {
        let mut bytes = vec![b' '; 64];
        // 60 bytes of body, metadata claims 40 → starts at 20 < 28
        bytes[60..].copy_from_slice(&40u32.to_be_bytes());
        assert!(matches!(parse_container(&bytes), Err(PvError::Format(_))));
    }

    #[test]
    fn test_unparsable_metadata() {
        let mut bytes = vec![0u8; 28];
        bytes.extend_from_slice(b"this is not json");
        bytes.extend_from_slice(&16u32.to_be_bytes());
        assert!(matches!(parse_container(&bytes), Err(PvError::Format(_))));
    }

    #[test]
    fn test_split_rejects_wrong_region_length() {
        let meta = Metadata::with_password("a", "b", 3, 16, 40);
        // 2 full chunks (32 each sealed) + 8 plaintext + tag = 88 bytes expected
        assert!(split_ciphertext(&[0u8; 88], &meta).is_ok());
        assert!(matches!(split_ciphertext(&[0u8; 87], &meta), Err(PvError::Format(_))));
        assert!(matches!(split_ciphertext(&[0u8; 89], &meta), Err(PvError::Format(_))));
        assert!(matches!(split_ciphertext(&[0u8; 20], &meta), Err(PvError::Format(_))));
    }

    #[test]
    fn test_split_rejects_empty_tail_chunk() {
        let mut meta = Metadata::with_password("a", "b", 2, 16, 16);
        meta.original_size = None;
        // One full chunk plus a tag-only chunk: the last chunk must hold the remainder
        assert!(matches!(split_ciphertext(&[0u8; 32 + 16], &meta), Err(PvError::Format(_))));
    }

    #[test]
    fn test_split_rejects_zero_chunks() {
        let meta = Metadata::with_password("a", "b", 0, 16, 0);
        assert!(matches!(split_ciphertext(&[], &meta), Err(PvError::Format(_))));
    }

    #[test]
    fn test_prepare_key_requires_password() {
        let meta = Metadata::with_password("a", "b", 1, 16, 0);
        let params = KdfParams { iterations: 1 };

        assert!(matches!(
            prepare_key(&meta, None, &SALT, &params),
            Err(PvError::MissingPassword)
        ));
        let empty = SecretString::from("");
        assert!(matches!(
            prepare_key(&meta, Some(&empty), &SALT, &params),
            Err(PvError::MissingPassword)
        ));
        let pw = SecretString::from("Secr3t!");
        assert!(prepare_key(&meta, Some(&pw), &SALT, &params).is_ok());
    }

    #[test]
    fn test_prepare_key_requires_embedded_key() {
        let mut meta = Metadata::with_password("a", "b", 1, 16, 0);
        meta.has_password = false;
        assert!(matches!(
            prepare_key(&meta, None, &SALT, &KdfParams::default()),
            Err(PvError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_prepare_key_ignores_password_for_embedded_tier() {
        let key = generate_random_key();
        let meta = Metadata::with_embedded_key("a", "b", 1, 16, 0, &key);
        let pw = SecretString::from("unused");
        let recovered = prepare_key(&meta, Some(&pw), &SALT, &KdfParams::default()).unwrap();
        assert_eq!(recovered.as_bytes(), key.as_bytes());
    }
}
