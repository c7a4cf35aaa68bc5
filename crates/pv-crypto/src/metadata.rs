//! Container metadata record
//!
//! Serialized as UTF-8 JSON at the end of the container, followed by its
//! byte length. Field names are camelCase on the wire:
//!
//! ```json
//! {"version":"1","filename":"a.txt","mimeType":"text/plain","hasPassword":true,
//!  "chunksCount":1,"timestamp":1700000000000,"key":null,"chunkSize":10485760,
//!  "originalSize":12}
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use pv_core::{PvError, PvResult, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::keys::{export_key, import_key, ContainerKey};
use crate::FORMAT_VERSION;

/// How a container's key is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTier {
    /// Key derived from a password; nothing secret is stored.
    Password,
    /// Random key stored raw in the metadata. Anyone holding the container
    /// bytes can decrypt it.
    EmbeddedKey,
}

/// Metadata describing a container's plaintext and key provenance
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Container format version
    pub version: String,
    /// Original file name
    pub filename: String,
    /// MIME type of the plaintext, stored verbatim
    pub mime_type: String,
    pub has_password: bool,
    /// Number of sealed chunks in the ciphertext region
    pub chunks_count: u32,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Raw key (base64), present only when `has_password` is false
    pub key: Option<String>,
    /// Plaintext bytes per full chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Total plaintext bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE as u64
}

impl Metadata {
    /// Metadata for a password-protected container.
    pub fn with_password(
        filename: &str,
        mime_type: &str,
        chunks_count: u32,
        chunk_size: usize,
        original_size: u64,
    ) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            has_password: true,
            chunks_count,
            timestamp: now_millis(),
            key: None,
            chunk_size: chunk_size as u64,
            original_size: Some(original_size),
        }
    }

    /// Metadata for a password-less container, embedding `key` raw.
    pub fn with_embedded_key(
        filename: &str,
        mime_type: &str,
        chunks_count: u32,
        chunk_size: usize,
        original_size: u64,
        key: &ContainerKey,
    ) -> Self {
        let raw = export_key(key);
        Self {
            version: FORMAT_VERSION.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            has_password: false,
            chunks_count,
            timestamp: now_millis(),
            key: Some(base64_encode(raw.as_ref())),
            chunk_size: chunk_size as u64,
            original_size: Some(original_size),
        }
    }

    pub fn tier(&self) -> SecurityTier {
        if self.has_password {
            SecurityTier::Password
        } else {
            SecurityTier::EmbeddedKey
        }
    }

    /// Decode the embedded raw key of a password-less container.
    pub fn embedded_key(&self) -> PvResult<ContainerKey> {
        if self.has_password {
            return Err(PvError::MalformedMetadata(
                "password-protected container must not embed a key".into(),
            ));
        }
        let encoded = self.key.as_deref().ok_or_else(|| {
            PvError::MalformedMetadata("password-less container has no embedded key".into())
        })?;
        let raw = zeroize::Zeroizing::new(base64_decode(encoded)?);
        import_key(&raw)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> PvResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PvError::Format(format!("metadata serialization: {e}")))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> PvResult<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| PvError::Format(format!("metadata is not UTF-8: {e}")))?;
        serde_json::from_str(text)
            .map_err(|e| PvError::Format(format!("metadata deserialization: {e}")))
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("version", &self.version)
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("has_password", &self.has_password)
            .field("chunks_count", &self.chunks_count)
            .field("timestamp", &self.timestamp)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("chunk_size", &self.chunk_size)
            .field("original_size", &self.original_size)
            .finish()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn base64_decode(s: &str) -> PvResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| PvError::MalformedMetadata(format!("embedded key is not base64: {e}")))
}
