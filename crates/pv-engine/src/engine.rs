//! Container engine: the four top-level operations
//!
//!   - `encrypt_container`: chunk → seal (inline or on the worker pool) → build
//!   - `decrypt_container`: parse → split → prepare key → open → reassemble
//!   - `embed_container`: hide a container in a cover bitmap
//!   - `reveal_container`: recover a container from a stego bitmap
//!
//! Nothing partial is ever returned: a failing or cancelled run yields only
//! the error.

use pv_chunks::ChunkStreamer;
use pv_core::config::PvConfig;
use pv_core::{PvError, PvResult};
use pv_crypto::{
    build_container, derive_key, generate_nonce, generate_random_key, generate_salt,
    parse_container, prepare_key, split_ciphertext, KdfParams, Metadata, SecurityTier,
    FORMAT_VERSION, TAG_SIZE,
};
use pv_stego::PixelBuffer;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arena::ChunkArena;
use crate::dispatch::{CipherOp, Dispatcher, RunSpec, WorkerPool};

/// Progress callback type (done, total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

type ChunkInputs<'a> = Box<dyn Iterator<Item = PvResult<(u32, Vec<u8>)>> + Send + 'a>;

/// How a new container's key is obtained.
#[derive(Clone, Copy)]
pub enum Protection<'a> {
    /// Derive the key from this password; nothing secret is stored.
    Password(&'a SecretString),
    /// Generate a random key and embed it in the metadata. Anyone holding
    /// the container bytes can decrypt it.
    EmbeddedKey,
}

impl<'a> Protection<'a> {
    /// `Password` for a non-empty password, `EmbeddedKey` otherwise
    pub fn from_password(password: Option<&'a SecretString>) -> Self {
        match password {
            Some(p) if !p.expose_secret().is_empty() => Protection::Password(p),
            _ => Protection::EmbeddedKey,
        }
    }

    pub fn tier(&self) -> SecurityTier {
        match self {
            Protection::Password(_) => SecurityTier::Password,
            Protection::EmbeddedKey => SecurityTier::EmbeddedKey,
        }
    }
}

/// Per-call options: progress reporting and cancellation
#[derive(Default)]
pub struct RunOptions {
    pub progress: Option<ProgressFn>,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn with_progress(progress: ProgressFn) -> Self {
        Self {
            progress: Some(progress),
            cancel: CancellationToken::new(),
        }
    }

    fn report(&self, done: u64, total: u64, message: &str) {
        if let Some(progress) = &self.progress {
            progress(done, total, message);
        }
    }

    fn check_cancelled(&self) -> PvResult<()> {
        if self.cancel.is_cancelled() {
            Err(PvError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A decrypted container
#[derive(Debug)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub metadata: Metadata,
}

/// Engine settings, usually taken from [`PvConfig`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chunk_size: usize,
    pub kdf: KdfParams,
    pub max_input_bytes: u64,
    pub parallel: bool,
    pub workers: usize,
    pub max_in_flight: usize,
}

impl EngineOptions {
    pub fn from_config(config: &PvConfig) -> Self {
        Self {
            chunk_size: config.crypto.chunk_size,
            kdf: KdfParams {
                iterations: config.crypto.pbkdf2_iterations,
            },
            max_input_bytes: config.crypto.max_input_bytes,
            parallel: config.engine.parallel,
            workers: config.engine.resolved_workers(),
            max_in_flight: config.engine.resolved_max_in_flight(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&PvConfig::default())
    }
}

pub struct Engine {
    options: EngineOptions,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Build an engine. With `parallel` set this spawns the worker pool and
    /// must be called inside a Tokio runtime.
    pub fn new(options: EngineOptions) -> PvResult<Self> {
        if options.chunk_size == 0 {
            return Err(PvError::Config("chunk size must be > 0".into()));
        }
        let dispatcher = if options.parallel {
            Dispatcher::Pool {
                pool: WorkerPool::new(options.workers)?,
                max_in_flight: options.max_in_flight,
            }
        } else {
            Dispatcher::Inline
        };
        debug!(
            chunk_size = options.chunk_size,
            parallel = options.parallel,
            workers = options.workers,
            "engine ready"
        );
        Ok(Self {
            options,
            dispatcher,
        })
    }

    pub fn from_config(config: &PvConfig) -> PvResult<Self> {
        config.validate()?;
        Self::new(EngineOptions::from_config(config))
    }

    /// Encrypt `plaintext` into a self-describing container.
    pub async fn encrypt_container(
        &self,
        plaintext: &[u8],
        filename: &str,
        mime_type: &str,
        protection: Protection<'_>,
        run: &RunOptions,
    ) -> PvResult<Vec<u8>> {
        if filename.is_empty() {
            return Err(PvError::Validation("filename must not be empty".into()));
        }
        let total_len = plaintext.len() as u64;
        if total_len > self.options.max_input_bytes {
            return Err(PvError::Validation(format!(
                "input of {total_len} bytes exceeds the {} byte limit",
                self.options.max_input_bytes
            )));
        }
        if let Protection::Password(p) = protection {
            if p.expose_secret().is_empty() {
                return Err(PvError::Validation("password must not be empty".into()));
            }
        }
        run.check_cancelled()?;

        let chunk_size = self.options.chunk_size;
        let salt = generate_salt();
        let base_nonce = generate_nonce();
        let key = match protection {
            Protection::Password(password) => derive_key(password, &salt, &self.options.kdf)?,
            Protection::EmbeddedKey => generate_random_key(),
        };

        let streamer = ChunkStreamer::new(plaintext, total_len, chunk_size)?;
        // An empty plaintext still gets one authenticated (empty) chunk
        let chunk_count = streamer.total_chunks().max(1);
        let inputs: ChunkInputs<'_> = if streamer.total_chunks() == 0 {
            Box::new(std::iter::once(Ok::<_, PvError>((0u32, Vec::new()))))
        } else {
            Box::new(streamer.map(|frame| frame.map(|f| (f.index, f.bytes))))
        };

        let sealed_len = plaintext.len() + chunk_count as usize * TAG_SIZE;
        let mut arena = ChunkArena::new(chunk_count, chunk_size + TAG_SIZE, sealed_len)?;
        let spec = RunSpec {
            op: CipherOp::Seal,
            key: &key,
            base_nonce,
            chunk_count,
            cancel: &run.cancel,
            progress: run.progress.as_ref(),
        };
        self.dispatcher.run(&spec, inputs, &mut arena).await?;
        let region = arena.into_inner()?;

        let metadata = match protection {
            Protection::Password(_) => {
                Metadata::with_password(filename, mime_type, chunk_count, chunk_size, total_len)
            }
            Protection::EmbeddedKey => {
                warn!(
                    filename,
                    "creating password-less container: the decryption key is stored inside it"
                );
                Metadata::with_embedded_key(
                    filename,
                    mime_type,
                    chunk_count,
                    chunk_size,
                    total_len,
                    &key,
                )
            }
        };

        let container = build_container(&salt, &base_nonce, std::slice::from_ref(&region), &metadata)?;
        info!(
            filename,
            bytes = total_len,
            chunks = chunk_count,
            tier = ?protection.tier(),
            container = container.len(),
            "container encrypted"
        );
        Ok(container)
    }

    /// Decrypt a container. `password` is required for password-protected
    /// containers and ignored for password-less ones.
    pub async fn decrypt_container(
        &self,
        container: &[u8],
        password: Option<&SecretString>,
        run: &RunOptions,
    ) -> PvResult<Decrypted> {
        run.check_cancelled()?;

        let parsed = parse_container(container)?;
        let metadata = parsed.metadata;
        if metadata.version != FORMAT_VERSION {
            return Err(PvError::Format(format!(
                "unsupported container version {:?}",
                metadata.version
            )));
        }
        let chunks = split_ciphertext(parsed.ciphertext_region, &metadata)?;
        if metadata.tier() == SecurityTier::EmbeddedKey && password.is_some() {
            debug!("password supplied for a password-less container; ignoring it");
        }
        let key = prepare_key(&metadata, password, &parsed.salt, &self.options.kdf)?;

        let chunk_count = metadata.chunks_count;
        // split_ciphertext has validated chunk_size against the region
        let chunk_size = metadata.chunk_size as usize;
        let plain_len = parsed.ciphertext_region.len() - chunk_count as usize * TAG_SIZE;
        let mut arena = ChunkArena::new(chunk_count, chunk_size, plain_len)?;

        let inputs: ChunkInputs<'_> = Box::new(
            chunks
                .into_iter()
                .enumerate()
                .map(|(i, sealed)| Ok((i as u32, sealed.to_vec()))),
        );
        let spec = RunSpec {
            op: CipherOp::Open,
            key: &key,
            base_nonce: parsed.nonce_material,
            chunk_count,
            cancel: &run.cancel,
            progress: run.progress.as_ref(),
        };
        self.dispatcher.run(&spec, inputs, &mut arena).await?;
        let plaintext = arena.into_inner()?;

        info!(
            filename = %metadata.filename,
            bytes = plaintext.len(),
            chunks = chunk_count,
            tier = ?metadata.tier(),
            "container decrypted"
        );
        Ok(Decrypted {
            plaintext,
            filename: metadata.filename.clone(),
            mime_type: metadata.mime_type.clone(),
            metadata,
        })
    }

    /// Hide `container` in the color LSBs of `cover`.
    ///
    /// The container is parsed first so garbage is never embedded.
    pub async fn embed_container(
        &self,
        mut cover: PixelBuffer,
        container: &[u8],
        run: &RunOptions,
    ) -> PvResult<PixelBuffer> {
        run.check_cancelled()?;
        parse_container(container)?;

        run.report(0, 1, "embedding container");
        pv_stego::embed(&mut cover, container)?;
        run.report(1, 1, "container embedded");

        info!(
            width = cover.width(),
            height = cover.height(),
            bytes = container.len(),
            "container hidden in image"
        );
        Ok(cover)
    }

    /// Recover a container previously hidden with [`Engine::embed_container`].
    pub async fn reveal_container(&self, stego: &PixelBuffer, run: &RunOptions) -> PvResult<Vec<u8>> {
        run.check_cancelled()?;

        run.report(0, 1, "extracting container");
        let container = pv_stego::extract(stego)?;
        parse_container(&container)?;
        run.report(1, 1, "container extracted");

        info!(bytes = container.len(), "container revealed from image");
        Ok(container)
    }

    /// Stop the worker pool, if any.
    pub async fn shutdown(self) {
        if let Dispatcher::Pool { pool, .. } = self.dispatcher {
            pool.shutdown().await;
        }
    }
}
