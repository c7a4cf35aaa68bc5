//! pv-engine: container operations over chunked AEAD and LSB steganography
//!
//! [`Engine`] runs the per-chunk cipher work inline or on a [`WorkerPool`]
//! of message-passing workers and reassembles results by index.

pub mod arena;
pub mod dispatch;
pub mod engine;

pub use arena::ChunkArena;
pub use dispatch::{CipherOp, ChunkOutcome, ChunkTask, Dispatcher, WorkerPool};
pub use engine::{Decrypted, Engine, EngineOptions, ProgressFn, Protection, RunOptions};
