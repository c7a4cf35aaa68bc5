//! pv-chunks: fixed-size chunk streaming
//!
//! # Overview
//! - `streamer`: lazy, sequential splitting of a byte source into
//!   equal-sized chunks (the last one holding the remainder), so files of
//!   any size are processed with O(chunk size) memory.

pub mod streamer;

pub use streamer::{chunk_len_at, total_chunks, ChunkFrame, ChunkStreamer};
