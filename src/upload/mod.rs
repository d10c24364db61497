//! Chunked Upload Module
//!
//! Server side of the chunked upload protocol:
//! 1. Client cuts a file into fixed-size chunks and posts each one
//!    (any order, retries welcome) under a client-chosen session id.
//! 2. The chunk store stages the slots on disk.
//! 3. Finalize concatenates the slots in index order, validates the
//!    artifact and hands it to the share store, exactly once.

pub mod assembler;
pub mod chunk_store;
pub mod validator;

pub use assembler::Assembler;
pub use chunk_store::{ChunkStore, MAX_CHUNKS};
