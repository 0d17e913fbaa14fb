//! Content-addressed chunk storage for Cairn.
//!
//! A [`Chunk`] is an opaque byte payload identified by the [`Hash`] of those
//! bytes. Values are encoded into chunks by `cairn-values`; this crate only
//! moves bytes around and never interprets them.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`MemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written (content-addressing guarantees this).
//! 2. Concurrent reads are always safe.
//! 3. The store never interprets chunk contents.
//! 4. Retries for transient failures belong to the backend, not its callers.
//! 5. All backend errors are propagated, never silently ignored.

pub mod chunk;
pub mod error;
pub mod memory;
pub mod traits;

pub use cairn_types::Hash;
pub use chunk::Chunk;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryChunkStore;
pub use traits::{ChunkStore, StoreStats};
