use std::collections::HashSet;

use cairn_types::Hash;

use crate::chunk::Chunk;
use crate::error::StoreResult;

/// Operation counters reported by a chunk store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks returned by `get`/`get_many`.
    pub reads: u64,
    /// Chunks accepted by `put`/`put_many` that were not already present.
    pub writes: u64,
    /// Number of chunks currently stored.
    pub chunks: u64,
}

/// Byte-addressed chunk storage.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written; putting the same chunk twice is a
///   no-op.
/// - Concurrent `get` calls are always safe.
/// - The store never interprets chunk contents.
/// - The root pointer only moves through [`ChunkStore::commit`].
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by hash. Returns `Ok(None)` if it does not exist.
    fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>>;

    /// Read every chunk in `hashes` that exists. Missing chunks are omitted.
    ///
    /// Default implementation calls `get()` for each hash. Backends may
    /// override for fewer round-trips.
    fn get_many(&self, hashes: &HashSet<Hash>) -> StoreResult<Vec<Chunk>> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(chunk) = self.get(hash)? {
                found.push(chunk);
            }
        }
        Ok(found)
    }

    /// Check whether a chunk exists.
    fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Return the subset of `hashes` that is absent from the store.
    fn has_many(&self, hashes: &HashSet<Hash>) -> StoreResult<HashSet<Hash>> {
        let mut absent = HashSet::new();
        for hash in hashes {
            if !self.has(hash)? {
                absent.insert(*hash);
            }
        }
        Ok(absent)
    }

    /// Write a chunk and return its hash.
    fn put(&self, chunk: Chunk) -> StoreResult<Hash>;

    /// Write chunks in the given order.
    ///
    /// Callers rely on the order: a chunk is never made visible before a
    /// chunk that precedes it in `chunks`.
    fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        for chunk in chunks {
            self.put(chunk)?;
        }
        Ok(())
    }

    /// Make all accepted writes durable.
    fn flush(&self) -> StoreResult<()>;

    /// Release backend resources. Subsequent operations fail.
    fn close(&self) -> StoreResult<()>;

    /// The current root pointer (`Hash::EMPTY` if never set).
    fn root(&self) -> StoreResult<Hash>;

    /// Move the root pointer from `last` to `current`.
    ///
    /// Returns `false` without changing anything if the root is not `last`.
    fn commit(&self, current: Hash, last: Hash) -> StoreResult<bool>;

    /// Operation counters.
    fn stats(&self) -> StoreStats;
}
