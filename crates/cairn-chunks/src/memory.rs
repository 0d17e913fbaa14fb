use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cairn_types::Hash;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkStore, StoreStats};

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks are held behind a `RwLock` for
/// safe concurrent access; payloads are reference counted so reads are cheap.
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<Hash, Chunk>>,
    root: Mutex<Hash>,
    reads: AtomicU64,
    writes: AtomicU64,
    closed: AtomicBool,
}

impl MemoryChunkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            root: Mutex::new(Hash::EMPTY),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Total payload bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.read().values().map(|c| c.len() as u64).sum()
    }

    /// Return a sorted list of all chunk hashes in the store.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self.chunks.read().keys().copied().collect();
        hashes.sort();
        hashes
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.check_open()?;
        let found = self.chunks.read().get(hash).cloned();
        if found.is_some() {
            self.reads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.check_open()?;
        Ok(self.chunks.read().contains_key(hash))
    }

    fn put(&self, chunk: Chunk) -> StoreResult<Hash> {
        self.check_open()?;
        let computed = Hash::of(chunk.data());
        if computed != chunk.hash() {
            return Err(StoreError::HashMismatch {
                declared: chunk.hash(),
                computed,
            });
        }
        let hash = chunk.hash();
        let mut map = self.chunks.write();
        // Idempotent: the same hash always maps to the same bytes.
        if let std::collections::hash_map::Entry::Vacant(slot) = map.entry(hash) {
            slot.insert(chunk);
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hash)
    }

    fn flush(&self) -> StoreResult<()> {
        self.check_open()
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn root(&self) -> StoreResult<Hash> {
        self.check_open()?;
        Ok(*self.root.lock())
    }

    fn commit(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        self.check_open()?;
        let mut root = self.root.lock();
        if *root != last {
            debug!(expected = %last, actual = %*root, "root compare-and-swap rejected");
            return Ok(false);
        }
        *root = current;
        Ok(true)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            chunks: self.chunks.read().len() as u64,
        }
    }
}

impl std::fmt::Debug for MemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChunkStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn chunk(content: &[u8]) -> Chunk {
        Chunk::new(content.to_vec())
    }

    // -----------------------------------------------------------------------
    // Core get/put
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = MemoryChunkStore::new();
        let c = chunk(b"hello world");
        let hash = store.put(c.clone()).unwrap();
        assert_eq!(hash, c.hash());

        let read_back = store.get(&hash).unwrap().expect("should exist");
        assert_eq!(read_back, c);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryChunkStore::new();
        assert!(store.get(&Hash::of(b"missing")).unwrap().is_none());
    }

    #[test]
    fn put_rejects_mislabelled_chunk() {
        let store = MemoryChunkStore::new();
        let bad = Chunk::with_hash(Hash::of(b"x"), b"y".to_vec());
        let err = store.put(bad).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryChunkStore::new();
        store.put(chunk(b"same")).unwrap();
        store.put(chunk(b"same")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().writes, 1);
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    #[test]
    fn put_many_and_get_many() {
        let store = MemoryChunkStore::new();
        let chunks = vec![chunk(b"1"), chunk(b"2"), chunk(b"3")];
        let mut wanted: HashSet<Hash> = chunks.iter().map(Chunk::hash).collect();
        store.put_many(chunks).unwrap();
        wanted.insert(Hash::of(b"absent"));

        let found = store.get_many(&wanted).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(store.stats().reads, 3);
    }

    #[test]
    fn has_many_reports_absent() {
        let store = MemoryChunkStore::new();
        let present = store.put(chunk(b"here")).unwrap();
        let absent = Hash::of(b"gone");
        let query: HashSet<Hash> = [present, absent].into_iter().collect();
        let missing = store.has_many(&query).unwrap();
        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&absent));
    }

    // -----------------------------------------------------------------------
    // Root pointer
    // -----------------------------------------------------------------------

    #[test]
    fn commit_is_compare_and_swap() {
        let store = MemoryChunkStore::new();
        let a = Hash::of(b"a");
        let b = Hash::of(b"b");
        assert_eq!(store.root().unwrap(), Hash::EMPTY);
        assert!(store.commit(a, Hash::EMPTY).unwrap());
        assert!(!store.commit(b, Hash::EMPTY).unwrap());
        assert_eq!(store.root().unwrap(), a);
        assert!(store.commit(b, a).unwrap());
        assert_eq!(store.root().unwrap(), b);
    }

    // -----------------------------------------------------------------------
    // Lifecycle and utilities
    // -----------------------------------------------------------------------

    #[test]
    fn closed_store_rejects_operations() {
        let store = MemoryChunkStore::new();
        store.close().unwrap();
        assert!(matches!(store.put(chunk(b"x")), Err(StoreError::Closed)));
        assert!(matches!(store.get(&Hash::EMPTY), Err(StoreError::Closed)));
    }

    #[test]
    fn total_bytes_and_sorted_hashes() {
        let store = MemoryChunkStore::new();
        store.put(chunk(b"12345")).unwrap();
        store.put(chunk(b"123456789")).unwrap();
        assert_eq!(store.total_bytes(), 14);
        let hashes = store.all_hashes();
        assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryChunkStore::new());
        let hash = store.put(chunk(b"shared data")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let c = store.get(&hash).unwrap().unwrap();
                    assert!(c.verify());
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.stats().reads, 8);
    }

    #[test]
    fn debug_format() {
        let store = MemoryChunkStore::new();
        store.put(chunk(b"x")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryChunkStore"));
        assert!(debug.contains("chunk_count"));
    }
}
