//! Typed value access on top of a [`ChunkStore`].
//!
//! [`ValueStore`] decodes chunks into values, caches them, and buffers
//! writes until a flush. Every write is validated: each ref a value embeds
//! must point at a chunk the store already knows about, with the declared
//! type. Flushing hands chunks to the backing store in dependency order, so
//! the backing store never holds a dangling ref.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use cairn_chunks::{Chunk, ChunkStore, MemoryChunkStore};
use cairn_types::Hash;
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::codec;
use crate::config::ValueStoreConfig;
use crate::error::{ValueError, ValueResult};
use crate::reference::Ref;
use crate::types::{Type, TypeCache};
use crate::value::Value;

/// Read access to values by hash.
pub trait ValueReader: Send + Sync {
    /// Load one value. Returns `Ok(None)` if no chunk has this hash.
    fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>>;

    /// Load several values; the result lines up with `hashes`.
    ///
    /// Default implementation calls `read_value()` for each hash.
    fn read_many_values(&self, hashes: &[Hash]) -> ValueResult<Vec<Option<Value>>> {
        hashes.iter().map(|h| self.read_value(h)).collect()
    }

    /// Preferred prefetch batch for forward iteration; 0 disables it.
    fn read_ahead(&self) -> usize {
        0
    }

    /// Start loading `hashes` in the background so later reads find them
    /// without waiting. The default does nothing.
    fn prefetch(&self, hashes: &[Hash]) {
        let _ = hashes;
    }
}

/// Write access to values.
pub trait ValueWriter {
    /// Store `value` and return a ref to it.
    fn write_value(&self, value: &Value) -> ValueResult<Ref>;
}

/// Both halves, as taken by the chunker and collection edits.
pub trait ValueReadWriter: ValueReader + ValueWriter {
    fn as_reader(&self) -> &dyn ValueReader;
}

impl<T: ValueReader + ValueWriter> ValueReadWriter for T {
    fn as_reader(&self) -> &dyn ValueReader {
        self
    }
}

/// What the store knows about a chunk it has read, written, or seen
/// referenced from a chunk it read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkCacheEntry {
    hint: Hash,
    ty: Option<Type>,
}

impl ChunkCacheEntry {
    /// The chunk that vouched for this one: itself when it was read or
    /// written directly, otherwise the chunk whose ref named it.
    pub fn hint(&self) -> Hash {
        self.hint
    }

    /// The chunk's type, once it has been computed or learned from a ref.
    pub fn target_type(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

struct PendingWrite {
    chunk: Chunk,
    value: Value,
    height: u64,
    children: Vec<Hash>,
}

#[derive(Default)]
struct PendingWrites {
    chunks: HashMap<Hash, PendingWrite>,
    bytes: u64,
}

impl PendingWrites {
    fn insert(&mut self, hash: Hash, write: PendingWrite) {
        self.bytes += write.chunk.len() as u64;
        self.chunks.insert(hash, write);
    }

    fn remove(&mut self, hash: &Hash) -> Option<PendingWrite> {
        let write = self.chunks.remove(hash)?;
        self.bytes = self.bytes.saturating_sub(write.chunk.len() as u64);
        Some(write)
    }

    /// Remove every pending chunk reachable from `roots`, children first.
    ///
    /// Chunks are ordered by ref height, then by breadth-first depth from
    /// the roots (deepest first), then by visit order. A chunk's height is
    /// strictly greater than that of anything it references, so height alone
    /// already puts children first even when a child is shared by several
    /// parents at different depths.
    fn drain_reachable(&mut self, roots: &[Hash]) -> Vec<Chunk> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if self.chunks.contains_key(root) && seen.insert(*root) {
                queue.push_back((*root, 0usize));
            }
        }
        let mut order: Vec<(u64, usize, usize, Hash)> = Vec::new();
        while let Some((hash, depth)) = queue.pop_front() {
            let Some(write) = self.chunks.get(&hash) else {
                continue;
            };
            order.push((write.height, depth, order.len(), hash));
            for child in &write.children {
                if self.chunks.contains_key(child) && seen.insert(*child) {
                    queue.push_back((*child, depth + 1));
                }
            }
        }
        order.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        order
            .into_iter()
            .filter_map(|(_, _, _, hash)| self.remove(&hash))
            .map(|write| write.chunk)
            .collect()
    }

    /// Pending chunks no other pending chunk references.
    fn roots(&self) -> Vec<Hash> {
        let referenced: HashSet<&Hash> = self.chunks.values().flat_map(|w| w.children.iter()).collect();
        let mut roots: Vec<Hash> = self.chunks.keys().filter(|h| !referenced.contains(h)).copied().collect();
        roots.sort();
        roots
    }
}

/// Validating, caching value store over any [`ChunkStore`].
pub struct ValueStore {
    chunks: Arc<dyn ChunkStore>,
    config: ValueStoreConfig,
    types: TypeCache,
    decoded: Mutex<LruCache<Hash, Value>>,
    /// Raw chunks landed by background prefetches, not yet decoded.
    prefetched: Arc<Mutex<LruCache<Hash, Chunk>>>,
    known: Mutex<HashMap<Hash, ChunkCacheEntry>>,
    pending: Mutex<PendingWrites>,
    pool: rayon::ThreadPool,
}

impl ValueStore {
    /// Wrap `chunks` with the default configuration.
    pub fn new(chunks: Arc<dyn ChunkStore>) -> ValueResult<Self> {
        Self::with_config(chunks, ValueStoreConfig::default())
    }

    pub fn with_config(chunks: Arc<dyn ChunkStore>, config: ValueStoreConfig) -> ValueResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.value_cache_entries)
            .ok_or_else(|| ValueError::Config("value_cache_entries must be at least 1".into()))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("cairn-values-{i}"))
            .build()
            .map_err(|e| ValueError::Pool(e.to_string()))?;
        let landing = NonZeroUsize::new(config.read_ahead * 4).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            chunks,
            config,
            types: TypeCache::new(),
            decoded: Mutex::new(LruCache::new(capacity)),
            prefetched: Arc::new(Mutex::new(LruCache::new(landing))),
            known: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingWrites::default()),
            pool,
        })
    }

    /// A store backed by a fresh [`MemoryChunkStore`].
    pub fn in_memory() -> ValueResult<Self> {
        Self::new(Arc::new(MemoryChunkStore::new()))
    }

    pub fn config(&self) -> &ValueStoreConfig {
        &self.config
    }

    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    pub fn type_cache(&self) -> &TypeCache {
        &self.types
    }

    /// Number of chunks written but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().chunks.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending.lock().bytes
    }

    /// What the store knows about `hash`, if anything.
    pub fn cached_hint(&self, hash: &Hash) -> Option<ChunkCacheEntry> {
        self.known.lock().get(hash).cloned()
    }

    /// Persist the pending chunks reachable from `root`.
    pub fn flush_from(&self, root: Hash) -> ValueResult<()> {
        self.flush_roots(&[root])
    }

    /// Persist every pending chunk and flush the backing store.
    pub fn flush(&self) -> ValueResult<()> {
        let roots = self.pending.lock().roots();
        self.flush_roots(&roots)?;
        self.chunks.flush()?;
        Ok(())
    }

    fn flush_roots(&self, roots: &[Hash]) -> ValueResult<()> {
        let mut pending = self.pending.lock();
        let batch = pending.drain_reachable(roots);
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let bytes: u64 = batch.iter().map(|c| c.len() as u64).sum();
        // Held across the put so readers never miss a chunk in transit.
        self.chunks.put_many(batch)?;
        debug!(count, bytes, remaining = pending.chunks.len(), "flushed pending chunks");
        Ok(())
    }

    /// Flush, then move the backing store's root from `last` to `current`.
    ///
    /// Returns `false` if the root was not `last`.
    pub fn commit(&self, current: Hash, last: Hash) -> ValueResult<bool> {
        self.flush()?;
        if !current.is_empty() && !self.chunks.has(&current)? {
            return Err(ValueError::DanglingReference { target: current });
        }
        let moved = self.chunks.commit(current, last)?;
        debug!(current = %current, last = %last, moved, "commit");
        Ok(moved)
    }

    pub fn root(&self) -> ValueResult<Hash> {
        Ok(self.chunks.root()?)
    }

    /// Close the backing store. Unflushed writes are discarded.
    pub fn close(&self) -> ValueResult<()> {
        let mut pending = self.pending.lock();
        if !pending.chunks.is_empty() {
            warn!(count = pending.chunks.len(), "closing value store with unflushed writes");
            *pending = PendingWrites::default();
        }
        self.decoded.lock().clear();
        self.prefetched.lock().clear();
        self.known.lock().clear();
        self.chunks.close()?;
        Ok(())
    }

    /// Value from the decoded cache or the pending buffer.
    fn resident(&self, hash: &Hash) -> Option<Value> {
        if let Some(value) = self.decoded.lock().get(hash) {
            return Some(value.clone());
        }
        let value = self.pending.lock().chunks.get(hash).map(|w| w.value.clone())?;
        self.decoded.lock().put(*hash, value.clone());
        Some(value)
    }

    fn decode_chunk(&self, chunk: &Chunk) -> ValueResult<Value> {
        if self.config.validate_reads {
            codec::decode_validated(chunk.data(), chunk.hash(), &self.types).inspect_err(|e| {
                if matches!(e, ValueError::HashMismatch { .. }) {
                    warn!(hash = %chunk.hash(), "chunk content does not match its hash");
                }
            })
        } else {
            codec::decode_value(chunk.data(), &self.types)
        }
    }

    /// Cache a value read from the backing store and record hints for it
    /// and for every chunk it references.
    fn remember_read(&self, hash: Hash, value: &Value) {
        {
            let mut known = self.known.lock();
            known.entry(hash).or_insert(ChunkCacheEntry { hint: hash, ty: None });
            value.walk_refs(&mut |r| {
                known.entry(r.target()).or_insert_with(|| ChunkCacheEntry {
                    hint: hash,
                    ty: Some(r.target_type().clone()),
                });
            });
        }
        self.decoded.lock().put(hash, value.clone());
    }

    /// Check that `r` points at a known chunk of the declared type.
    fn validate_ref(&self, r: &Ref) -> ValueResult<()> {
        let target = r.target();
        let known = self.known.lock().get(&target).map(|e| e.ty.clone());
        let actual = match known {
            Some(Some(ty)) => ty,
            Some(None) => {
                let value = self.read_value(&target)?.ok_or(ValueError::DanglingReference { target })?;
                value.type_of()
            }
            None => {
                warn!(target = %target, "no hint for ref target, reading it to validate");
                let value = self.read_value(&target)?.ok_or(ValueError::DanglingReference { target })?;
                value.type_of()
            }
        };
        if actual != *r.target_type() {
            return Err(ValueError::TypeMismatch {
                target,
                expected: r.target_type().clone(),
                actual,
            });
        }
        if let Some(entry) = self.known.lock().get_mut(&target) {
            entry.ty.get_or_insert(actual);
        }
        Ok(())
    }
}

impl ValueReader for ValueStore {
    fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
        if let Some(value) = self.resident(hash) {
            return Ok(Some(value));
        }
        let landed = self.prefetched.lock().pop(hash);
        let chunk = match landed {
            Some(chunk) => chunk,
            None => match self.chunks.get(hash)? {
                Some(chunk) => chunk,
                None => return Ok(None),
            },
        };
        let value = self.decode_chunk(&chunk)?;
        self.remember_read(*hash, &value);
        Ok(Some(value))
    }

    /// Resident values are served directly; the rest are fetched with one
    /// `get_many` and decoded on the store's worker pool.
    fn read_many_values(&self, hashes: &[Hash]) -> ValueResult<Vec<Option<Value>>> {
        let mut found: HashMap<Hash, Value> = HashMap::with_capacity(hashes.len());
        let mut missing = HashSet::new();
        for hash in hashes {
            if found.contains_key(hash) || missing.contains(hash) {
                continue;
            }
            match self.resident(hash) {
                Some(value) => {
                    found.insert(*hash, value);
                }
                None => {
                    missing.insert(*hash);
                }
            }
        }
        let mut chunks = Vec::new();
        {
            let mut prefetched = self.prefetched.lock();
            missing.retain(|h| match prefetched.pop(h) {
                Some(chunk) => {
                    chunks.push(chunk);
                    false
                }
                None => true,
            });
        }
        if !missing.is_empty() {
            chunks.extend(self.chunks.get_many(&missing)?);
            trace!(requested = missing.len(), fetched = chunks.len(), "batched read");
        }
        if !chunks.is_empty() {
            let decoded: Vec<ValueResult<(Hash, Value)>> = self.pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| self.decode_chunk(chunk).map(|v| (chunk.hash(), v)))
                    .collect()
            });
            for result in decoded {
                let (hash, value) = result?;
                self.remember_read(hash, &value);
                found.insert(hash, value);
            }
        }
        Ok(hashes.iter().map(|h| found.get(h).cloned()).collect())
    }

    fn read_ahead(&self) -> usize {
        self.config.read_ahead
    }

    /// Fetches on the worker pool; decoding waits for the read that uses it.
    fn prefetch(&self, hashes: &[Hash]) {
        let wanted: HashSet<Hash> = {
            let decoded = self.decoded.lock();
            let prefetched = self.prefetched.lock();
            hashes
                .iter()
                .filter(|h| !decoded.contains(*h) && !prefetched.contains(*h))
                .copied()
                .collect()
        };
        if wanted.is_empty() {
            return;
        }
        let chunks = Arc::clone(&self.chunks);
        let landing = Arc::clone(&self.prefetched);
        self.pool.spawn(move || match chunks.get_many(&wanted) {
            Ok(found) => {
                trace!(requested = wanted.len(), fetched = found.len(), "prefetched chunks");
                let mut landing = landing.lock();
                for chunk in found {
                    landing.put(chunk.hash(), chunk);
                }
            }
            Err(e) => debug!(error = %e, "prefetch failed"),
        });
    }
}

impl ValueWriter for ValueStore {
    fn write_value(&self, value: &Value) -> ValueResult<Ref> {
        let chunk = codec::encode_chunk(value);
        let hash = chunk.hash();
        let r = Ref::from_parts(hash, value.type_of(), value.max_ref_height() + 1);
        if let Some(entry) = self.known.lock().get_mut(&hash) {
            entry.ty.get_or_insert_with(|| r.target_type().clone());
            return Ok(r);
        }

        let mut children = Vec::new();
        value.walk_refs(&mut |child| children.push(child.clone()));
        for child in &children {
            self.validate_ref(child)?;
        }

        let over_threshold = {
            let mut pending = self.pending.lock();
            if !pending.chunks.contains_key(&hash) && !self.chunks.has(&hash)? {
                pending.insert(
                    hash,
                    PendingWrite {
                        chunk,
                        value: value.clone(),
                        height: r.height(),
                        children: children.iter().map(Ref::target).collect(),
                    },
                );
                trace!(hash = %hash, height = r.height(), "buffered write");
            }
            pending.bytes > self.config.pending_flush_bytes
        };
        self.known.lock().insert(
            hash,
            ChunkCacheEntry {
                hint: hash,
                ty: Some(r.target_type().clone()),
            },
        );
        if over_threshold {
            self.flush_from(hash)?;
        }
        Ok(r)
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStore")
            .field("known", &self.known.lock().len())
            .field("pending", &self.pending_len())
            .field("config", &self.config)
            .finish()
    }
}
