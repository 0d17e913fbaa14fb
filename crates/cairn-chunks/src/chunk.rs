use bytes::Bytes;
use cairn_types::Hash;

/// An immutable byte payload plus the hash of those bytes.
///
/// `Chunk` is the unit of storage and transfer. Cloning is cheap: the payload
/// is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    hash: Hash,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk, computing its hash from `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let hash = Hash::of(&data);
        Self { hash, data }
    }

    /// Pair bytes with an already-known hash without re-hashing.
    ///
    /// The caller vouches for `hash`; stores re-verify on `put`.
    pub fn with_hash(hash: Hash, data: impl Into<Bytes>) -> Self {
        Self {
            hash,
            data: data.into(),
        }
    }

    /// The empty chunk (no bytes, empty hash).
    pub fn empty() -> Self {
        Self {
            hash: Hash::EMPTY,
            data: Bytes::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Recompute the hash of the payload and compare it with the declared one.
    pub fn verify(&self) -> bool {
        Hash::of(&self.data) == self.hash
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("hash", &self.hash)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_computes_hash() {
        let c = Chunk::new(b"abc".to_vec());
        assert_eq!(c.hash(), Hash::of(b"abc"));
        assert_eq!(c.len(), 3);
        assert!(c.verify());
    }

    #[test]
    fn with_hash_can_lie_and_verify_catches_it() {
        let c = Chunk::with_hash(Hash::of(b"other"), b"abc".to_vec());
        assert!(!c.verify());
    }

    #[test]
    fn empty_chunk() {
        let c = Chunk::empty();
        assert!(c.is_empty());
        assert!(c.hash().is_empty());
    }
}
