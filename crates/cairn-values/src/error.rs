use cairn_chunks::StoreError;
use cairn_types::Hash;

use crate::kind::Kind;
use crate::types::Type;

/// A malformed, truncated, or non-canonical byte stream.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("unknown kind tag {tag} at offset {offset}")]
    UnknownKind { tag: u8, offset: usize },

    #[error("{remaining} trailing bytes after value")]
    TrailingBytes { remaining: usize },

    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("varint overflows 64 bits at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("cycle back-reference {depth} escapes {open} enclosing structs")]
    InvalidCycle { depth: u32, open: usize },

    #[error("malformed encoding: {0}")]
    Malformed(String),
}

/// Errors from value encoding, collection operations, and the value store.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("hash mismatch: expected {expected}, content hashes to {actual}")]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("ref target {target} is neither present in the store nor validated by a hint")]
    DanglingReference { target: Hash },

    #[error("ref to {target} declares type {expected}, but the target has type {actual}")]
    TypeMismatch {
        target: Hash,
        expected: Type,
        actual: Type,
    },

    #[error("chunk not found: {0}")]
    NotFound(Hash),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("numbers must be finite, got {0}")]
    InvalidNumber(f64),

    #[error("invalid struct or field name: {0:?}")]
    InvalidName(String),

    #[error("expected {expected} value, found {actual}")]
    KindMismatch { expected: Kind, actual: Kind },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for value operations.
pub type ValueResult<T> = Result<T, ValueError>;
