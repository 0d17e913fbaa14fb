use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length of a [`Hash`] in bytes.
pub const HASH_LEN: usize = 20;

/// Length of the textual form of a [`Hash`] (160 bits, 5 bits per character).
pub const HASH_STRING_LEN: usize = 32;

const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Content-addressed identifier for any chunk or value.
///
/// A `Hash` is the first 20 bytes of the BLAKE3 digest of a chunk's bytes.
/// Identical content always produces the same `Hash`, which is what makes
/// chunks deduplicatable and verifiable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The empty hash (all zeros). Represents "no chunk".
    pub const EMPTY: Hash = Hash([0u8; HASH_LEN]);

    /// Compute the hash of raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest.as_bytes()[..HASH_LEN]);
        Self(out)
    }

    /// Wrap a pre-computed digest.
    pub const fn from_digest(digest: [u8; HASH_LEN]) -> Self {
        Self(digest)
    }

    /// Build a hash from a byte slice of exactly [`HASH_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != HASH_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Returns `true` if this is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Parse the 32-character textual form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let bytes = s.as_bytes();
        if bytes.len() != HASH_STRING_LEN {
            return Err(TypeError::InvalidHash(s.to_string()));
        }
        let mut out = [0u8; HASH_LEN];
        // Every 8 characters carry 40 bits = 5 bytes.
        for (group, chars) in bytes.chunks(8).enumerate() {
            let mut acc: u64 = 0;
            for &c in chars {
                let digit = decode_digit(c).ok_or_else(|| TypeError::InvalidHash(s.to_string()))?;
                acc = (acc << 5) | u64::from(digit);
            }
            for i in 0..5 {
                out[group * 5 + i] = (acc >> (32 - 8 * i)) as u8;
            }
        }
        Ok(Self(out))
    }

    /// Short textual form (first 8 characters), for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

fn decode_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'v' => Some(c - b'a' + 10),
        _ => None,
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [0u8; HASH_STRING_LEN];
        for (group, chunk) in self.0.chunks(5).enumerate() {
            let acc = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            for i in 0..8 {
                let idx = ((acc >> (35 - 5 * i)) & 0x1f) as usize;
                out[group * 8 + i] = ALPHABET[idx];
            }
        }
        // The alphabet is pure ASCII.
        f.write_str(std::str::from_utf8(&out).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LEN] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}
