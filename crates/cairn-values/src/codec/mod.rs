//! Canonical binary encoding of values.
//!
//! Every value has exactly one encoding, and its hash is the hash of that
//! encoding. The layout is:
//!
//! ```text
//! Bool        [0][0|1]
//! Number      [1][zigzag mantissa][zigzag exponent]     mantissa odd, 0 = (0, 0)
//! String      [2][len][utf-8]
//! Collection  [kind][level][is_meta][count][items]      kind = Blob | List | Set | Map
//! Ref         [7][20-byte hash][type][height]
//! Struct      [9][name][count][(name value)*]           fields sorted by name
//! Type        [11][type]
//! ```
//!
//! Leaf items are values (`List`, `Set`), key/value pairs (`Map`) or raw
//! bytes (`Blob`). Meta items are `(Ref, OrderedKey, num_leaves)` tuples,
//! where the key is a primitive value or `[13][hash]`. Integers are LEB128
//! varints, signed ones zigzag-mapped first.

mod reader;
mod writer;

pub(crate) use reader::Decoder;
pub(crate) use writer::Encoder;

use cairn_chunks::Chunk;
use cairn_types::Hash;

use crate::error::{ValueError, ValueResult};
use crate::types::TypeCache;
use crate::value::Value;

/// Canonical encoding of `value`.
pub fn encode_value(value: &Value) -> Vec<u8> {
    value.encode()
}

/// Encode `value` into a content-addressed chunk.
pub fn encode_chunk(value: &Value) -> Chunk {
    Chunk::new(value.encode())
}

/// Decode one value; the whole input must be consumed.
pub fn decode_value(data: &[u8], types: &TypeCache) -> ValueResult<Value> {
    let mut dec = Decoder::new(data, types);
    let value = dec.read_value()?;
    dec.finish()?;
    Ok(value)
}

/// Decode and check that the value re-encodes to content hashing to `expected`.
///
/// Catches corrupted chunks as well as non-canonical encodings.
pub fn decode_validated(data: &[u8], expected: Hash, types: &TypeCache) -> ValueResult<Value> {
    let value = decode_value(data, types)?;
    let actual = Hash::of(&value.encode());
    if actual != expected {
        return Err(ValueError::HashMismatch { expected, actual });
    }
    Ok(value)
}

/// Append `value` as an LEB128 varint.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub(crate) fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub(crate) fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
