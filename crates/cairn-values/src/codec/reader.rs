use std::collections::BTreeMap;

use bytes::Bytes;
use cairn_types::{Hash, HASH_LEN};

use super::unzigzag;
use crate::blob::Blob;
use crate::error::DecodeError;
use crate::kind::Kind;
use crate::list::List;
use crate::map::Map;
use crate::meta_tuple::MetaTuple;
use crate::number::Number;
use crate::ordered_key::OrderedKey;
use crate::reference::Ref;
use crate::sequence::{Sequence, SequenceItems};
use crate::set::Set;
use crate::types::{StructField, StructType, Type, TypeCache};
use crate::value::{is_valid_name, Struct, Value};

type DecodeResult<T> = Result<T, DecodeError>;

/// Reads canonical encodings from a byte slice.
pub(crate) struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    types: &'a TypeCache,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8], types: &'a TypeCache) -> Self {
        Self { data, pos: 0, types }
    }

    /// Fails unless every byte was consumed.
    pub fn finish(&self) -> DecodeResult<()> {
        let remaining = self.data.len() - self.pos;
        if remaining != 0 {
            return Err(DecodeError::TrailingBytes { remaining });
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> DecodeResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_u8(&self) -> DecodeResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    fn read_slice(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof { offset: self.data.len() });
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_kind(&mut self) -> DecodeResult<Kind> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        Kind::from_tag(tag).ok_or(DecodeError::UnknownKind { tag, offset })
    }

    fn read_bool(&mut self) -> DecodeResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::Malformed(format!("bool byte {other}"))),
        }
    }

    pub fn read_varint(&mut self) -> DecodeResult<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let low = u64::from(byte & 0x7F);
            if shift == 63 && low > 1 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            value |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
        }
    }

    fn read_zigzag(&mut self) -> DecodeResult<i64> {
        self.read_varint().map(unzigzag)
    }

    /// A count of items that must each occupy at least one more byte.
    fn read_count(&mut self) -> DecodeResult<usize> {
        let count = self.read_varint()?;
        if count > self.remaining() as u64 {
            return Err(DecodeError::UnexpectedEof { offset: self.data.len() });
        }
        Ok(count as usize)
    }

    fn read_str(&mut self) -> DecodeResult<String> {
        let offset = self.pos;
        let len = self.read_count()?;
        let bytes = self.read_slice(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    fn read_hash(&mut self) -> DecodeResult<Hash> {
        let bytes = self.read_slice(HASH_LEN)?;
        Hash::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    pub fn read_value(&mut self) -> DecodeResult<Value> {
        let offset = self.pos;
        let kind = self.read_kind()?;
        self.read_value_body(kind, offset)
    }

    fn read_value_body(&mut self, kind: Kind, offset: usize) -> DecodeResult<Value> {
        Ok(match kind {
            Kind::Bool => Value::Bool(self.read_bool()?),
            Kind::Number => {
                let mantissa = self.read_zigzag()?;
                let exp = self.read_zigzag()?;
                Value::Number(Number::from_mantissa_exp(mantissa, exp)?)
            }
            Kind::String => Value::String(self.read_str()?),
            Kind::Blob => Value::Blob(Blob::from_sequence(self.read_sequence_body(kind)?)),
            Kind::List => Value::List(List::from_sequence(self.read_sequence_body(kind)?)),
            Kind::Set => Value::Set(Set::from_sequence(self.read_sequence_body(kind)?)),
            Kind::Map => Value::Map(Map::from_sequence(self.read_sequence_body(kind)?)),
            Kind::Ref => Value::Ref(self.read_ref_body()?),
            Kind::Struct => Value::Struct(self.read_struct_body()?),
            Kind::Type => Value::Type(self.read_type()?),
            Kind::Value | Kind::Cycle | Kind::Union | Kind::Hash => {
                return Err(DecodeError::Malformed(format!(
                    "kind {kind} cannot start a value at offset {offset}"
                )))
            }
        })
    }

    fn read_ref_body(&mut self) -> DecodeResult<Ref> {
        let target = self.read_hash()?;
        let target_type = self.read_type()?;
        let height = self.read_varint()?;
        if height == 0 {
            return Err(DecodeError::Malformed("ref height 0".into()));
        }
        Ok(Ref::from_parts(target, target_type, height))
    }

    fn read_struct_body(&mut self) -> DecodeResult<Struct> {
        let name = self.read_str()?;
        if !name.is_empty() && !is_valid_name(&name) {
            return Err(DecodeError::Malformed(format!("struct name {name:?}")));
        }
        let count = self.read_count()?;
        let mut fields = BTreeMap::new();
        let mut last: Option<String> = None;
        for _ in 0..count {
            let field = self.read_str()?;
            if !is_valid_name(&field) {
                return Err(DecodeError::Malformed(format!("field name {field:?}")));
            }
            if last.as_ref().is_some_and(|prev| *prev >= field) {
                return Err(DecodeError::Malformed(format!(
                    "struct {name} fields out of order at {field:?}"
                )));
            }
            let value = self.read_value()?;
            last = Some(field.clone());
            fields.insert(field, value);
        }
        Ok(Struct::from_sorted_fields(name, fields))
    }

    // -----------------------------------------------------------------------
    // Sequences
    // -----------------------------------------------------------------------

    fn read_sequence_body(&mut self, kind: Kind) -> DecodeResult<Sequence> {
        let level = self.read_varint()?;
        let is_meta = self.read_bool()?;
        if is_meta != (level > 0) {
            return Err(DecodeError::Malformed(format!(
                "{kind} sequence at level {level} has is_meta = {is_meta}"
            )));
        }
        let count = self.read_count()?;
        let items = if is_meta {
            let mut tuples = Vec::with_capacity(count);
            for _ in 0..count {
                tuples.push(self.read_meta_tuple()?);
            }
            SequenceItems::Tuples(tuples)
        } else {
            match kind {
                Kind::Blob => SequenceItems::Bytes(Bytes::copy_from_slice(self.read_slice(count)?)),
                Kind::Map => {
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        let k = self.read_value()?;
                        let v = self.read_value()?;
                        entries.push((k, v));
                    }
                    SequenceItems::Entries(entries)
                }
                _ => {
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(self.read_value()?);
                    }
                    SequenceItems::Values(values)
                }
            }
        };
        Ok(Sequence::new(kind, level, items))
    }

    fn read_meta_tuple(&mut self) -> DecodeResult<MetaTuple> {
        let offset = self.pos;
        if self.read_kind()? != Kind::Ref {
            return Err(DecodeError::Malformed(format!("meta tuple without ref at offset {offset}")));
        }
        let child_ref = self.read_ref_body()?;
        let key = self.read_ordered_key()?;
        let num_leaves = self.read_varint()?;
        Ok(MetaTuple::new(child_ref, key, num_leaves))
    }

    fn read_ordered_key(&mut self) -> DecodeResult<OrderedKey> {
        if self.peek_u8()? == Kind::Hash.tag() {
            self.pos += 1;
            return Ok(OrderedKey::Hash(self.read_hash()?));
        }
        let offset = self.pos;
        let value = self.read_value()?;
        if !value.is_primitive() {
            return Err(DecodeError::Malformed(format!(
                "non-primitive meta key at offset {offset}"
            )));
        }
        Ok(OrderedKey::Value(value))
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    /// Read a type, serving repeated encodings from the type cache.
    fn read_type(&mut self) -> DecodeResult<Type> {
        let data = self.data;
        let start = self.pos;
        self.skip_type()?;
        let encoding = &data[start..self.pos];
        if let Some(ty) = self.types.get(encoding) {
            return Ok(ty);
        }
        let end = self.pos;
        self.pos = start;
        let ty = self.parse_type(0)?;
        debug_assert_eq!(self.pos, end);
        self.types.insert(encoding, ty.clone());
        Ok(ty)
    }

    fn skip_type(&mut self) -> DecodeResult<()> {
        match self.read_kind()? {
            Kind::List | Kind::Set | Kind::Ref => self.skip_type(),
            Kind::Map => {
                self.skip_type()?;
                self.skip_type()
            }
            Kind::Struct => {
                let len = self.read_count()?;
                self.read_slice(len)?;
                for _ in 0..self.read_count()? {
                    let len = self.read_count()?;
                    self.read_slice(len)?;
                    self.skip_type()?;
                    self.read_u8()?;
                }
                Ok(())
            }
            Kind::Union => {
                for _ in 0..self.read_count()? {
                    self.skip_type()?;
                }
                Ok(())
            }
            Kind::Cycle => self.read_varint().map(|_| ()),
            Kind::Bool | Kind::Number | Kind::String | Kind::Blob | Kind::Value | Kind::Type => Ok(()),
            Kind::Hash => Err(DecodeError::Malformed("hash is not a type".into())),
        }
    }

    /// `open` counts the structs enclosing the current position.
    fn parse_type(&mut self, open: usize) -> DecodeResult<Type> {
        Ok(match self.read_kind()? {
            Kind::Bool => Type::Bool,
            Kind::Number => Type::Number,
            Kind::String => Type::String,
            Kind::Blob => Type::Blob,
            Kind::Value => Type::Value,
            Kind::Type => Type::Type,
            Kind::List => Type::list(self.parse_type(open)?),
            Kind::Set => Type::set(self.parse_type(open)?),
            Kind::Ref => Type::reference(self.parse_type(open)?),
            Kind::Map => {
                let k = self.parse_type(open)?;
                let v = self.parse_type(open)?;
                Type::map(k, v)
            }
            Kind::Struct => {
                let name = self.read_str()?;
                let count = self.read_count()?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let field_name = self.read_str()?;
                    let ty = self.parse_type(open + 1)?;
                    let optional = self.read_bool()?;
                    fields.push(StructField {
                        name: field_name,
                        ty,
                        optional,
                    });
                }
                Type::Struct(StructType { name, fields })
            }
            Kind::Union => {
                let count = self.read_count()?;
                let mut members = Vec::with_capacity(count);
                for _ in 0..count {
                    members.push(self.parse_type(open)?);
                }
                Type::Union(members)
            }
            Kind::Cycle => {
                let depth = self.read_varint()?;
                if depth >= open as u64 {
                    return Err(DecodeError::InvalidCycle {
                        depth: u32::try_from(depth).unwrap_or(u32::MAX),
                        open,
                    });
                }
                Type::Cycle(depth as u32)
            }
            Kind::Hash => return Err(DecodeError::Malformed("hash is not a type".into())),
        })
    }
}
