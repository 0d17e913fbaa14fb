use cairn_types::Hash;

use super::{encode_varint, zigzag};
use crate::kind::Kind;
use crate::meta_tuple::MetaTuple;
use crate::number::Number;
use crate::ordered_key::OrderedKey;
use crate::reference::Ref;
use crate::sequence::{Item, Sequence, SequenceItems};
use crate::types::Type;
use crate::value::{Struct, Value};

/// Appends canonical encodings to a byte buffer.
#[derive(Default)]
pub(crate) struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn write_kind(&mut self, kind: Kind) {
        self.buf.push(kind.tag());
    }

    pub fn write_bool(&mut self, b: bool) {
        self.buf.push(u8::from(b));
    }

    pub fn write_varint(&mut self, v: u64) {
        encode_varint(&mut self.buf, v);
    }

    pub fn write_zigzag(&mut self, v: i64) {
        encode_varint(&mut self.buf, zigzag(v));
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_hash(&mut self, h: &Hash) {
        self.buf.extend_from_slice(h.as_bytes());
    }

    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Bool(b) => {
                self.write_kind(Kind::Bool);
                self.write_bool(*b);
            }
            Value::Number(n) => self.write_number(*n),
            Value::String(s) => {
                self.write_kind(Kind::String);
                self.write_str(s);
            }
            Value::Blob(b) => self.write_sequence(b.sequence()),
            Value::List(l) => self.write_sequence(l.sequence()),
            Value::Set(s) => self.write_sequence(s.sequence()),
            Value::Map(m) => self.write_sequence(m.sequence()),
            Value::Ref(r) => self.write_ref(r),
            Value::Struct(s) => self.write_struct(s),
            Value::Type(t) => {
                self.write_kind(Kind::Type);
                self.write_type(t);
            }
        }
    }

    fn write_number(&mut self, n: Number) {
        let (mantissa, exp) = n.to_mantissa_exp();
        self.write_kind(Kind::Number);
        self.write_zigzag(mantissa);
        self.write_zigzag(i64::from(exp));
    }

    pub fn write_ref(&mut self, r: &Ref) {
        self.write_kind(Kind::Ref);
        self.write_hash(&r.target());
        self.write_type(r.target_type());
        self.write_varint(r.height());
    }

    fn write_struct(&mut self, s: &Struct) {
        self.write_kind(Kind::Struct);
        self.write_str(s.name());
        self.write_varint(s.len() as u64);
        for (name, value) in s.fields() {
            self.write_str(name);
            self.write_value(value);
        }
    }

    /// Type body without the leading `Type` value tag.
    pub fn write_type(&mut self, ty: &Type) {
        self.write_kind(ty.kind());
        match ty {
            Type::List(t) | Type::Set(t) | Type::Ref(t) => self.write_type(t),
            Type::Map(k, v) => {
                self.write_type(k);
                self.write_type(v);
            }
            Type::Struct(st) => {
                self.write_str(&st.name);
                self.write_varint(st.fields.len() as u64);
                for field in &st.fields {
                    self.write_str(&field.name);
                    self.write_type(&field.ty);
                    self.write_bool(field.optional);
                }
            }
            Type::Union(members) => {
                self.write_varint(members.len() as u64);
                for t in members {
                    self.write_type(t);
                }
            }
            Type::Cycle(depth) => self.write_varint(u64::from(*depth)),
            Type::Bool | Type::Number | Type::String | Type::Blob | Type::Value | Type::Type => {}
        }
    }

    pub fn write_sequence(&mut self, seq: &Sequence) {
        self.write_kind(seq.kind());
        self.write_varint(seq.level());
        self.write_bool(seq.is_meta());
        match seq.items() {
            SequenceItems::Values(values) => {
                self.write_varint(values.len() as u64);
                for v in values {
                    self.write_value(v);
                }
            }
            SequenceItems::Entries(entries) => {
                self.write_varint(entries.len() as u64);
                for (k, v) in entries {
                    self.write_value(k);
                    self.write_value(v);
                }
            }
            SequenceItems::Bytes(bytes) => {
                self.write_varint(bytes.len() as u64);
                self.buf.extend_from_slice(bytes);
            }
            SequenceItems::Tuples(tuples) => {
                self.write_varint(tuples.len() as u64);
                for t in tuples {
                    self.write_meta_tuple(t);
                }
            }
        }
    }

    pub fn write_meta_tuple(&mut self, tuple: &MetaTuple) {
        self.write_ref(tuple.child_ref());
        self.write_ordered_key(tuple.key());
        self.write_varint(tuple.num_leaves());
    }

    pub fn write_ordered_key(&mut self, key: &OrderedKey) {
        match key {
            OrderedKey::Value(v) => self.write_value(v),
            OrderedKey::Hash(h) => {
                self.write_kind(Kind::Hash);
                self.write_hash(h);
            }
        }
    }

    /// Bytes fed to the rolling hasher for one chunker item.
    pub fn write_item(&mut self, item: &Item) {
        match item {
            Item::Value(v) => self.write_value(v),
            Item::Entry(k, v) => {
                self.write_value(k);
                self.write_value(v);
            }
            Item::Byte(b) => self.buf.push(*b),
            Item::Tuple(t) => self.write_meta_tuple(t),
        }
    }
}
