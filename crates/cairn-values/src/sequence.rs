//! The node type shared by every prolly-tree collection.
//!
//! A [`Sequence`] is one chunk: either a leaf holding values, map entries or
//! bytes, or a meta node at `level > 0` holding [`MetaTuple`]s that point at
//! the chunks one level down. Sequences are immutable and cheap to clone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use cairn_types::Hash;

use crate::blob::Blob;
use crate::codec::Encoder;
use crate::error::{DecodeError, ValueError, ValueResult};
use crate::kind::Kind;
use crate::list::List;
use crate::map::Map;
use crate::meta_tuple::MetaTuple;
use crate::ordered_key::OrderedKey;
use crate::reference::Ref;
use crate::set::Set;
use crate::store::ValueReader;
use crate::types::Type;
use crate::value::Value;

/// Items of one sequence, stored in their compact form.
#[derive(Clone, Debug)]
pub enum SequenceItems {
    Values(Vec<Value>),
    Entries(Vec<(Value, Value)>),
    Bytes(Bytes),
    Tuples(Vec<MetaTuple>),
}

/// A single item of any sequence, as seen by cursors and the chunker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Value(Value),
    Entry(Value, Value),
    Byte(u8),
    Tuple(MetaTuple),
}

impl Item {
    /// Sort key for ordered collections; `None` for blob bytes.
    pub fn ordered_key(&self) -> Option<OrderedKey> {
        match self {
            Self::Value(v) | Self::Entry(v, _) => Some(OrderedKey::of(v)),
            Self::Tuple(t) => Some(t.key().clone()),
            Self::Byte(_) => None,
        }
    }
}

/// One prolly-tree node.
#[derive(Clone)]
pub struct Sequence(Arc<SequenceData>);

struct SequenceData {
    kind: Kind,
    level: u64,
    items: SequenceItems,
    hash: OnceLock<Hash>,
    /// Running leaf totals of meta tuples.
    offsets: OnceLock<Vec<u64>>,
}

impl Sequence {
    pub(crate) fn new(kind: Kind, level: u64, items: SequenceItems) -> Self {
        Self(Arc::new(SequenceData {
            kind,
            level,
            items,
            hash: OnceLock::new(),
            offsets: OnceLock::new(),
        }))
    }

    /// Empty leaf of the given collection kind.
    pub fn empty(kind: Kind) -> Self {
        let items = match kind {
            Kind::Blob => SequenceItems::Bytes(Bytes::new()),
            Kind::Map => SequenceItems::Entries(Vec::new()),
            _ => SequenceItems::Values(Vec::new()),
        };
        Self::new(kind, 0, items)
    }

    /// Build a node from chunker items. Every item must fit `kind` and `level`.
    pub(crate) fn from_items(kind: Kind, level: u64, items: Vec<Item>) -> ValueResult<Self> {
        let mismatch = |item: &Item| {
            ValueError::Decode(DecodeError::Malformed(format!(
                "item {item:?} does not belong in a {kind} sequence at level {level}"
            )))
        };
        let collected = if level > 0 {
            let mut tuples = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Item::Tuple(t) => tuples.push(t),
                    other => return Err(mismatch(&other)),
                }
            }
            SequenceItems::Tuples(tuples)
        } else {
            match kind {
                Kind::Blob => {
                    let mut bytes = BytesMut::with_capacity(items.len());
                    for item in items {
                        match item {
                            Item::Byte(b) => bytes.extend_from_slice(&[b]),
                            other => return Err(mismatch(&other)),
                        }
                    }
                    SequenceItems::Bytes(bytes.freeze())
                }
                Kind::Map => {
                    let mut entries = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Item::Entry(k, v) => entries.push((k, v)),
                            other => return Err(mismatch(&other)),
                        }
                    }
                    SequenceItems::Entries(entries)
                }
                _ => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Item::Value(v) => values.push(v),
                            other => return Err(mismatch(&other)),
                        }
                    }
                    SequenceItems::Values(values)
                }
            }
        };
        Ok(Self::new(kind, level, collected))
    }

    /// Unwrap the root sequence of a collection value of kind `expected`.
    pub fn from_value(value: Value, expected: Kind) -> ValueResult<Self> {
        let actual = value.kind();
        let seq = match value {
            Value::Blob(b) => b.sequence().clone(),
            Value::List(l) => l.sequence().clone(),
            Value::Set(s) => s.sequence().clone(),
            Value::Map(m) => m.sequence().clone(),
            _ => return Err(ValueError::KindMismatch { expected, actual }),
        };
        if actual != expected {
            return Err(ValueError::KindMismatch { expected, actual });
        }
        Ok(seq)
    }

    /// Wrap this sequence as the collection value of its kind.
    pub fn to_value(&self) -> Value {
        match self.kind() {
            Kind::Blob => Value::Blob(Blob::from_sequence(self.clone())),
            Kind::Set => Value::Set(Set::from_sequence(self.clone())),
            Kind::Map => Value::Map(Map::from_sequence(self.clone())),
            _ => Value::List(List::from_sequence(self.clone())),
        }
    }

    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    pub fn level(&self) -> u64 {
        self.0.level
    }

    pub fn is_leaf(&self) -> bool {
        self.0.level == 0
    }

    pub fn is_meta(&self) -> bool {
        self.0.level > 0
    }

    pub fn items(&self) -> &SequenceItems {
        &self.0.items
    }

    /// Number of items in this node (not in the whole tree).
    pub fn len(&self) -> usize {
        match &self.0.items {
            SequenceItems::Values(v) => v.len(),
            SequenceItems::Entries(e) => e.len(),
            SequenceItems::Bytes(b) => b.len(),
            SequenceItems::Tuples(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item(&self, idx: usize) -> Option<Item> {
        match &self.0.items {
            SequenceItems::Values(v) => v.get(idx).cloned().map(Item::Value),
            SequenceItems::Entries(e) => e.get(idx).cloned().map(|(k, v)| Item::Entry(k, v)),
            SequenceItems::Bytes(b) => b.get(idx).copied().map(Item::Byte),
            SequenceItems::Tuples(t) => t.get(idx).cloned().map(Item::Tuple),
        }
    }

    /// Meta tuples; empty for leaves.
    pub fn tuples(&self) -> &[MetaTuple] {
        match &self.0.items {
            SequenceItems::Tuples(t) => t,
            _ => &[],
        }
    }

    pub fn tuple(&self, idx: usize) -> Option<&MetaTuple> {
        self.tuples().get(idx)
    }

    /// Sort key of item `idx`.
    pub fn key_at(&self, idx: usize) -> Option<OrderedKey> {
        match &self.0.items {
            SequenceItems::Values(v) => v.get(idx).map(OrderedKey::of),
            SequenceItems::Entries(e) => e.get(idx).map(|(k, _)| OrderedKey::of(k)),
            SequenceItems::Tuples(t) => t.get(idx).map(|t| t.key().clone()),
            SequenceItems::Bytes(b) => (idx < b.len()).then(|| OrderedKey::from_count(idx as u64 + 1)),
        }
    }

    /// First index whose key is `>= key`, or `len()` if there is none.
    pub fn search(&self, key: &OrderedKey) -> usize {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid) {
                Some(k) if k < *key => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    fn offsets(&self) -> &[u64] {
        self.0.offsets.get_or_init(|| {
            let mut total = 0;
            self.tuples()
                .iter()
                .map(|t| {
                    total += t.num_leaves();
                    total
                })
                .collect()
        })
    }

    /// Total leaf items below this node.
    pub fn num_leaves(&self) -> u64 {
        if self.is_leaf() {
            return self.len() as u64;
        }
        self.offsets().last().copied().unwrap_or(0)
    }

    /// Leaf items in items `0..=idx`.
    pub fn cumulative_leaves(&self, idx: usize) -> u64 {
        if self.is_leaf() {
            return (idx as u64 + 1).min(self.len() as u64);
        }
        let offsets = self.offsets();
        offsets.get(idx).or(offsets.last()).copied().unwrap_or(0)
    }

    /// Load child `idx` of a meta node.
    pub fn child_at(&self, vr: &dyn ValueReader, idx: usize) -> ValueResult<Self> {
        let tuple = self.tuple(idx).ok_or(ValueError::IndexOutOfBounds {
            index: idx as u64,
            len: self.len() as u64,
        })?;
        tuple.child_sequence(vr)
    }

    /// Load children `start..end` with one batched read.
    pub fn children(&self, vr: &dyn ValueReader, start: usize, end: usize) -> ValueResult<Vec<Self>> {
        let tuples = self.tuples();
        if start > end || end > tuples.len() {
            return Err(ValueError::IndexOutOfBounds {
                index: end as u64,
                len: tuples.len() as u64,
            });
        }
        let tuples = &tuples[start..end];
        let missing: Vec<Hash> = tuples
            .iter()
            .filter(|t| t.cached_child().is_none())
            .map(|t| t.child_ref().target())
            .collect();
        let mut loaded: HashMap<Hash, Value> = HashMap::with_capacity(missing.len());
        if !missing.is_empty() {
            let values = vr.read_many_values(&missing)?;
            for (hash, value) in missing.into_iter().zip(values) {
                if let Some(value) = value {
                    loaded.insert(hash, value);
                }
            }
        }
        tuples
            .iter()
            .map(|t| match t.cached_child() {
                Some(child) => Ok(child.clone()),
                None => {
                    let target = t.child_ref().target();
                    let value = loaded.get(&target).cloned().ok_or(ValueError::NotFound(target))?;
                    Self::from_value(value, t.child_ref().target_type().kind())
                }
            })
            .collect()
    }

    /// Concatenate children `start..start + len` into one in-memory node
    /// one level down.
    pub fn composite_child(&self, vr: &dyn ValueReader, start: usize, len: usize) -> ValueResult<Self> {
        if self.is_leaf() {
            return Err(ValueError::Decode(DecodeError::Malformed(
                "composite child of a leaf sequence".into(),
            )));
        }
        let children = self.children(vr, start, start + len)?;
        let level = self.level() - 1;
        let kind = self.kind();
        let items = if level > 0 {
            SequenceItems::Tuples(children.iter().flat_map(|c| c.tuples().iter().cloned()).collect())
        } else {
            match kind {
                Kind::Blob => {
                    let mut bytes = BytesMut::new();
                    for child in &children {
                        if let SequenceItems::Bytes(b) = child.items() {
                            bytes.extend_from_slice(b);
                        }
                    }
                    SequenceItems::Bytes(bytes.freeze())
                }
                Kind::Map => {
                    let mut entries = Vec::new();
                    for child in &children {
                        if let SequenceItems::Entries(e) = child.items() {
                            entries.extend(e.iter().cloned());
                        }
                    }
                    SequenceItems::Entries(entries)
                }
                _ => {
                    let mut values = Vec::new();
                    for child in &children {
                        if let SequenceItems::Values(v) = child.items() {
                            values.extend(v.iter().cloned());
                        }
                    }
                    SequenceItems::Values(values)
                }
            }
        };
        Ok(Self::new(kind, level, items))
    }

    /// Hash of this node's encoding. Computed once.
    pub fn hash(&self) -> Hash {
        *self.0.hash.get_or_init(|| {
            let mut enc = Encoder::new();
            enc.write_sequence(self);
            Hash::of(enc.as_bytes())
        })
    }

    pub fn walk_refs(&self, f: &mut dyn FnMut(&Ref)) {
        match &self.0.items {
            SequenceItems::Values(values) => values.iter().for_each(|v| v.walk_refs(f)),
            SequenceItems::Entries(entries) => {
                for (k, v) in entries {
                    k.walk_refs(f);
                    v.walk_refs(f);
                }
            }
            SequenceItems::Tuples(tuples) => tuples.iter().for_each(|t| f(t.child_ref())),
            SequenceItems::Bytes(_) => {}
        }
    }

    /// Element type of a `List` or `Set` node.
    pub(crate) fn elem_type_in(&self, stack: &mut Vec<String>) -> Type {
        match &self.0.items {
            SequenceItems::Values(values) => {
                let types: Vec<Type> = values.iter().map(|v| v.type_in(stack)).collect();
                Type::union(types)
            }
            SequenceItems::Tuples(tuples) => {
                let types: Vec<Type> = tuples
                    .iter()
                    .filter_map(|t| t.child_ref().target_type().elem())
                    .map(|t| t.recycle(stack))
                    .collect();
                Type::union(types)
            }
            _ => Type::union([]),
        }
    }

    /// Key and value types of a `Map` node.
    pub(crate) fn entry_types_in(&self, stack: &mut Vec<String>) -> (Type, Type) {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        match &self.0.items {
            SequenceItems::Entries(entries) => {
                for (k, v) in entries {
                    keys.push(k.type_in(stack));
                    values.push(v.type_in(stack));
                }
            }
            SequenceItems::Tuples(tuples) => {
                for t in tuples {
                    if let Type::Map(k, v) = t.child_ref().target_type() {
                        keys.push(k.recycle(stack));
                        values.push(v.recycle(stack));
                    }
                }
            }
            _ => {}
        }
        (Type::union(keys), Type::union(values))
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.hash() == other.hash()
    }
}

impl Eq for Sequence {}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("kind", &self.kind())
            .field("level", &self.level())
            .field("len", &self.len())
            .field("hash", &self.hash())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValueStore;

    fn numbers(range: std::ops::Range<i32>) -> Vec<Item> {
        range.map(|i| Item::Value(Value::from(i))).collect()
    }

    #[test]
    fn from_items_checks_shape() {
        let seq = Sequence::from_items(Kind::List, 0, numbers(0..3)).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.num_leaves(), 3);
        assert!(Sequence::from_items(Kind::Blob, 0, numbers(0..1)).is_err());
        assert!(Sequence::from_items(Kind::List, 1, numbers(0..1)).is_err());
    }

    #[test]
    fn search_finds_first_not_less() {
        let seq = Sequence::from_items(Kind::Set, 0, [1, 3, 5].map(|i| Item::Value(Value::from(i))).to_vec()).unwrap();
        assert_eq!(seq.search(&OrderedKey::of(&Value::from(0))), 0);
        assert_eq!(seq.search(&OrderedKey::of(&Value::from(3))), 1);
        assert_eq!(seq.search(&OrderedKey::of(&Value::from(4))), 2);
        assert_eq!(seq.search(&OrderedKey::of(&Value::from(9))), 3);
    }

    #[test]
    fn meta_offsets_accumulate() {
        let vs = ValueStore::in_memory().unwrap();
        let mut tuples = Vec::new();
        for (i, n) in [3u64, 2, 4].iter().enumerate() {
            let leaf = Sequence::from_items(Kind::List, 0, numbers(0..*n as i32 + i as i32)).unwrap();
            let child_ref = crate::store::ValueWriter::write_value(&vs, &leaf.to_value()).unwrap();
            tuples.push(MetaTuple::new(child_ref, OrderedKey::from_count(leaf.num_leaves()), leaf.num_leaves()));
        }
        let meta = Sequence::new(Kind::List, 1, SequenceItems::Tuples(tuples));
        assert_eq!(meta.num_leaves(), 3 + 3 + 6);
        assert_eq!(meta.cumulative_leaves(0), 3);
        assert_eq!(meta.cumulative_leaves(1), 6);

        let composite = meta.composite_child(&vs, 1, 2).unwrap();
        assert!(composite.is_leaf());
        assert_eq!(composite.len(), 9);
        assert_eq!(composite.item(0), Some(Item::Value(Value::from(0))));
    }

    #[test]
    fn hash_matches_value_hash() {
        let seq = Sequence::from_items(Kind::List, 0, numbers(0..10)).unwrap();
        assert_eq!(seq.hash(), seq.to_value().hash());
        assert_eq!(seq.hash(), Hash::of(&seq.to_value().encode()));
    }

    #[test]
    fn empty_sequences_by_kind() {
        assert!(matches!(Sequence::empty(Kind::Blob).items(), SequenceItems::Bytes(_)));
        assert!(matches!(Sequence::empty(Kind::Map).items(), SequenceItems::Entries(_)));
        assert_eq!(Sequence::empty(Kind::Set).num_leaves(), 0);
    }
}
