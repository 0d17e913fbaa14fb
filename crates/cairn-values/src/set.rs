use std::collections::BTreeMap;

use crate::chunker::Chunker;
use crate::cursor::Cursor;
use crate::edit::{apply_ordered, expect_value, items_from, sort_dedup_last};
use crate::error::ValueResult;
use crate::kind::Kind;
use crate::ordered_key::OrderedKey;
use crate::sequence::{Item, Sequence};
use crate::store::{ValueReadWriter, ValueReader};
use crate::value::Value;

/// A sorted collection of distinct values, ordered by [`OrderedKey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Set {
    seq: Sequence,
}

impl Set {
    /// Build a set; duplicates collapse to one member.
    pub fn new(vw: &dyn ValueReadWriter, values: impl IntoIterator<Item = Value>) -> ValueResult<Self> {
        let values = sort_dedup_last(values.into_iter().collect(), OrderedKey::of);
        let mut chunker = Chunker::new(vw, Kind::Set);
        for v in values {
            chunker.append(Item::Value(v))?;
        }
        Ok(Self::from_sequence(chunker.done()?))
    }

    pub fn empty() -> Self {
        Self::from_sequence(Sequence::empty(Kind::Set))
    }

    pub(crate) fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, vr: &dyn ValueReader, value: &Value) -> ValueResult<bool> {
        let key = OrderedKey::of(value);
        let cur = Cursor::at_key(vr, &self.seq, &key)?;
        Ok(cur.current().and_then(|item| item.ordered_key()) == Some(key))
    }

    /// Smallest member.
    pub fn first(&self, vr: &dyn ValueReader) -> ValueResult<Option<Value>> {
        Cursor::at_start(vr, &self.seq)?.current().map(expect_value).transpose()
    }

    pub fn iter<'a>(&self, vr: &'a dyn ValueReader) -> ValueResult<impl Iterator<Item = ValueResult<Value>> + 'a> {
        let cur = Cursor::at_start(vr, &self.seq)?;
        Ok(items_from(vr, cur).map(|item| item.and_then(expect_value)))
    }

    /// Iterate members `>= from`.
    pub fn iter_from<'a>(
        &self,
        vr: &'a dyn ValueReader,
        from: &Value,
    ) -> ValueResult<impl Iterator<Item = ValueResult<Value>> + 'a> {
        let cur = Cursor::at_key(vr, &self.seq, &OrderedKey::of(from))?;
        Ok(items_from(vr, cur).map(|item| item.and_then(expect_value)))
    }

    pub fn to_vec(&self, vr: &dyn ValueReader) -> ValueResult<Vec<Value>> {
        self.iter(vr)?.collect()
    }

    pub fn insert(&self, vw: &dyn ValueReadWriter, value: Value) -> ValueResult<Self> {
        self.edit().insert(value).apply(vw)
    }

    pub fn remove(&self, vw: &dyn ValueReadWriter, value: &Value) -> ValueResult<Self> {
        self.edit().remove(value).apply(vw)
    }

    /// Batch several edits into one pass over the tree.
    pub fn edit(&self) -> SetEditor {
        SetEditor {
            set: self.clone(),
            edits: BTreeMap::new(),
        }
    }
}

/// Buffered inserts and removals against a [`Set`].
///
/// Later edits of the same member win. Nothing is written until
/// [`SetEditor::apply`].
#[derive(Debug)]
pub struct SetEditor {
    set: Set,
    edits: BTreeMap<OrderedKey, Option<Value>>,
}

impl SetEditor {
    pub fn insert(mut self, value: Value) -> Self {
        self.edits.insert(OrderedKey::of(&value), Some(value));
        self
    }

    pub fn remove(mut self, value: &Value) -> Self {
        self.edits.insert(OrderedKey::of(value), None);
        self
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply(self, vw: &dyn ValueReadWriter) -> ValueResult<Set> {
        let edits = self.edits.into_iter().map(|(k, v)| (k, v.map(Item::Value)));
        Ok(Set::from_sequence(apply_ordered(vw, &self.set.seq, edits)?))
    }
}
