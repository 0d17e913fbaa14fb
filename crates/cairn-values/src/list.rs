use crate::chunker::{self, Chunker};
use crate::cursor::Cursor;
use crate::edit::{expect_value, items_from, splice_indexed};
use crate::error::{ValueError, ValueResult};
use crate::kind::Kind;
use crate::sequence::{Item, Sequence};
use crate::store::{ValueReadWriter, ValueReader};
use crate::value::Value;

/// An ordered sequence of values, addressed by position.
///
/// Immutable: every edit returns a new list sharing unchanged chunks with
/// the old one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct List {
    seq: Sequence,
}

impl List {
    pub fn new(vw: &dyn ValueReadWriter, values: impl IntoIterator<Item = Value>) -> ValueResult<Self> {
        let mut chunker = Chunker::new(vw, Kind::List);
        for v in values {
            chunker.append(Item::Value(v))?;
        }
        Ok(Self::from_sequence(chunker.done()?))
    }

    pub fn empty() -> Self {
        Self::from_sequence(Sequence::empty(Kind::List))
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

    fn check_index(&self, index: u64) -> ValueResult<()> {
        if index >= self.len() {
            return Err(ValueError::IndexOutOfBounds { index, len: self.len() });
        }
        Ok(())
    }

    pub fn get(&self, vr: &dyn ValueReader, index: u64) -> ValueResult<Value> {
        self.check_index(index)?;
        let cur = Cursor::at_index(vr, &self.seq, index)?;
        let item = cur.current().ok_or(ValueError::IndexOutOfBounds { index, len: self.len() })?;
        expect_value(item)
    }

    pub fn iter<'a>(&self, vr: &'a dyn ValueReader) -> ValueResult<impl Iterator<Item = ValueResult<Value>> + 'a> {
        self.iter_from(vr, 0)
    }

    /// Iterate from position `start`; empty if `start >= len`.
    pub fn iter_from<'a>(
        &self,
        vr: &'a dyn ValueReader,
        start: u64,
    ) -> ValueResult<impl Iterator<Item = ValueResult<Value>> + 'a> {
        let cur = Cursor::at_index(vr, &self.seq, start)?;
        Ok(items_from(vr, cur).map(|item| item.and_then(expect_value)))
    }

    pub fn to_vec(&self, vr: &dyn ValueReader) -> ValueResult<Vec<Value>> {
        self.iter(vr)?.collect()
    }

    /// Remove `delete` values at `index` and insert `insert` in their place.
    ///
    /// `index` may equal `len()`; `delete` is clamped to the values available.
    pub fn splice(
        &self,
        vw: &dyn ValueReadWriter,
        index: u64,
        delete: u64,
        insert: impl IntoIterator<Item = Value>,
    ) -> ValueResult<Self> {
        let seq = splice_indexed(vw, &self.seq, index, delete, insert.into_iter().map(Item::Value))?;
        Ok(Self::from_sequence(seq))
    }

    pub fn insert(&self, vw: &dyn ValueReadWriter, index: u64, value: Value) -> ValueResult<Self> {
        self.splice(vw, index, 0, [value])
    }

    pub fn push(&self, vw: &dyn ValueReadWriter, value: Value) -> ValueResult<Self> {
        self.splice(vw, self.len(), 0, [value])
    }

    pub fn remove(&self, vw: &dyn ValueReadWriter, index: u64) -> ValueResult<Self> {
        self.check_index(index)?;
        self.splice(vw, index, 1, [])
    }

    /// Remove values `start..end`.
    pub fn remove_range(&self, vw: &dyn ValueReadWriter, start: u64, end: u64) -> ValueResult<Self> {
        if start > end || end > self.len() {
            return Err(ValueError::IndexOutOfBounds { index: end, len: self.len() });
        }
        self.splice(vw, start, end - start, [])
    }

    /// Replace the value at `index`.
    pub fn set(&self, vw: &dyn ValueReadWriter, index: u64, value: Value) -> ValueResult<Self> {
        self.check_index(index)?;
        self.splice(vw, index, 1, [value])
    }

    /// This list followed by `other`; only chunks near the seam are rebuilt.
    pub fn concat(&self, vw: &dyn ValueReadWriter, other: &List) -> ValueResult<Self> {
        Ok(Self::from_sequence(chunker::concat(vw, &self.seq, &other.seq)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValueStore;

    fn numbers(vs: &ValueStore, range: std::ops::Range<i64>) -> List {
        List::new(vs, range.map(Value::from)).unwrap()
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    #[test]
    fn empty_list() {
        let vs = ValueStore::in_memory().unwrap();
        let list = List::empty();
        assert!(list.is_empty());
        assert_eq!(list, List::new(&vs, []).unwrap());
        assert!(matches!(list.get(&vs, 0), Err(ValueError::IndexOutOfBounds { .. })));
        assert!(list.to_vec(&vs).unwrap().is_empty());
    }

    #[test]
    fn get_and_iterate_large_list() {
        let vs = ValueStore::in_memory().unwrap();
        let list = numbers(&vs, 0..25_000);
        assert_eq!(list.len(), 25_000);
        assert_eq!(list.get(&vs, 24_999).unwrap(), Value::from(24_999));
        let tail: Vec<Value> = list.iter_from(&vs, 24_998).unwrap().collect::<ValueResult<_>>().unwrap();
        assert_eq!(tail, vec![Value::from(24_998), Value::from(24_999)]);
        assert_eq!(list.iter(&vs).unwrap().count(), 25_000);
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    #[test]
    fn edits_are_canonical() {
        let vs = ValueStore::in_memory().unwrap();
        let list = numbers(&vs, 0..20_000);
        let edited = list
            .insert(&vs, 10_000, Value::from("x"))
            .unwrap()
            .remove(&vs, 0)
            .unwrap()
            .push(&vs, Value::from(true))
            .unwrap();

        let mut expected: Vec<Value> = (1..10_000).map(Value::from).collect();
        expected.push(Value::from("x"));
        expected.extend((10_000..20_000).map(Value::from));
        expected.push(Value::from(true));
        assert_eq!(edited, List::new(&vs, expected).unwrap());
    }

    #[test]
    fn set_replaces_one_value() {
        let vs = ValueStore::in_memory().unwrap();
        let list = numbers(&vs, 0..100);
        let changed = list.set(&vs, 50, Value::from(-1)).unwrap();
        assert_eq!(changed.get(&vs, 50).unwrap(), Value::from(-1));
        assert_eq!(changed.len(), 100);
        assert!(matches!(list.set(&vs, 100, Value::from(0)), Err(ValueError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn remove_range_and_splice() {
        let vs = ValueStore::in_memory().unwrap();
        let list = numbers(&vs, 0..30_000);
        let removed = list.remove_range(&vs, 1_000, 29_000).unwrap();
        let expected: Vec<i64> = (0..1_000).chain(29_000..30_000).collect();
        assert_eq!(removed, List::new(&vs, expected.into_iter().map(Value::from)).unwrap());
        assert!(list.remove_range(&vs, 5, 4).is_err());

        let restored = removed.splice(&vs, 1_000, 0, (1_000..29_000).map(Value::from)).unwrap();
        assert_eq!(restored, list);
    }

    #[test]
    fn concat_equals_single_build() {
        let vs = ValueStore::in_memory().unwrap();
        let joined = numbers(&vs, 0..7_777).concat(&vs, &numbers(&vs, 7_777..22_000)).unwrap();
        assert_eq!(joined, numbers(&vs, 0..22_000));
    }
}
