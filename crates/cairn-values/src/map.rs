use std::collections::BTreeMap;

use crate::chunker::Chunker;
use crate::cursor::Cursor;
use crate::edit::{apply_ordered, expect_entry, items_from, sort_dedup_last};
use crate::error::ValueResult;
use crate::kind::Kind;
use crate::ordered_key::OrderedKey;
use crate::sequence::{Item, Sequence};
use crate::store::{ValueReadWriter, ValueReader};
use crate::value::Value;

/// A sorted key/value collection, ordered by the [`OrderedKey`] of each key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Map {
    seq: Sequence,
}

impl Map {
    /// Build a map; for repeated keys the last entry wins.
    pub fn new(vw: &dyn ValueReadWriter, entries: impl IntoIterator<Item = (Value, Value)>) -> ValueResult<Self> {
        let entries = sort_dedup_last(entries.into_iter().collect(), |(k, _)| OrderedKey::of(k));
        let mut chunker = Chunker::new(vw, Kind::Map);
        for (k, v) in entries {
            chunker.append(Item::Entry(k, v))?;
        }
        Ok(Self::from_sequence(chunker.done()?))
    }

    pub fn empty() -> Self {
        Self::from_sequence(Sequence::empty(Kind::Map))
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

    pub fn get(&self, vr: &dyn ValueReader, key: &Value) -> ValueResult<Option<Value>> {
        let wanted = OrderedKey::of(key);
        let cur = Cursor::at_key(vr, &self.seq, &wanted)?;
        match cur.current() {
            Some(Item::Entry(k, v)) if OrderedKey::of(&k) == wanted => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn contains_key(&self, vr: &dyn ValueReader, key: &Value) -> ValueResult<bool> {
        Ok(self.get(vr, key)?.is_some())
    }

    /// Entry with the smallest key.
    pub fn first(&self, vr: &dyn ValueReader) -> ValueResult<Option<(Value, Value)>> {
        Cursor::at_start(vr, &self.seq)?.current().map(expect_entry).transpose()
    }

    pub fn iter<'a>(
        &self,
        vr: &'a dyn ValueReader,
    ) -> ValueResult<impl Iterator<Item = ValueResult<(Value, Value)>> + 'a> {
        let cur = Cursor::at_start(vr, &self.seq)?;
        Ok(items_from(vr, cur).map(|item| item.and_then(expect_entry)))
    }

    /// Iterate entries whose key is `>= from`.
    pub fn iter_from<'a>(
        &self,
        vr: &'a dyn ValueReader,
        from: &Value,
    ) -> ValueResult<impl Iterator<Item = ValueResult<(Value, Value)>> + 'a> {
        let cur = Cursor::at_key(vr, &self.seq, &OrderedKey::of(from))?;
        Ok(items_from(vr, cur).map(|item| item.and_then(expect_entry)))
    }

    pub fn to_vec(&self, vr: &dyn ValueReader) -> ValueResult<Vec<(Value, Value)>> {
        self.iter(vr)?.collect()
    }

    /// Insert or replace the entry for `key`.
    pub fn set(&self, vw: &dyn ValueReadWriter, key: Value, value: Value) -> ValueResult<Self> {
        self.edit().set(key, value).apply(vw)
    }

    pub fn remove(&self, vw: &dyn ValueReadWriter, key: &Value) -> ValueResult<Self> {
        self.edit().remove(key).apply(vw)
    }

    /// Batch several edits into one pass over the tree.
    pub fn edit(&self) -> MapEditor {
        MapEditor {
            map: self.clone(),
            edits: BTreeMap::new(),
        }
    }
}

/// Buffered sets and removals against a [`Map`].
#[derive(Debug)]
pub struct MapEditor {
    map: Map,
    edits: BTreeMap<OrderedKey, Option<(Value, Value)>>,
}

impl MapEditor {
    pub fn set(mut self, key: Value, value: Value) -> Self {
        self.edits.insert(OrderedKey::of(&key), Some((key, value)));
        self
    }

    pub fn remove(mut self, key: &Value) -> Self {
        self.edits.insert(OrderedKey::of(key), None);
        self
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply(self, vw: &dyn ValueReadWriter) -> ValueResult<Map> {
        let edits = self
            .edits
            .into_iter()
            .map(|(k, e)| (k, e.map(|(key, value)| Item::Entry(key, value))));
        Ok(Map::from_sequence(apply_ordered(vw, &self.map.seq, edits)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValueStore;

    fn squares(vs: &ValueStore, n: i64) -> Map {
        Map::new(vs, (0..n).map(|i| (Value::from(i), Value::from(i * i)))).unwrap()
    }

    #[test]
    fn new_sorts_and_last_entry_wins() {
        let vs = ValueStore::in_memory().unwrap();
        let map = Map::new(
            &vs,
            [("b", 1), ("a", 2), ("b", 3)].map(|(k, v)| (Value::from(k), Value::from(v))),
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.to_vec(&vs).unwrap(),
            vec![(Value::from("a"), Value::from(2)), (Value::from("b"), Value::from(3))]
        );
        assert_eq!(map.first(&vs).unwrap(), Some((Value::from("a"), Value::from(2))));
    }

    #[test]
    fn get_in_large_map() {
        let vs = ValueStore::in_memory().unwrap();
        let map = squares(&vs, 20_000);
        assert!(map.sequence().is_meta());
        assert_eq!(map.get(&vs, &Value::from(12_345)).unwrap(), Some(Value::from(12_345i64 * 12_345)));
        assert_eq!(map.get(&vs, &Value::from(-1)).unwrap(), None);
        assert!(map.contains_key(&vs, &Value::from(0)).unwrap());
        assert!(!map.contains_key(&vs, &Value::from("0")).unwrap());
    }

    #[test]
    fn set_replaces_and_remove_deletes() {
        let vs = ValueStore::in_memory().unwrap();
        let map = squares(&vs, 10_000);
        let edited = map
            .set(&vs, Value::from(5), Value::from("five"))
            .unwrap()
            .remove(&vs, &Value::from(6))
            .unwrap();
        assert_eq!(edited.get(&vs, &Value::from(5)).unwrap(), Some(Value::from("five")));
        assert_eq!(edited.get(&vs, &Value::from(6)).unwrap(), None);
        assert_eq!(edited.len(), 9_999);

        let rebuilt = Map::new(
            &vs,
            (0..10_000i64)
                .filter(|i| *i != 6)
                .map(|i| (Value::from(i), if i == 5 { Value::from("five") } else { Value::from(i * i) })),
        )
        .unwrap();
        assert_eq!(edited, rebuilt);
    }

    #[test]
    fn editor_applies_in_one_pass() {
        let vs = ValueStore::in_memory().unwrap();
        let map = squares(&vs, 3_000);
        let edited = map
            .edit()
            .set(Value::from(-5), Value::from(25))
            .remove(&Value::from(2_999))
            .set(Value::from("k"), Value::from(true))
            .apply(&vs)
            .unwrap();
        let keys: Vec<Value> = edited.iter(&vs).unwrap().map(|e| e.unwrap().0).take(2).collect();
        assert_eq!(keys, vec![Value::from(-5), Value::from(0)]);
        let tail: Vec<(Value, Value)> = edited
            .iter_from(&vs, &Value::from(2_998))
            .unwrap()
            .collect::<ValueResult<_>>()
            .unwrap();
        assert_eq!(
            tail,
            vec![
                (Value::from(2_998), Value::from(2_998i64 * 2_998)),
                (Value::from("k"), Value::from(true))
            ]
        );
    }

    #[test]
    fn setting_same_value_keeps_map() {
        let vs = ValueStore::in_memory().unwrap();
        let map = squares(&vs, 100);
        assert_eq!(map.set(&vs, Value::from(3), Value::from(9)).unwrap().sequence().hash(), map.sequence().hash());
    }
}
