//! Positioned traversal of a prolly tree.
//!
//! A [`Cursor`] keeps one frame per tree level, root first. Each frame holds
//! a node and an index into it; the leaf frame's index may sit one past the
//! end (or one before the start) of the tree, while interior frames always
//! point at a real item.

use std::cmp::Ordering;
use std::sync::Arc;

use cairn_types::Hash;
use parking_lot::Mutex;

use crate::error::{DecodeError, ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::sequence::{Item, Sequence};
use crate::store::ValueReader;

#[derive(Clone)]
struct Frame {
    seq: Sequence,
    idx: isize,
}

/// Asks the reader to prefetch sibling leaves while a cursor walks forward.
struct ReadAhead {
    batch: usize,
    /// Parent node and the child index prefetch has been requested up to.
    horizon: Mutex<Option<(Hash, usize)>>,
}

/// A position in a sequence tree.
#[derive(Clone)]
pub struct Cursor {
    frames: Vec<Frame>,
    read_ahead: Option<Arc<ReadAhead>>,
}

impl ReadAhead {
    /// Keep up to `batch` children past `idx` requested from the reader.
    /// Requests are issued half a batch before the previous one runs out.
    fn request(&self, vr: &dyn ValueReader, parent: &Sequence, idx: usize) {
        let parent_hash = parent.hash();
        let mut horizon = self.horizon.lock();
        let from = match *horizon {
            Some((h, end)) if h == parent_hash && idx + self.batch / 2 < end => return,
            Some((h, end)) if h == parent_hash => end.max(idx + 1),
            _ => idx + 1,
        };
        let to = (idx + 1 + self.batch).min(parent.len());
        *horizon = Some((parent_hash, to));
        if from >= to {
            return;
        }
        let targets: Vec<Hash> = parent.tuples()[from..to]
            .iter()
            .filter(|t| t.cached_child().is_none())
            .map(|t| t.child_ref().target())
            .collect();
        if !targets.is_empty() {
            vr.prefetch(&targets);
        }
    }
}

impl Cursor {
    /// Position at leaf item `index`; past the end if `index >= num_leaves`.
    pub fn at_index(vr: &dyn ValueReader, root: &Sequence, index: u64) -> ValueResult<Self> {
        let mut frames = Vec::new();
        let mut seq = root.clone();
        let mut remaining = index;
        while seq.is_meta() {
            let len = seq.len();
            if len == 0 {
                return Err(empty_meta());
            }
            let (mut lo, mut hi) = (0, len);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if seq.cumulative_leaves(mid) > remaining {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            let idx = lo.min(len - 1);
            if idx > 0 {
                remaining -= seq.cumulative_leaves(idx - 1);
            }
            let child = seq.child_at(vr, idx)?;
            frames.push(Frame {
                seq,
                idx: idx as isize,
            });
            seq = child;
        }
        let idx = remaining.min(seq.len() as u64) as isize;
        frames.push(Frame { seq, idx });
        Ok(Self {
            frames,
            read_ahead: None,
        })
    }

    pub fn at_start(vr: &dyn ValueReader, root: &Sequence) -> ValueResult<Self> {
        Self::at_index(vr, root, 0)
    }

    /// One past the last leaf item.
    pub fn at_end(vr: &dyn ValueReader, root: &Sequence) -> ValueResult<Self> {
        Self::at_index(vr, root, root.num_leaves())
    }

    /// Position at the first item whose key is `>= key`.
    pub fn at_key(vr: &dyn ValueReader, root: &Sequence, key: &OrderedKey) -> ValueResult<Self> {
        let mut frames = Vec::new();
        let mut seq = root.clone();
        while seq.is_meta() {
            let len = seq.len();
            if len == 0 {
                return Err(empty_meta());
            }
            let idx = seq.search(key).min(len - 1);
            let child = seq.child_at(vr, idx)?;
            frames.push(Frame {
                seq,
                idx: idx as isize,
            });
            seq = child;
        }
        let idx = seq.search(key) as isize;
        frames.push(Frame { seq, idx });
        Ok(Self {
            frames,
            read_ahead: None,
        })
    }

    /// Prefetch up to `batch` leaves at a time when moving forward.
    pub fn with_read_ahead(mut self, batch: usize) -> Self {
        self.read_ahead = (batch > 0).then(|| {
            Arc::new(ReadAhead {
                batch,
                horizon: Mutex::new(None),
            })
        });
        self
    }

    /// Number of frames, equal to the height of the tree.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn leaf(&self) -> &Frame {
        // Constructors always push the leaf frame.
        &self.frames[self.frames.len() - 1]
    }

    /// Node under the leaf frame.
    pub fn seq(&self) -> &Sequence {
        &self.leaf().seq
    }

    /// Index within the leaf node.
    pub fn idx(&self) -> isize {
        self.leaf().idx
    }

    pub(crate) fn set_idx(&mut self, idx: isize) {
        let last = self.frames.len() - 1;
        self.frames[last].idx = idx;
    }

    pub fn valid(&self) -> bool {
        let f = self.leaf();
        f.idx >= 0 && (f.idx as usize) < f.seq.len()
    }

    pub fn current(&self) -> Option<Item> {
        self.frame_item(self.frames.len() - 1)
    }

    fn frame_item(&self, d: usize) -> Option<Item> {
        let f = &self.frames[d];
        usize::try_from(f.idx).ok().and_then(|i| f.seq.item(i))
    }

    /// True when the leaf index is the last item of its node.
    pub fn at_last_item(&self) -> bool {
        let f = self.leaf();
        f.idx == f.seq.len() as isize - 1
    }

    /// Absolute leaf position counted from the start of the tree.
    pub fn leaf_index(&self) -> u64 {
        let mut total = 0;
        for f in &self.frames[..self.frames.len() - 1] {
            if f.idx > 0 {
                total += f.seq.cumulative_leaves(f.idx as usize - 1);
            }
        }
        total + self.idx().max(0) as u64
    }

    /// Cursor over the parent level, if any.
    pub fn parent(&self) -> Option<Cursor> {
        self.ancestor(1)
    }

    /// Cursor `levels` above this one.
    pub fn ancestor(&self, levels: usize) -> Option<Cursor> {
        if levels >= self.frames.len() {
            return None;
        }
        Some(Cursor {
            frames: self.frames[..self.frames.len() - levels].to_vec(),
            read_ahead: self.read_ahead.clone(),
        })
    }

    /// Lexicographic comparison of frame indices.
    pub fn compare(&self, other: &Cursor) -> Ordering {
        for (a, b) in self.frames.iter().zip(&other.frames) {
            match a.idx.cmp(&b.idx) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.frames.len().cmp(&other.frames.len())
    }

    /// Step forward. Returns `false` once past the last item.
    pub fn advance(&mut self, vr: &dyn ValueReader) -> ValueResult<bool> {
        let d = self.frames.len() - 1;
        self.advance_frame(vr, d, true)
    }

    /// Step backward. Returns `false` once before the first item.
    pub fn retreat(&mut self, vr: &dyn ValueReader) -> ValueResult<bool> {
        let d = self.frames.len() - 1;
        self.retreat_frame(vr, d, true)
    }

    fn advance_frame(&mut self, vr: &dyn ValueReader, d: usize, allow_past_end: bool) -> ValueResult<bool> {
        let len = self.frames[d].seq.len() as isize;
        let idx = self.frames[d].idx;
        if idx < len - 1 {
            self.frames[d].idx += 1;
            return Ok(true);
        }
        if idx >= len {
            return Ok(false);
        }
        if d > 0 && self.advance_frame(vr, d - 1, false)? {
            self.sync(vr, d, true)?;
            self.frames[d].idx = 0;
            return Ok(true);
        }
        if allow_past_end {
            self.frames[d].idx = len;
        }
        Ok(false)
    }

    fn retreat_frame(&mut self, vr: &dyn ValueReader, d: usize, allow_before_start: bool) -> ValueResult<bool> {
        let idx = self.frames[d].idx;
        if idx > 0 {
            self.frames[d].idx -= 1;
            return Ok(true);
        }
        if idx < 0 {
            return Ok(false);
        }
        if d > 0 && self.retreat_frame(vr, d - 1, false)? {
            self.sync(vr, d, false)?;
            self.frames[d].idx = self.frames[d].seq.len() as isize - 1;
            return Ok(true);
        }
        if allow_before_start {
            self.frames[d].idx = -1;
        }
        Ok(false)
    }

    /// Reload frame `d` from the item its parent frame points at.
    fn sync(&mut self, vr: &dyn ValueReader, d: usize, forward: bool) -> ValueResult<()> {
        let parent = &self.frames[d - 1];
        let idx = usize::try_from(parent.idx).map_err(|_| {
            ValueError::Decode(DecodeError::Malformed("cursor parent before start".into()))
        })?;
        let child = self.fetch_child(vr, &parent.seq, idx, forward)?;
        self.frames[d].seq = child;
        Ok(())
    }

    fn fetch_child(&self, vr: &dyn ValueReader, parent: &Sequence, idx: usize, forward: bool) -> ValueResult<Sequence> {
        let tuple = parent.tuple(idx).ok_or(ValueError::IndexOutOfBounds {
            index: idx as u64,
            len: parent.len() as u64,
        })?;
        if let Some(child) = tuple.cached_child() {
            return Ok(child.clone());
        }
        if let Some(ra) = self.read_ahead.as_deref().filter(|_| forward && parent.level() == 1) {
            ra.request(vr, parent, idx);
        }
        tuple.child_sequence(vr)
    }

    /// After a subtree skip at the parent, point frame `d` at the first item
    /// of the new child, or past its end when the parent ran out.
    fn resync_after_skip(&mut self, vr: &dyn ValueReader, d: usize, has_more: bool, allow_past_end: bool) -> ValueResult<()> {
        self.sync(vr, d, true)?;
        let len = self.frames[d].seq.len() as isize;
        self.frames[d].idx = if has_more {
            0
        } else if allow_past_end {
            len
        } else {
            len - 1
        };
        Ok(())
    }

    /// Advance `a` and `b` in lockstep past every equal item.
    ///
    /// Whenever both cursors sit under identical parent chunks, the whole
    /// shared subtree is skipped without loading it.
    pub fn fast_forward(vr: &dyn ValueReader, a: &mut Cursor, b: &mut Cursor) -> ValueResult<()> {
        if a.valid() && b.valid() {
            let (da, db) = (a.frames.len() - 1, b.frames.len() - 1);
            Self::fast_forward_frames(vr, a, da, b, db, true)?;
        }
        Ok(())
    }

    fn fast_forward_frames(
        vr: &dyn ValueReader,
        a: &mut Cursor,
        da: usize,
        b: &mut Cursor,
        db: usize,
        allow_past_end: bool,
    ) -> ValueResult<(bool, bool)> {
        let (mut a_more, mut b_more) = (true, true);
        while a_more && b_more && same_item(a.frame_item(da), b.frame_item(db)) {
            if da > 0 && db > 0 && same_item(a.frame_item(da - 1), b.frame_item(db - 1)) {
                let (am, bm) = Self::fast_forward_frames(vr, a, da - 1, b, db - 1, false)?;
                a_more = am;
                b_more = bm;
                a.resync_after_skip(vr, da, am, allow_past_end)?;
                b.resync_after_skip(vr, db, bm, allow_past_end)?;
            } else {
                a_more = a.advance_frame(vr, da, allow_past_end)?;
                b_more = b.advance_frame(vr, db, allow_past_end)?;
            }
        }
        Ok((a_more, b_more))
    }

    /// Iterate items from the current position.
    pub fn items<'a>(self, vr: &'a dyn ValueReader) -> SequenceIter<'a> {
        SequenceIter {
            vr,
            cursor: self,
            failed: false,
        }
    }
}

fn same_item(a: Option<Item>, b: Option<Item>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

fn empty_meta() -> ValueError {
    ValueError::Decode(DecodeError::Malformed("meta sequence without tuples".into()))
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<isize> = self.frames.iter().map(|fr| fr.idx).collect();
        f.debug_struct("Cursor").field("path", &path).finish()
    }
}

/// Forward iterator over the items under a cursor.
pub struct SequenceIter<'a> {
    vr: &'a dyn ValueReader,
    cursor: Cursor,
    failed: bool,
}

impl Iterator for SequenceIter<'_> {
    type Item = ValueResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.cursor.current()?;
        if let Err(e) = self.cursor.advance(self.vr) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::List;
    use crate::set::Set;
    use crate::store::ValueStore;
    use crate::value::Value;

    fn big_list(vs: &ValueStore, n: i64) -> List {
        List::new(vs, (0..n).map(Value::from)).unwrap()
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    #[test]
    fn at_index_matches_leaf_index() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 20_000);
        assert!(list.sequence().is_meta());
        for i in [0u64, 1, 4_999, 12_345, 19_999] {
            let cur = Cursor::at_index(&vs, list.sequence(), i).unwrap();
            assert!(cur.valid());
            assert_eq!(cur.leaf_index(), i);
            assert_eq!(cur.current(), Some(Item::Value(Value::from(i))));
        }
        let end = Cursor::at_end(&vs, list.sequence()).unwrap();
        assert!(!end.valid());
        assert_eq!(end.leaf_index(), 20_000);
    }

    #[test]
    fn at_key_finds_first_not_less() {
        let vs = ValueStore::in_memory().unwrap();
        let set = Set::new(&vs, (0..10_000).map(|i| Value::from(i * 2))).unwrap();
        let cur = Cursor::at_key(&vs, set.sequence(), &OrderedKey::of(&Value::from(777))).unwrap();
        assert_eq!(cur.current(), Some(Item::Value(Value::from(778))));
        let past = Cursor::at_key(&vs, set.sequence(), &OrderedKey::of(&Value::from(1_000_000))).unwrap();
        assert!(!past.valid());
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    #[test]
    fn advance_visits_every_item_in_order() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 10_000);
        let items: Vec<Item> = Cursor::at_start(&vs, list.sequence())
            .unwrap()
            .with_read_ahead(4)
            .items(&vs)
            .collect::<ValueResult<_>>()
            .unwrap();
        assert_eq!(items.len(), 10_000);
        assert_eq!(items[9_999], Item::Value(Value::from(9_999)));
    }

    /// Delegates to a store and records every prefetch request.
    struct RecordingReader {
        inner: ValueStore,
        requested: Mutex<Vec<Hash>>,
    }

    impl ValueReader for RecordingReader {
        fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
            self.inner.read_value(hash)
        }

        fn prefetch(&self, hashes: &[Hash]) {
            self.requested.lock().extend_from_slice(hashes);
            self.inner.prefetch(hashes);
        }
    }

    #[test]
    fn forward_walk_requests_leaves_ahead_once() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 20_000);
        let reader = RecordingReader {
            inner: vs,
            requested: Mutex::new(Vec::new()),
        };
        let count = Cursor::at_start(&reader, list.sequence())
            .unwrap()
            .with_read_ahead(4)
            .items(&reader)
            .count();
        assert_eq!(count, 20_000);

        let requested = reader.requested.lock();
        assert!(!requested.is_empty());
        let unique: std::collections::HashSet<&Hash> = requested.iter().collect();
        assert_eq!(unique.len(), requested.len());
    }

    #[test]
    fn backward_walk_requests_nothing() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 20_000);
        let reader = RecordingReader {
            inner: vs,
            requested: Mutex::new(Vec::new()),
        };
        let mut cur = Cursor::at_index(&reader, list.sequence(), 19_999).unwrap().with_read_ahead(4);
        while cur.retreat(&reader).unwrap() {}
        assert!(reader.requested.lock().is_empty());
    }

    #[test]
    fn retreat_walks_back_across_chunks() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 8_000);
        let mut cur = Cursor::at_end(&vs, list.sequence()).unwrap();
        let mut seen = 0;
        while cur.retreat(&vs).unwrap() {
            seen += 1;
            assert_eq!(cur.leaf_index(), 8_000 - seen);
        }
        assert_eq!(seen, 8_000);
        assert_eq!(cur.idx(), -1);
        assert!(cur.advance(&vs).unwrap());
        assert_eq!(cur.current(), Some(Item::Value(Value::from(0))));
    }

    #[test]
    fn compare_orders_positions() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 10_000);
        let a = Cursor::at_index(&vs, list.sequence(), 100).unwrap();
        let b = Cursor::at_index(&vs, list.sequence(), 9_000).unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn parent_drops_leaf_frame() {
        let vs = ValueStore::in_memory().unwrap();
        let list = big_list(&vs, 10_000);
        let cur = Cursor::at_index(&vs, list.sequence(), 5).unwrap();
        let parent = cur.parent().expect("multi-level tree");
        assert_eq!(parent.depth(), cur.depth() - 1);
        assert!(matches!(parent.current(), Some(Item::Tuple(_))));
    }

    // -----------------------------------------------------------------------
    // Fast-forward
    // -----------------------------------------------------------------------

    #[test]
    fn fast_forward_stops_at_first_difference() {
        let vs = ValueStore::in_memory().unwrap();
        let a = big_list(&vs, 30_000);
        let b = a.set(&vs, 25_000, Value::from("changed")).unwrap();
        let mut ca = Cursor::at_start(&vs, a.sequence()).unwrap();
        let mut cb = Cursor::at_start(&vs, b.sequence()).unwrap();
        Cursor::fast_forward(&vs, &mut ca, &mut cb).unwrap();
        assert_eq!(ca.leaf_index(), 25_000);
        assert_eq!(cb.leaf_index(), 25_000);
        assert_eq!(cb.current(), Some(Item::Value(Value::from("changed"))));
    }

    #[test]
    fn fast_forward_identical_runs_to_end() {
        let vs = ValueStore::in_memory().unwrap();
        let a = big_list(&vs, 5_000);
        let mut ca = Cursor::at_start(&vs, a.sequence()).unwrap();
        let mut cb = ca.clone();
        Cursor::fast_forward(&vs, &mut ca, &mut cb).unwrap();
        assert!(!ca.valid());
        assert!(!cb.valid());
    }
}
