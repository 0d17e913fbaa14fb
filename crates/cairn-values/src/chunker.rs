//! Builds and edits prolly trees one item at a time.
//!
//! # Design Rules
//!
//! - One [`Chunker`] per tree level; each owns its parent, created lazily
//!   the first time a chunk boundary fires.
//! - A boundary closes the current chunk and pushes a meta tuple for it up to
//!   the parent. Meta levels never close a chunk holding a single tuple.
//! - Editing resumes from a cursor: the items of the chunk before the cursor
//!   are replayed, edits are applied, and old items are re-appended until a
//!   boundary lands on the end of an old chunk. From there on the old tree is
//!   reused untouched, so any edit history yields the same tree as building
//!   from scratch.
//! - Chunks are written to the store as they are produced, except the first
//!   chunk of each level, which is held in memory until a second chunk shows
//!   up. A level that only ever produced one chunk may end up as (or above)
//!   the root, and such chunks are never written.

use std::cmp::Ordering;

use crate::cursor::Cursor;
use crate::error::{DecodeError, ValueError, ValueResult};
use crate::kind::Kind;
use crate::meta_tuple::MetaTuple;
use crate::ordered_key::OrderedKey;
use crate::reference::Ref;
use crate::rolling::RollingHasher;
use crate::sequence::{Item, Sequence};
use crate::store::ValueReadWriter;

/// Incremental builder for one level of a prolly tree.
pub struct Chunker<'a> {
    vw: &'a dyn ValueReadWriter,
    kind: Kind,
    level: u64,
    cur: Option<Cursor>,
    current: Vec<Item>,
    hasher: RollingHasher,
    parent: Option<Box<Chunker<'a>>>,
    first_chunk: Option<Sequence>,
    emitted: u64,
}

impl<'a> Chunker<'a> {
    /// Start an empty tree of `kind`.
    pub fn new(vw: &'a dyn ValueReadWriter, kind: Kind) -> Self {
        Self::at_level(vw, kind, 0)
    }

    fn at_level(vw: &'a dyn ValueReadWriter, kind: Kind, level: u64) -> Self {
        Self {
            vw,
            kind,
            level,
            cur: None,
            current: Vec::new(),
            hasher: RollingHasher::new(level, kind == Kind::Blob && level == 0),
            parent: None,
            first_chunk: None,
            emitted: 0,
        }
    }

    /// Start editing an existing tree at the cursor position.
    pub fn resume(vw: &'a dyn ValueReadWriter, kind: Kind, cur: Cursor) -> ValueResult<Self> {
        let mut chunker = Self::new(vw, kind);
        chunker.resume_from(cur)?;
        Ok(chunker)
    }

    fn resume_from(&mut self, cur: Cursor) -> ValueResult<()> {
        if let Some(parent_cur) = cur.parent() {
            let mut parent = Self::at_level(self.vw, self.kind, self.level + 1);
            parent.resume_from(parent_cur)?;
            self.parent = Some(Box::new(parent));
        }
        let upto = cur.idx().max(0) as usize;
        let seq = cur.seq().clone();
        self.cur = Some(cur);
        for i in 0..upto {
            if let Some(item) = seq.item(i) {
                self.append(item)?;
            }
        }
        Ok(())
    }

    /// Append one item. Returns `true` if it closed a chunk.
    pub fn append(&mut self, item: Item) -> ValueResult<bool> {
        self.hasher.hash_item(&item);
        self.current.push(item);
        if self.hasher.crossed_boundary() && (self.level == 0 || self.current.len() > 1) {
            self.handle_boundary()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop the item under the cursor.
    pub fn skip(&mut self) -> ValueResult<()> {
        let vw = self.vw;
        let vr = vw.as_reader();
        let Some(cur) = self.cur.as_mut() else {
            return Ok(());
        };
        let leaving_chunk = cur.at_last_item();
        cur.advance(vr)?;
        if leaving_chunk {
            if let Some(parent) = self.parent.as_mut() {
                parent.skip()?;
            }
        }
        Ok(())
    }

    /// Copy old items up to (not including) `next`.
    ///
    /// Once a boundary lands on the end of an old chunk, whole chunks between
    /// here and `next` are copied at the parent level instead.
    pub fn advance_to(&mut self, next: &Cursor) -> ValueResult<()> {
        loop {
            let (item, at_last) = match self.cur.as_ref() {
                Some(cur) if cur.compare(next) == Ordering::Less => match cur.current() {
                    Some(item) => (item, cur.at_last_item()),
                    None => return Ok(()),
                },
                _ => return Ok(()),
            };
            let boundary = self.append(item)?;
            if boundary && at_last {
                let cur_parent = self.cur.as_ref().and_then(Cursor::parent);
                if let (Some(cur_parent), Some(next_parent)) = (cur_parent, next.parent()) {
                    if cur_parent.compare(&next_parent) == Ordering::Less {
                        if let Some(parent) = self.parent.as_mut() {
                            parent.skip()?;
                            parent.advance_to(&next_parent)?;
                        }
                        let mut restart = next.clone();
                        restart.set_idx(0);
                        self.cur = Some(restart);
                        continue;
                    }
                }
            }
            self.skip()?;
        }
    }

    /// Replace the cursor at this level and above with `cur` and its ancestors.
    pub(crate) fn splice_cursor(&mut self, cur: Option<Cursor>) -> ValueResult<()> {
        let parent_cur = cur.as_ref().and_then(Cursor::parent);
        self.cur = cur;
        if parent_cur.is_some() && self.parent.is_none() {
            self.parent = Some(Box::new(Self::at_level(self.vw, self.kind, self.level + 1)));
        }
        if let Some(parent) = self.parent.as_mut() {
            parent.splice_cursor(parent_cur)?;
        }
        Ok(())
    }

    /// Finish the tree and return its root. The root itself is not written.
    pub fn done(mut self) -> ValueResult<Sequence> {
        let root = self.finish()?;
        for tuple in root.tuples() {
            if let Some(child) = tuple.cached_child() {
                write_tree(self.vw, child)?;
            }
        }
        Ok(root)
    }

    fn finish(&mut self) -> ValueResult<Sequence> {
        self.finalize_cursor()?;

        let parent_pending = self.parent.as_ref().is_some_and(|p| p.any_pending());
        if parent_pending {
            if !self.current.is_empty() {
                self.handle_boundary()?;
            }
            if let Some(parent) = self.parent.as_mut() {
                return parent.finish();
            }
        }

        if self.level == 0 || self.current.len() > 1 {
            return Sequence::from_items(self.kind, self.level, std::mem::take(&mut self.current));
        }

        // A lone tuple: the root is the first node below it with more than one item.
        let mut tuple = match self.current.pop() {
            Some(Item::Tuple(t)) => t,
            Some(other) => return Err(misplaced(&other)),
            None => return Ok(Sequence::empty(self.kind)),
        };
        let vw = self.vw;
        let vr = vw.as_reader();
        loop {
            let child = tuple.child_sequence(vr)?;
            if child.is_leaf() || child.len() > 1 {
                return Ok(child);
            }
            match child.tuple(0) {
                Some(t) => tuple = t.clone(),
                None => return Ok(child),
            }
        }
    }

    /// Re-append old items after the last edit until the new chunking meets
    /// an old chunk boundary, or the old tree runs out.
    fn finalize_cursor(&mut self) -> ValueResult<()> {
        loop {
            let Some(cur) = self.cur.as_ref() else {
                return Ok(());
            };
            let Some(item) = cur.current() else {
                // At the end: the last old chunk was replayed in full.
                if let Some(parent) = self.parent.as_mut() {
                    parent.skip()?;
                }
                return Ok(());
            };
            let at_last = cur.at_last_item();
            let boundary = self.append(item)?;
            self.skip()?;
            if boundary && at_last {
                return Ok(());
            }
        }
    }

    fn any_pending(&self) -> bool {
        !self.current.is_empty() || self.parent.as_ref().is_some_and(|p| p.any_pending())
    }

    fn handle_boundary(&mut self) -> ValueResult<()> {
        self.hasher.reset();
        let items = std::mem::take(&mut self.current);
        let (seq, tuple) = self.make_chunk(items)?;
        let tuple = if self.emitted == 0 {
            self.first_chunk = Some(seq.clone());
            tuple.with_child(seq)
        } else {
            if let Some(first) = self.first_chunk.take() {
                write_tree(self.vw, &first)?;
            }
            write_tree(self.vw, &seq)?;
            tuple
        };
        self.emitted += 1;

        let (vw, kind, level) = (self.vw, self.kind, self.level);
        let parent = self
            .parent
            .get_or_insert_with(|| Box::new(Chunker::at_level(vw, kind, level + 1)));
        parent.append(Item::Tuple(tuple))?;
        Ok(())
    }

    fn make_chunk(&self, items: Vec<Item>) -> ValueResult<(Sequence, MetaTuple)> {
        let seq = Sequence::from_items(self.kind, self.level, items)?;
        let num_leaves = seq.num_leaves();
        let key = if self.kind.is_ordered_collection() {
            seq.key_at(seq.len().saturating_sub(1))
                .ok_or_else(|| ValueError::Decode(DecodeError::Malformed("empty chunk".into())))?
        } else {
            OrderedKey::from_count(num_leaves)
        };
        let child_ref = Ref::new(&seq.to_value());
        Ok((seq, MetaTuple::new(child_ref, key, num_leaves)))
    }
}

/// Write `seq` after any in-memory children it still carries.
fn write_tree(vw: &dyn ValueReadWriter, seq: &Sequence) -> ValueResult<()> {
    for tuple in seq.tuples() {
        if let Some(child) = tuple.cached_child() {
            write_tree(vw, child)?;
        }
    }
    vw.write_value(&seq.to_value())?;
    Ok(())
}

fn misplaced(item: &Item) -> ValueError {
    ValueError::Decode(DecodeError::Malformed(format!(
        "leaf item {item:?} left on a meta level"
    )))
}

/// Join two trees of the same kind, rechunking only around the seam.
pub fn concat(vw: &dyn ValueReadWriter, fst: &Sequence, snd: &Sequence) -> ValueResult<Sequence> {
    if fst.num_leaves() == 0 {
        return Ok(snd.clone());
    }
    if snd.num_leaves() == 0 {
        return Ok(fst.clone());
    }
    let vr = vw.as_reader();
    let mut chunker = Chunker::resume(vw, fst.kind(), Cursor::at_end(vr, fst)?)?;
    chunker.splice_cursor(Some(Cursor::at_start(vr, snd)?))?;
    chunker.done()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValueStore;
    use crate::value::Value;

    fn build(vs: &ValueStore, range: std::ops::Range<i64>) -> Sequence {
        let mut ch = Chunker::new(vs, Kind::List);
        for i in range {
            ch.append(Item::Value(Value::from(i))).unwrap();
        }
        ch.done().unwrap()
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    #[test]
    fn empty_chunker_yields_empty_leaf() {
        let vs = ValueStore::in_memory().unwrap();
        let root = Chunker::new(&vs, Kind::Set).done().unwrap();
        assert!(root.is_leaf());
        assert!(root.is_empty());
        assert_eq!(root.kind(), Kind::Set);
    }

    #[test]
    fn building_is_deterministic() {
        let vs = ValueStore::in_memory().unwrap();
        let a = build(&vs, 0..20_000);
        let b = build(&vs, 0..20_000);
        assert!(a.is_meta());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.num_leaves(), 20_000);
    }

    #[test]
    fn root_is_not_written() {
        let vs = ValueStore::in_memory().unwrap();
        let root = build(&vs, 0..20_000);
        assert!(vs.cached_hint(&root.hash()).is_none());
        for t in root.tuples() {
            assert!(vs.cached_hint(&t.child_ref().target()).is_some());
        }
    }

    #[test]
    fn small_tree_writes_nothing() {
        let vs = ValueStore::in_memory().unwrap();
        let root = build(&vs, 0..10);
        assert!(root.is_leaf());
        assert_eq!(vs.pending_len(), 0);
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    #[test]
    fn resume_and_append_matches_fresh_build() {
        let vs = ValueStore::in_memory().unwrap();
        let head = build(&vs, 0..15_000);
        let mut ch = Chunker::resume(&vs, Kind::List, Cursor::at_end(&vs, &head).unwrap()).unwrap();
        for i in 15_000..20_000 {
            ch.append(Item::Value(Value::from(i))).unwrap();
        }
        assert_eq!(ch.done().unwrap().hash(), build(&vs, 0..20_000).hash());
    }

    #[test]
    fn skip_matches_fresh_build_without_item() {
        let vs = ValueStore::in_memory().unwrap();
        let full = build(&vs, 0..20_000);
        let mut ch = Chunker::resume(&vs, Kind::List, Cursor::at_index(&vs, &full, 7_000).unwrap()).unwrap();
        ch.skip().unwrap();
        let edited = ch.done().unwrap();

        let mut fresh = Chunker::new(&vs, Kind::List);
        for i in (0..20_000).filter(|i| *i != 7_000) {
            fresh.append(Item::Value(Value::from(i))).unwrap();
        }
        assert_eq!(edited.hash(), fresh.done().unwrap().hash());
    }

    #[test]
    fn removing_everything_yields_empty() {
        let vs = ValueStore::in_memory().unwrap();
        let full = build(&vs, 0..9_000);
        let mut ch = Chunker::resume(&vs, Kind::List, Cursor::at_start(&vs, &full).unwrap()).unwrap();
        for _ in 0..9_000 {
            ch.skip().unwrap();
        }
        let root = ch.done().unwrap();
        assert_eq!(root.num_leaves(), 0);
        assert_eq!(root.hash(), Sequence::empty(Kind::List).hash());
    }

    // -----------------------------------------------------------------------
    // Concatenation
    // -----------------------------------------------------------------------

    #[test]
    fn concat_matches_fresh_build() {
        let vs = ValueStore::in_memory().unwrap();
        for (split, total) in [(5, 30_000), (12_345, 30_000), (29_990, 30_000), (20_000, 20_003)] {
            let joined = concat(&vs, &build(&vs, 0..split), &build(&vs, split..total)).unwrap();
            assert_eq!(joined.hash(), build(&vs, 0..total).hash(), "split at {split}");
        }
    }

    #[test]
    fn concat_with_empty_is_identity() {
        let vs = ValueStore::in_memory().unwrap();
        let a = build(&vs, 0..100);
        let empty = Sequence::empty(Kind::List);
        assert_eq!(concat(&vs, &a, &empty).unwrap().hash(), a.hash());
        assert_eq!(concat(&vs, &empty, &a).unwrap().hash(), a.hash());
    }
}
