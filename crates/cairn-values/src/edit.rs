//! Shared edit paths for indexed and ordered collections.
//!
//! Every mutation resumes a [`Chunker`] on the old tree, so an edited tree is
//! byte-for-byte the tree a fresh build of the same content would produce.

use crate::chunker::Chunker;
use crate::cursor::Cursor;
use crate::error::{DecodeError, ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::sequence::{Item, Sequence};
use crate::store::{ValueReadWriter, ValueReader};
use crate::value::Value;

/// Replace `delete` leaf items at `index` with `insert`.
pub(crate) fn splice_indexed(
    vw: &dyn ValueReadWriter,
    root: &Sequence,
    index: u64,
    delete: u64,
    insert: impl IntoIterator<Item = Item>,
) -> ValueResult<Sequence> {
    let len = root.num_leaves();
    if index > len {
        return Err(ValueError::IndexOutOfBounds { index, len });
    }
    let delete = delete.min(len - index);
    let mut insert = insert.into_iter().peekable();
    if delete == 0 && insert.peek().is_none() {
        return Ok(root.clone());
    }
    let vr = vw.as_reader();
    let mut chunker = Chunker::resume(vw, root.kind(), Cursor::at_index(vr, root, index)?)?;
    for _ in 0..delete {
        chunker.skip()?;
    }
    for item in insert {
        chunker.append(item)?;
    }
    chunker.done()
}

/// Apply key-sorted edits to an ordered tree. `None` removes the key,
/// `Some(item)` inserts or replaces it.
pub(crate) fn apply_ordered(
    vw: &dyn ValueReadWriter,
    root: &Sequence,
    edits: impl IntoIterator<Item = (OrderedKey, Option<Item>)>,
) -> ValueResult<Sequence> {
    let vr = vw.as_reader();
    let mut chunker: Option<Chunker<'_>> = None;
    for (key, item) in edits {
        let at = Cursor::at_key(vr, root, &key)?;
        let existing = at.current().filter(|it| it.ordered_key().as_ref() == Some(&key));
        if existing == item {
            continue;
        }
        let mut ch = match chunker.take() {
            Some(mut ch) => {
                ch.advance_to(&at)?;
                ch
            }
            None => Chunker::resume(vw, root.kind(), at)?,
        };
        if existing.is_some() {
            ch.skip()?;
        }
        if let Some(item) = item {
            ch.append(item)?;
        }
        chunker = Some(ch);
    }
    match chunker {
        Some(ch) => ch.done(),
        None => Ok(root.clone()),
    }
}

/// Stable-sort `items` by key and keep the last item for each key.
pub(crate) fn sort_dedup_last<T>(items: Vec<T>, key: impl Fn(&T) -> OrderedKey) -> Vec<T> {
    let mut keyed: Vec<(OrderedKey, T)> = items.into_iter().map(|it| (key(&it), it)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out: Vec<(OrderedKey, T)> = Vec::with_capacity(keyed.len());
    for (k, it) in keyed {
        match out.last_mut() {
            Some(last) if last.0 == k => *last = (k, it),
            _ => out.push((k, it)),
        }
    }
    out.into_iter().map(|(_, it)| it).collect()
}

/// Items from the cursor onwards, with read-ahead when the reader wants it.
pub(crate) fn items_from<'a>(
    vr: &'a dyn ValueReader,
    cursor: Cursor,
) -> impl Iterator<Item = ValueResult<Item>> + 'a {
    let batch = vr.read_ahead();
    let cursor = if batch > 0 { cursor.with_read_ahead(batch) } else { cursor };
    cursor.items(vr)
}

pub(crate) fn expect_value(item: Item) -> ValueResult<Value> {
    match item {
        Item::Value(v) => Ok(v),
        other => Err(unexpected(other)),
    }
}

pub(crate) fn expect_entry(item: Item) -> ValueResult<(Value, Value)> {
    match item {
        Item::Entry(k, v) => Ok((k, v)),
        other => Err(unexpected(other)),
    }
}

fn unexpected(item: Item) -> ValueError {
    ValueError::Decode(DecodeError::Malformed(format!("unexpected leaf item {item:?}")))
}
