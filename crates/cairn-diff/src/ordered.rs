//! Key-level diff of ordered collections (`Set` and `Map`).
//!
//! # Algorithms
//!
//! - **Left-right**: walks both trees' leaves in lockstep, skipping shared
//!   subtrees without loading them. Streams changes immediately but does
//!   work proportional to the distance between changes.
//! - **Top-down**: aligns equal-height tree levels with [`calc_splices`] and
//!   only descends into the regions that differ. Fast for large diffs, but
//!   its first change arrives late.
//! - **Best**: runs both on worker threads and forwards left-right changes
//!   until top-down has produced more, then switches to top-down for the
//!   rest. Each algorithm emits changes in ascending key order.

use std::cmp::Ordering;
use std::thread::{self, ScopedJoinHandle};

use cairn_types::Hash;
use cairn_values::{
    cancellation, CancelSignal, Canceller, Cursor, DecodeError, Item, Map, OrderedKey, Sequence, Set, Value,
    ValueError, ValueReader,
};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::error::{DiffError, DiffResult};
use crate::splice::{calc_splices, DEFAULT_MAX_SPLICE_MATRIX_SIZE};

/// What happened to a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffChangeType {
    Added,
    Removed,
    Modified,
}

/// One key-level change. Values are set for maps and `None` for sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueChanged {
    pub change_type: DiffChangeType,
    pub key: Value,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl ValueChanged {
    fn added(key: Value, value: Option<Value>) -> Self {
        Self {
            change_type: DiffChangeType::Added,
            key,
            old_value: None,
            new_value: value,
        }
    }

    fn removed(key: Value, value: Option<Value>) -> Self {
        Self {
            change_type: DiffChangeType::Removed,
            key,
            old_value: value,
            new_value: None,
        }
    }

    fn modified(key: Value, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            change_type: DiffChangeType::Modified,
            key,
            old_value,
            new_value,
        }
    }
}

/// Send `msg` unless `stop` fires first. Returns `false` if the change was
/// not delivered.
pub(crate) fn send_change<T>(tx: &Sender<T>, stop: &CancelSignal, msg: T) -> bool {
    select! {
        send(tx, msg) -> res => res.is_ok(),
        recv(stop.receiver()) -> _ => false,
    }
}

fn check_ordered(last: &Sequence, current: &Sequence) -> DiffResult<()> {
    if last.kind() != current.kind() || !last.kind().is_ordered_collection() {
        return Err(DiffError::KindMismatch {
            last: last.kind(),
            current: current.kind(),
        });
    }
    Ok(())
}

fn split_item(item: Item) -> DiffResult<(Value, Option<Value>)> {
    match item {
        Item::Value(v) => Ok((v, None)),
        Item::Entry(k, v) => Ok((k, Some(v))),
        other => Err(DiffError::Value(ValueError::Decode(DecodeError::Malformed(format!(
            "{other:?} is not an ordered leaf item"
        ))))),
    }
}

// ---------------------------------------------------------------------------
// Left-right
// ---------------------------------------------------------------------------

/// Diff by walking both trees' leaves in key order.
///
/// Returns `Ok(false)` if stopped before finishing.
pub fn diff_ordered_left_right(
    vr: &dyn ValueReader,
    last: &Sequence,
    current: &Sequence,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    check_ordered(last, current)?;
    let mut last_cur = Cursor::at_start(vr, last)?;
    let mut current_cur = Cursor::at_start(vr, current)?;

    while last_cur.valid() && current_cur.valid() {
        Cursor::fast_forward(vr, &mut last_cur, &mut current_cur)?;
        while let (Some(a), Some(b)) = (last_cur.current(), current_cur.current()) {
            if a == b {
                break;
            }
            let (last_key, last_value) = split_item(a)?;
            let (current_key, current_value) = split_item(b)?;
            let change = match OrderedKey::of(&current_key).cmp(&OrderedKey::of(&last_key)) {
                Ordering::Less => {
                    current_cur.advance(vr)?;
                    ValueChanged::added(current_key, current_value)
                }
                Ordering::Greater => {
                    last_cur.advance(vr)?;
                    ValueChanged::removed(last_key, last_value)
                }
                Ordering::Equal => {
                    last_cur.advance(vr)?;
                    current_cur.advance(vr)?;
                    ValueChanged::modified(last_key, last_value, current_value)
                }
            };
            if !send_change(tx, stop, change) {
                return Ok(false);
            }
        }
    }

    while let Some(item) = last_cur.current() {
        let (key, value) = split_item(item)?;
        if !send_change(tx, stop, ValueChanged::removed(key, value)) {
            return Ok(false);
        }
        last_cur.advance(vr)?;
    }
    while let Some(item) = current_cur.current() {
        let (key, value) = split_item(item)?;
        if !send_change(tx, stop, ValueChanged::added(key, value)) {
            return Ok(false);
        }
        current_cur.advance(vr)?;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Top-down
// ---------------------------------------------------------------------------

/// Diff by aligning tree levels and descending only into differing regions.
pub fn diff_ordered_top_down(
    vr: &dyn ValueReader,
    last: &Sequence,
    current: &Sequence,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    check_ordered(last, current)?;
    diff_nodes(vr, last.clone(), current.clone(), tx, stop, DEFAULT_MAX_SPLICE_MATRIX_SIZE)
}

fn diff_nodes(
    vr: &dyn ValueReader,
    last: Sequence,
    current: Sequence,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
    max_matrix: u64,
) -> DiffResult<bool> {
    if last.level() > current.level() {
        let child = last.composite_child(vr, 0, last.len())?;
        return diff_nodes(vr, child, current, tx, stop, max_matrix);
    }
    if current.level() > last.level() {
        let child = current.composite_child(vr, 0, current.len())?;
        return diff_nodes(vr, last, child, tx, stop, max_matrix);
    }
    if last.is_leaf() {
        return diff_ordered_left_right(vr, &last, &current, tx, stop);
    }

    let splices = calc_splices(&child_hashes(&last), &child_hashes(&current), max_matrix);
    trace!(level = last.level(), splices = splices.len(), "top-down level");
    for s in splices {
        let last_child = last.composite_child(vr, s.at as usize, s.removed as usize)?;
        let current_child = current.composite_child(vr, s.from as usize, s.added as usize)?;
        if !diff_nodes(vr, last_child, current_child, tx, stop, max_matrix)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn child_hashes(seq: &Sequence) -> Vec<Hash> {
    seq.tuples().iter().map(|t| t.child_ref().target()).collect()
}

// ---------------------------------------------------------------------------
// Best of both
// ---------------------------------------------------------------------------

/// Race left-right against top-down and stream whichever is ahead.
///
/// Both workers are joined before this returns, whatever the outcome.
pub fn diff_ordered(
    vr: &dyn ValueReader,
    last: &Sequence,
    current: &Sequence,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    check_ordered(last, current)?;
    if last.hash() == current.hash() {
        return Ok(true);
    }

    thread::scope(|s| -> DiffResult<bool> {
        let (lr_tx, lr_rx) = bounded(0);
        let (td_tx, td_rx) = bounded(0);
        let (lr_cancel, lr_stop) = cancellation();
        let (td_cancel, td_stop) = cancellation();

        let lr = thread::Builder::new()
            .name("cairn-diff-left-right".into())
            .spawn_scoped(s, move || diff_ordered_left_right(vr, last, current, &lr_tx, &lr_stop))
            .map_err(DiffError::Spawn)?;
        let td = match thread::Builder::new()
            .name("cairn-diff-top-down".into())
            .spawn_scoped(s, move || diff_ordered_top_down(vr, last, current, &td_tx, &td_stop))
        {
            Ok(handle) => handle,
            Err(e) => {
                drop(lr_cancel);
                drop(lr_rx);
                let _ = lr.join();
                return Err(DiffError::Spawn(e));
            }
        };

        let mut race = Race {
            lr: Some(lr),
            td: Some(td),
            lr_cancel: Some(lr_cancel),
        };
        let outcome = race.run(tx, stop, &lr_rx, &td_rx);

        // Unblock whichever workers are still running, then join them.
        drop(race.lr_cancel.take());
        drop(td_cancel);
        drop(lr_rx);
        drop(td_rx);
        race.join_rest()?;
        outcome
    })
}

struct Race<'scope> {
    lr: Option<ScopedJoinHandle<'scope, DiffResult<bool>>>,
    td: Option<ScopedJoinHandle<'scope, DiffResult<bool>>>,
    lr_cancel: Option<Canceller>,
}

impl Race<'_> {
    fn run(
        &mut self,
        tx: &Sender<ValueChanged>,
        stop: &CancelSignal,
        lr_rx: &Receiver<ValueChanged>,
        td_rx: &Receiver<ValueChanged>,
    ) -> DiffResult<bool> {
        let (mut lr_count, mut td_count) = (0u64, 0u64);
        let mut overtaken = false;
        while !overtaken {
            select! {
                recv(stop.receiver()) -> _ => return Ok(false),
                recv(lr_rx) -> msg => match msg {
                    Ok(change) => {
                        lr_count += 1;
                        if !send_change(tx, stop, change) {
                            return Ok(false);
                        }
                    }
                    Err(_) => return join_worker(self.lr.take(), "left-right"),
                },
                recv(td_rx) -> msg => match msg {
                    Ok(change) => {
                        td_count += 1;
                        if td_count > lr_count {
                            debug!(changes = td_count, "top-down diff overtook left-right");
                            drop(self.lr_cancel.take());
                            if !send_change(tx, stop, change) {
                                return Ok(false);
                            }
                            overtaken = true;
                        }
                    }
                    Err(_) => return join_worker(self.td.take(), "top-down"),
                },
            }
        }

        for change in td_rx.iter() {
            if !send_change(tx, stop, change) {
                return Ok(false);
            }
        }
        join_worker(self.td.take(), "top-down")
    }

    /// Join workers that did not decide the outcome. Their results are
    /// discarded; only a panic is reported.
    fn join_rest(&mut self) -> DiffResult<()> {
        for (handle, name) in [(self.lr.take(), "left-right"), (self.td.take(), "top-down")] {
            if let Some(handle) = handle {
                match handle.join() {
                    Ok(result) => trace!(worker = name, ?result, "diff worker stopped"),
                    Err(_) => return Err(DiffError::WorkerPanicked(name)),
                }
            }
        }
        Ok(())
    }
}

fn join_worker(handle: Option<ScopedJoinHandle<'_, DiffResult<bool>>>, name: &'static str) -> DiffResult<bool> {
    match handle {
        Some(handle) => handle.join().map_err(|_| DiffError::WorkerPanicked(name))?,
        None => Ok(true),
    }
}

// ---------------------------------------------------------------------------
// Collection wrappers
// ---------------------------------------------------------------------------

/// Stream the changes turning `last` into `current`.
pub fn diff_sets(
    vr: &dyn ValueReader,
    last: &Set,
    current: &Set,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    diff_ordered(vr, last.sequence(), current.sequence(), tx, stop)
}

pub fn diff_maps(
    vr: &dyn ValueReader,
    last: &Map,
    current: &Map,
    tx: &Sender<ValueChanged>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    diff_ordered(vr, last.sequence(), current.sequence(), tx, stop)
}

/// All changes between two sets, in the order they were produced.
pub fn collect_set_diff(vr: &dyn ValueReader, last: &Set, current: &Set) -> DiffResult<Vec<ValueChanged>> {
    collect(|tx| diff_sets(vr, last, current, tx, &CancelSignal::never()))
}

pub fn collect_map_diff(vr: &dyn ValueReader, last: &Map, current: &Map) -> DiffResult<Vec<ValueChanged>> {
    collect(|tx| diff_maps(vr, last, current, tx, &CancelSignal::never()))
}

pub(crate) fn collect<T>(run: impl FnOnce(&Sender<T>) -> DiffResult<bool>) -> DiffResult<Vec<T>> {
    let (tx, rx) = unbounded();
    run(&tx)?;
    drop(tx);
    Ok(rx.into_iter().collect())
}
