//! Splice diff of indexed collections (`List` and `Blob`).
//!
//! Levels are aligned top-down like the ordered diff, but changes are
//! reported as [`Splice`]s in leaf coordinates. Whole subtrees that were only
//! inserted or only removed are reported without being loaded.

use cairn_types::Hash;
use cairn_values::{Blob, CancelSignal, Kind, List, Sequence, SequenceItems, Value, ValueReader};
use crossbeam_channel::Sender;
use tracing::trace;

use crate::error::{DiffError, DiffResult};
use crate::ordered::{child_hashes, collect, send_change};
use crate::splice::{calc_splices, Splice, DEFAULT_MAX_SPLICE_MATRIX_SIZE};

/// Stream the splices turning `last` into `current`, in ascending order.
///
/// Returns `Ok(false)` if stopped before finishing.
pub fn diff_indexed(
    vr: &dyn ValueReader,
    last: &Sequence,
    current: &Sequence,
    tx: &Sender<Splice>,
    stop: &CancelSignal,
    max_matrix: u64,
) -> DiffResult<bool> {
    if last.kind() != current.kind() || !matches!(last.kind(), Kind::List | Kind::Blob) {
        return Err(DiffError::KindMismatch {
            last: last.kind(),
            current: current.kind(),
        });
    }
    if last.hash() == current.hash() {
        return Ok(true);
    }
    diff_nodes(vr, last.clone(), 0, current.clone(), 0, tx, stop, max_matrix)
}

#[allow(clippy::too_many_arguments)]
fn diff_nodes(
    vr: &dyn ValueReader,
    last: Sequence,
    last_offset: u64,
    current: Sequence,
    current_offset: u64,
    tx: &Sender<Splice>,
    stop: &CancelSignal,
    max_matrix: u64,
) -> DiffResult<bool> {
    if last.level() > current.level() {
        let child = last.composite_child(vr, 0, last.len())?;
        return diff_nodes(vr, child, last_offset, current, current_offset, tx, stop, max_matrix);
    }
    if current.level() > last.level() {
        let child = current.composite_child(vr, 0, current.len())?;
        return diff_nodes(vr, last, last_offset, child, current_offset, tx, stop, max_matrix);
    }

    if last.is_leaf() {
        for s in leaf_splices(&last, &current, max_matrix)? {
            let shifted = Splice::new(s.at + last_offset, s.removed, s.added, s.from + current_offset);
            if !send_change(tx, stop, shifted) {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    let splices = calc_splices(&child_hashes(&last), &child_hashes(&current), max_matrix);
    trace!(level = last.level(), splices = splices.len(), "indexed diff level");
    for s in splices {
        let (at, removed, added, from) = (s.at as usize, s.removed as usize, s.added as usize, s.from as usize);

        if removed == 0 || added == 0 {
            // Pure insertion or removal of whole subtrees.
            let begin_remove = leaves_before(&last, at);
            let end_remove = leaves_before(&last, at + removed);
            let begin_add = leaves_before(&current, from);
            let end_add = leaves_before(&current, from + added);
            let splice = Splice::new(
                last_offset + begin_remove,
                end_remove - begin_remove,
                end_add - begin_add,
                current_offset + begin_add,
            );
            if !send_change(tx, stop, splice) {
                return Ok(false);
            }
            continue;
        }

        let last_child = last.composite_child(vr, at, removed)?;
        let current_child = current.composite_child(vr, from, added)?;
        let more = diff_nodes(
            vr,
            last_child,
            last_offset + leaves_before(&last, at),
            current_child,
            current_offset + leaves_before(&current, from),
            tx,
            stop,
            max_matrix,
        )?;
        if !more {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Leaf items under children `0..idx`.
fn leaves_before(seq: &Sequence, idx: usize) -> u64 {
    match idx {
        0 => 0,
        n => seq.cumulative_leaves(n - 1),
    }
}

fn leaf_splices(last: &Sequence, current: &Sequence, max_matrix: u64) -> DiffResult<Vec<Splice>> {
    match (last.items(), current.items()) {
        (SequenceItems::Values(a), SequenceItems::Values(b)) => {
            let a: Vec<Hash> = a.iter().map(Value::hash).collect();
            let b: Vec<Hash> = b.iter().map(Value::hash).collect();
            Ok(calc_splices(&a, &b, max_matrix))
        }
        (SequenceItems::Bytes(a), SequenceItems::Bytes(b)) => Ok(calc_splices(&a[..], &b[..], max_matrix)),
        _ => Err(DiffError::KindMismatch {
            last: last.kind(),
            current: current.kind(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Collection wrappers
// ---------------------------------------------------------------------------

pub fn diff_lists(
    vr: &dyn ValueReader,
    last: &List,
    current: &List,
    tx: &Sender<Splice>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    diff_indexed(vr, last.sequence(), current.sequence(), tx, stop, DEFAULT_MAX_SPLICE_MATRIX_SIZE)
}

/// Byte-level splices between two blobs.
pub fn diff_blobs(
    vr: &dyn ValueReader,
    last: &Blob,
    current: &Blob,
    tx: &Sender<Splice>,
    stop: &CancelSignal,
) -> DiffResult<bool> {
    diff_indexed(vr, last.sequence(), current.sequence(), tx, stop, DEFAULT_MAX_SPLICE_MATRIX_SIZE)
}

pub fn collect_list_splices(vr: &dyn ValueReader, last: &List, current: &List) -> DiffResult<Vec<Splice>> {
    collect(|tx| diff_lists(vr, last, current, tx, &CancelSignal::never()))
}

pub fn collect_blob_splices(vr: &dyn ValueReader, last: &Blob, current: &Blob) -> DiffResult<Vec<Splice>> {
    collect(|tx| diff_blobs(vr, last, current, tx, &CancelSignal::never()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_values::{cancellation, ValueStore};
    use crossbeam_channel::bounded;
    use rand::rngs::StdRng;
    use rand::{Rng, RngCore, SeedableRng};

    fn list(vs: &ValueStore, values: impl IntoIterator<Item = i64>) -> List {
        List::new(vs, values.into_iter().map(Value::from)).unwrap()
    }

    /// Replay `splices` over `last`, taking inserted items from `current`.
    fn replay<T: Clone>(last: &[T], current: &[T], splices: &[Splice]) -> Vec<T> {
        let mut out = last.to_vec();
        for s in splices.iter().rev() {
            let at = s.at as usize;
            let from = s.from as usize;
            out.splice(at..at + s.removed as usize, current[from..from + s.added as usize].iter().cloned());
        }
        out
    }

    fn assert_ascending(splices: &[Splice]) {
        for w in splices.windows(2) {
            assert!(w[0].at + w[0].removed <= w[1].at, "{:?} overlaps {:?}", w[0], w[1]);
        }
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[test]
    fn small_list_edit() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, [1, 2, 3, 4, 5]);
        let b = list(&vs, [1, 9, 3, 4, 5, 6]);
        let splices = collect_list_splices(&vs, &a, &b).unwrap();
        assert_eq!(splices, vec![Splice::new(1, 1, 1, 1), Splice::new(5, 0, 1, 5)]);
    }

    #[test]
    fn identical_lists_produce_nothing() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, 0..50_000);
        assert!(collect_list_splices(&vs, &a, &a).unwrap().is_empty());
    }

    #[test]
    fn large_list_edits_replay() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, 0..40_000);
        let b = a
            .insert(&vs, 10, Value::from(-1))
            .unwrap()
            .remove_range(&vs, 20_000, 20_500)
            .unwrap()
            .push(&vs, Value::from(-2))
            .unwrap();

        let splices = collect_list_splices(&vs, &a, &b).unwrap();
        assert_ascending(&splices);
        assert!(splices.len() <= 3, "{splices:?}");

        let last = a.to_vec(&vs).unwrap();
        let current = b.to_vec(&vs).unwrap();
        assert_eq!(replay(&last, &current, &splices), current);
    }

    #[test]
    fn appended_subtrees_map_to_leaf_offsets() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, 0..20_000);
        let b = list(&vs, 0..60_000);
        let splices = collect_list_splices(&vs, &a, &b).unwrap();
        let last = a.to_vec(&vs).unwrap();
        let current = b.to_vec(&vs).unwrap();
        assert_eq!(replay(&last, &current, &splices), current);
        let added: u64 = splices.iter().map(|s| s.added).sum();
        let removed: u64 = splices.iter().map(|s| s.removed).sum();
        assert_eq!(added - removed, 40_000);
    }

    #[test]
    fn lists_of_different_height() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, 0..5);
        let b = list(&vs, 0..30_000);
        assert_ne!(a.sequence().level(), b.sequence().level());
        for (last, current) in [(&a, &b), (&b, &a)] {
            let splices = collect_list_splices(&vs, last, current).unwrap();
            let l = last.to_vec(&vs).unwrap();
            let c = current.to_vec(&vs).unwrap();
            assert_eq!(replay(&l, &c, &splices), c);
        }
    }

    #[test]
    fn matrix_budget_coarsens_leaf_splices() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, [1, 2, 3, 4, 5, 6]);
        let b = list(&vs, [1, 7, 3, 4, 8, 6]);
        let splices = collect(|tx| diff_indexed(&vs, a.sequence(), b.sequence(), tx, &CancelSignal::never(), 1)).unwrap();
        assert_eq!(splices, vec![Splice::new(1, 4, 4, 1)]);
    }

    #[test]
    fn lists_with_repeated_values_replay() {
        let vs = ValueStore::in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for round in 0..20 {
            let last: Vec<Value> = (0..8_000).map(|_| Value::from(rng.gen_range(0..50i64))).collect();
            let a = List::new(&vs, last.clone()).unwrap();
            let at = rng.gen_range(0..last.len() as u64);
            let delete = rng.gen_range(0..2_000);
            let insert: Vec<Value> = (0..rng.gen_range(0..1_000usize)).map(|_| Value::from(rng.gen_range(0..50i64))).collect();
            let b = a.splice(&vs, at, delete, insert).unwrap();

            let splices = collect_list_splices(&vs, &a, &b).unwrap();
            assert_ascending(&splices);
            let current = b.to_vec(&vs).unwrap();
            assert_eq!(replay(&last, &current, &splices), current, "round {round}");
        }
    }

    // -----------------------------------------------------------------------
    // Blobs
    // -----------------------------------------------------------------------

    #[test]
    fn blob_insert_in_the_middle() {
        let vs = ValueStore::in_memory().unwrap();
        let mut data = vec![0u8; 300_000];
        StdRng::seed_from_u64(11).fill_bytes(&mut data);
        let a = Blob::new(&vs, &data).unwrap();
        let b = a.splice(&vs, 150_000, 0, b"inserted bytes").unwrap();

        let splices = collect_blob_splices(&vs, &a, &b).unwrap();
        let added: u64 = splices.iter().map(|s| s.added).sum();
        let removed: u64 = splices.iter().map(|s| s.removed).sum();
        assert_eq!(added - removed, 14);
        assert!(added < 64, "{splices:?}");
        let current = b.to_vec(&vs).unwrap();
        assert_eq!(replay(&data, &current, &splices), current);
    }

    #[test]
    fn blob_overwrite_replays() {
        let vs = ValueStore::in_memory().unwrap();
        let mut data = vec![0u8; 120_000];
        StdRng::seed_from_u64(12).fill_bytes(&mut data);
        let a = Blob::new(&vs, &data).unwrap();
        let b = a.splice(&vs, 1_000, 2_000, &[7u8; 500]).unwrap().splice(&vs, 100_000, 0, b"tail").unwrap();

        let splices = collect_blob_splices(&vs, &a, &b).unwrap();
        assert_ascending(&splices);
        let current = b.to_vec(&vs).unwrap();
        assert_eq!(replay(&data, &current, &splices), current);
    }

    #[test]
    fn low_entropy_blob_replays() {
        let vs = ValueStore::in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        for round in 0..10 {
            let data: Vec<u8> = (0..60_000).map(|_| rng.gen_range(b'a'..b'e')).collect();
            let a = Blob::new(&vs, &data).unwrap();
            let insert: Vec<u8> = (0..rng.gen_range(0..3_000usize)).map(|_| rng.gen_range(b'a'..b'e')).collect();
            let b = a
                .splice(&vs, rng.gen_range(0..60_000), rng.gen_range(0..3_000), &insert)
                .unwrap();

            let splices = collect_blob_splices(&vs, &a, &b).unwrap();
            assert_ascending(&splices);
            let current = b.to_vec(&vs).unwrap();
            assert_eq!(replay(&data, &current, &splices), current, "round {round}");
        }
    }

    // -----------------------------------------------------------------------
    // Errors and cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn list_against_blob_is_rejected() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, [1]);
        let b = Blob::new(&vs, b"x").unwrap();
        let err = collect(|tx| diff_indexed(&vs, a.sequence(), b.sequence(), tx, &CancelSignal::never(), 100));
        assert!(matches!(err, Err(DiffError::KindMismatch { .. })));
    }

    #[test]
    fn stopped_diff_returns_false() {
        let vs = ValueStore::in_memory().unwrap();
        let a = list(&vs, 0..100);
        let b = list(&vs, 100..200);
        let (canceller, stop) = cancellation();
        canceller.cancel();
        let (tx, _rx) = bounded(0);
        assert!(!diff_lists(&vs, &a, &b, &tx, &stop).unwrap());
    }
}
