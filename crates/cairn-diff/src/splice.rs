//! Minimal edit scripts between two sequences of comparable items.
//!
//! Common prefix and suffix are trimmed first; the remainder is aligned with
//! a Myers diff unless the comparison matrix would exceed the caller's
//! budget, in which case the whole remainder becomes a single splice.

use std::hash::Hash;

use similar::{Algorithm, DiffOp};

/// Largest `removed * added` region aligned item by item.
pub const DEFAULT_MAX_SPLICE_MATRIX_SIZE: u64 = 20_000_000;

/// One edit: at position `at` of the old sequence, `removed` items are
/// replaced by `added` items taken from position `from` of the new one.
///
/// `from` is 0 whenever `added` is 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Splice {
    pub at: u64,
    pub removed: u64,
    pub added: u64,
    pub from: u64,
}

impl Splice {
    pub fn new(at: u64, removed: u64, added: u64, from: u64) -> Self {
        Self {
            at,
            removed,
            added,
            from: if added == 0 { 0 } else { from },
        }
    }
}

/// Splices turning `prev` into `cur`, in ascending order of `at`.
pub fn calc_splices<T: Eq + Hash + Ord>(prev: &[T], cur: &[T], max_matrix: u64) -> Vec<Splice> {
    let prefix = prev.iter().zip(cur).take_while(|(a, b)| a == b).count();
    let suffix = prev[prefix..]
        .iter()
        .rev()
        .zip(cur[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old = &prev[prefix..prev.len() - suffix];
    let new = &cur[prefix..cur.len() - suffix];
    let base = prefix as u64;

    if old.is_empty() && new.is_empty() {
        return Vec::new();
    }
    let matrix = (old.len() as u64).saturating_mul(new.len() as u64);
    if old.is_empty() || new.is_empty() || matrix > max_matrix {
        return vec![Splice::new(base, old.len() as u64, new.len() as u64, base)];
    }

    // Every gap between equal runs becomes one splice.
    let mut splices = Vec::new();
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for op in similar::capture_diff_slices(Algorithm::Myers, old, new) {
        if let DiffOp::Equal {
            old_index,
            new_index,
            len,
        } = op
        {
            push_gap(&mut splices, base, (old_pos, old_index), (new_pos, new_index));
            old_pos = old_index + len;
            new_pos = new_index + len;
        }
    }
    push_gap(&mut splices, base, (old_pos, old.len()), (new_pos, new.len()));
    splices
}

fn push_gap(splices: &mut Vec<Splice>, base: u64, old: (usize, usize), new: (usize, usize)) {
    let (removed, added) = (old.1 - old.0, new.1 - new.0);
    if removed > 0 || added > 0 {
        splices.push(Splice::new(
            base + old.0 as u64,
            removed as u64,
            added as u64,
            base + new.0 as u64,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Apply splices (ascending) to `prev`, pulling added items from `cur`.
    fn apply<T: Clone>(prev: &[T], cur: &[T], splices: &[Splice]) -> Vec<T> {
        let mut out = prev.to_vec();
        for s in splices.iter().rev() {
            let at = s.at as usize;
            let added = &cur[s.from as usize..(s.from + s.added) as usize];
            out.splice(at..at + s.removed as usize, added.iter().cloned());
        }
        out
    }

    #[test]
    fn identical_inputs_have_no_splices() {
        assert!(calc_splices(&[1, 2, 3], &[1, 2, 3], 100).is_empty());
        assert!(calc_splices::<u8>(&[], &[], 100).is_empty());
    }

    #[test]
    fn pure_insert_and_delete() {
        assert_eq!(calc_splices(&[1, 2, 3], &[1, 9, 9, 2, 3], 100), vec![Splice::new(1, 0, 2, 1)]);
        assert_eq!(calc_splices(&[1, 2, 3, 4], &[1, 4], 100), vec![Splice::new(1, 2, 0, 0)]);
    }

    #[test]
    fn deletion_clears_from() {
        let s = calc_splices(&[5, 6, 7], &[5, 7], 100);
        assert_eq!(s, vec![Splice { at: 1, removed: 1, added: 0, from: 0 }]);
    }

    #[test]
    fn replacement_is_one_splice() {
        assert_eq!(calc_splices(&[1, 2, 3], &[1, 8, 3], 100), vec![Splice::new(1, 1, 1, 1)]);
    }

    #[test]
    fn matrix_budget_collapses_middle() {
        let prev: Vec<u32> = (0..100).collect();
        let mut cur = prev.clone();
        cur[10] = 1_000;
        cur[90] = 2_000;
        let s = calc_splices(&prev, &cur, 10);
        assert_eq!(s, vec![Splice::new(10, 81, 81, 10)]);
        assert_eq!(calc_splices(&prev, &cur, 100_000).len(), 2);
    }

    #[test]
    fn splices_rebuild_the_new_sequence() {
        let prev: Vec<char> = "the quick brown fox jumps".chars().collect();
        let cur: Vec<char> = "a quick red fox leaps high".chars().collect();
        let splices = calc_splices(&prev, &cur, DEFAULT_MAX_SPLICE_MATRIX_SIZE);
        assert_eq!(apply(&prev, &cur, &splices), cur);
        assert!(splices.windows(2).all(|w| w[0].at + w[0].removed <= w[1].at));
    }

    #[test]
    fn repeated_items_rebuild_the_new_sequence() {
        let prev = [0u8, 1, 0, 0, 2, 1, 0, 3, 3, 0, 1, 2, 0, 0, 1];
        let cur = [1u8, 0, 0, 3, 0, 1, 1, 2, 0, 3, 0, 0, 2, 1];
        let splices = calc_splices(&prev, &cur, DEFAULT_MAX_SPLICE_MATRIX_SIZE);
        assert_eq!(apply(&prev, &cur, &splices), cur);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn splices_over_a_small_alphabet_rebuild_the_target(
            prev in prop::collection::vec(0u8..4, 0..60),
            cur in prop::collection::vec(0u8..4, 0..60),
        ) {
            let splices = calc_splices(&prev, &cur, DEFAULT_MAX_SPLICE_MATRIX_SIZE);
            for w in splices.windows(2) {
                prop_assert!(w[0].at + w[0].removed <= w[1].at, "{:?} overlaps {:?}", w[0], w[1]);
                prop_assert!(w[0].from + w[0].added <= w[1].from || w[1].added == 0);
            }
            prop_assert_eq!(apply(&prev, &cur, &splices), cur);
        }
    }
}
