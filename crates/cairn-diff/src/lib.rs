//! Diff engine for Cairn collections.
//!
//! Diffs stream their results over a channel and skip every subtree the two
//! sides share, so the cost tracks the size of the change rather than the
//! size of the collections.
//!
//! # Key Types
//!
//! - [`ValueChanged`] / [`DiffChangeType`] -- Key-level change in a `Set` or `Map`
//! - [`Splice`] -- Positional change in a `List` or `Blob`
//! - [`diff_ordered`] -- Races the left-right and top-down algorithms and
//!   streams whichever is ahead

pub mod error;
pub mod indexed;
pub mod ordered;
pub mod splice;

pub use error::{DiffError, DiffResult};
pub use indexed::{collect_blob_splices, collect_list_splices, diff_blobs, diff_indexed, diff_lists};
pub use ordered::{
    collect_map_diff, collect_set_diff, diff_maps, diff_ordered, diff_ordered_left_right, diff_ordered_top_down,
    diff_sets, DiffChangeType, ValueChanged,
};
pub use splice::{calc_splices, Splice, DEFAULT_MAX_SPLICE_MATRIX_SIZE};
