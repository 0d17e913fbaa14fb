//! Foundation types for Cairn.
//!
//! Every chunk and every value in Cairn is identified by a [`Hash`]: a
//! 20-byte digest of its canonical encoding. This crate owns that identifier
//! and its stable textual form. Every other Cairn crate depends on
//! `cairn-types`.

pub mod error;
pub mod hash;

pub use error::TypeError;
pub use hash::{Hash, HASH_LEN, HASH_STRING_LEN};
