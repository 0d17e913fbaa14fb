//! The Cairn value engine.
//!
//! Values are immutable and content-addressed. Large collections are stored
//! as prolly trees: sequences split into chunks at content-defined
//! boundaries, so equal content always yields the same tree and an edit only
//! touches the chunks around it. This crate provides:
//! - The value model ([`Value`], [`Struct`], [`Type`], [`Ref`]) and its
//!   canonical binary codec
//! - The collections [`List`], [`Set`], [`Map`] and [`Blob`]
//! - The [`Chunker`] and [`Cursor`] that build, edit and traverse trees
//! - [`ValueStore`]: validating writes, hint caching, and dependency-ordered
//!   flushing over any [`ChunkStore`](cairn_chunks::ChunkStore)
//! - Reachability walks with cooperative cancellation

pub mod blob;
pub mod cancel;
pub mod chunker;
pub mod codec;
pub mod config;
pub mod cursor;
mod edit;
pub mod error;
pub mod kind;
pub mod list;
pub mod map;
pub mod meta_tuple;
pub mod number;
pub mod ordered_key;
pub mod reference;
pub mod rolling;
pub mod sequence;
pub mod set;
pub mod store;
pub mod types;
pub mod value;
pub mod walk;

pub use blob::{Blob, BlobReader};
pub use cancel::{cancellation, CancelSignal, Canceller};
pub use chunker::{concat, Chunker};
pub use codec::{decode_validated, decode_value, encode_chunk, encode_value};
pub use config::ValueStoreConfig;
pub use cursor::{Cursor, SequenceIter};
pub use error::{DecodeError, ValueError, ValueResult};
pub use kind::Kind;
pub use list::List;
pub use map::{Map, MapEditor};
pub use meta_tuple::MetaTuple;
pub use number::Number;
pub use ordered_key::OrderedKey;
pub use reference::Ref;
pub use sequence::{Item, Sequence, SequenceItems};
pub use set::{Set, SetEditor};
pub use store::{ChunkCacheEntry, ValueReadWriter, ValueReader, ValueStore, ValueWriter};
pub use types::{StructField, StructType, Type, TypeCache};
pub use value::{Struct, Value};
pub use walk::walk_refs;

pub use cairn_types::Hash;
