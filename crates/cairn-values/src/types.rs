//! Structural types of values.
//!
//! # Key Types
//!
//! - [`Type`]: the type of any value, itself encodable as a value.
//! - [`StructType`] / [`StructField`]: named record shapes.
//! - [`TypeCache`]: interning of decoded types keyed by their encoding.
//!
//! # Design Rules
//!
//! - Unions are normalised on construction: nested unions are flattened,
//!   duplicates removed, members sorted by type hash, and a single-member
//!   union collapses to that member.
//! - A struct nested (at any depth) inside a struct of the same name is
//!   represented as `Cycle(n)`, where `n` counts enclosing structs outward
//!   from the innermost one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use cairn_types::Hash;
use parking_lot::Mutex;

use crate::codec::Encoder;
use crate::kind::Kind;

/// The type of a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Number,
    String,
    Blob,
    /// Any value.
    Value,
    Type,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Ref(Box<Type>),
    Struct(StructType),
    Union(Vec<Type>),
    /// Back-reference to the `n`-th enclosing struct.
    Cycle(u32),
}

/// A named record type with fields sorted by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn set(elem: Type) -> Self {
        Self::Set(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn reference(target: Type) -> Self {
        Self::Ref(Box::new(target))
    }

    /// Build a struct type; fields are sorted by name.
    pub fn structure(name: impl Into<String>, fields: impl IntoIterator<Item = StructField>) -> Self {
        let mut fields: Vec<StructField> = fields.into_iter().collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Self::Struct(StructType {
            name: name.into(),
            fields,
        })
    }

    /// Build a normalised union.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Self {
        let mut flat = Vec::new();
        let mut seen = HashSet::new();
        for member in members {
            match member {
                Type::Union(inner) => {
                    for t in inner {
                        if seen.insert(t.clone()) {
                            flat.push(t);
                        }
                    }
                }
                t => {
                    if seen.insert(t.clone()) {
                        flat.push(t);
                    }
                }
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        let mut keyed: Vec<(Hash, Type)> = flat.into_iter().map(|t| (t.hash(), t)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Union(keyed.into_iter().map(|(_, t)| t).collect())
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Bool => Kind::Bool,
            Self::Number => Kind::Number,
            Self::String => Kind::String,
            Self::Blob => Kind::Blob,
            Self::Value => Kind::Value,
            Self::Type => Kind::Type,
            Self::List(_) => Kind::List,
            Self::Set(_) => Kind::Set,
            Self::Map(..) => Kind::Map,
            Self::Ref(_) => Kind::Ref,
            Self::Struct(_) => Kind::Struct,
            Self::Union(_) => Kind::Union,
            Self::Cycle(_) => Kind::Cycle,
        }
    }

    /// Hash of this type encoded as a `Type` value.
    pub fn hash(&self) -> Hash {
        let mut enc = Encoder::new();
        enc.write_kind(Kind::Type);
        enc.write_type(self);
        Hash::of(enc.as_bytes())
    }

    /// Element type of a `List`, `Set` or `Ref`.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Self::List(t) | Self::Set(t) | Self::Ref(t) => Some(t),
            _ => None,
        }
    }

    /// Rewrite structs already open in `stack` as cycles.
    ///
    /// Types computed for a child chunk out of context still spell out the
    /// enclosing struct; this folds them back so a value's type does not
    /// depend on how its collections happen to be chunked.
    pub(crate) fn recycle(&self, stack: &mut Vec<String>) -> Type {
        match self {
            Self::Struct(st) => {
                if let Some(depth) = cycle_depth(stack, &st.name) {
                    return Self::Cycle(depth);
                }
                stack.push(st.name.clone());
                let fields = st
                    .fields
                    .iter()
                    .map(|f| StructField {
                        name: f.name.clone(),
                        ty: f.ty.recycle(stack),
                        optional: f.optional,
                    })
                    .collect();
                stack.pop();
                Self::Struct(StructType {
                    name: st.name.clone(),
                    fields,
                })
            }
            Self::List(t) => Self::list(t.recycle(stack)),
            Self::Set(t) => Self::set(t.recycle(stack)),
            Self::Ref(t) => Self::reference(t.recycle(stack)),
            Self::Map(k, v) => Self::map(k.recycle(stack), v.recycle(stack)),
            Self::Union(members) => Self::union(members.iter().map(|t| t.recycle(stack))),
            other => other.clone(),
        }
    }
}

/// Depth of the innermost open struct named `name`, if any.
///
/// Anonymous structs never form cycles.
pub(crate) fn cycle_depth(stack: &[String], name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    stack
        .iter()
        .rposition(|n| n == name)
        .map(|pos| (stack.len() - 1 - pos) as u32)
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(t) => write!(f, "List<{t}>"),
            Self::Set(t) => write!(f, "Set<{t}>"),
            Self::Ref(t) => write!(f, "Ref<{t}>"),
            Self::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Self::Struct(st) => {
                write!(f, "Struct {} {{", st.name)?;
                for (i, field) in st.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    let mark = if field.optional { "?" } else { "" };
                    write!(f, " {}{}: {}", field.name, mark, field.ty)?;
                }
                f.write_str(" }")
            }
            Self::Union(members) if members.is_empty() => f.write_str("Union<>"),
            Self::Union(members) => {
                for (i, t) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Self::Cycle(depth) => write!(f, "Cycle<{depth}>"),
            other => f.write_str(other.kind().name()),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeCache
// ---------------------------------------------------------------------------

/// Upper bound on interned types before the cache starts over.
const MAX_CACHED_TYPES: usize = 16 * 1024;

/// Interns decoded types by their exact encoding.
///
/// Owned by a value store and handed to the decoder explicitly, so every
/// identical type encoding decodes to a clone of the same `Type` without
/// re-parsing.
#[derive(Default)]
pub struct TypeCache {
    by_encoding: Mutex<HashMap<Vec<u8>, Type>>,
    hits: AtomicU64,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct types interned.
    pub fn len(&self) -> usize {
        self.by_encoding.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_encoding.lock().is_empty()
    }

    /// How many decodes were served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn get(&self, encoding: &[u8]) -> Option<Type> {
        let found = self.by_encoding.lock().get(encoding).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub(crate) fn insert(&self, encoding: &[u8], ty: Type) {
        let mut map = self.by_encoding.lock();
        if map.len() >= MAX_CACHED_TYPES {
            map.clear();
        }
        map.insert(encoding.to_vec(), ty);
    }
}

impl fmt::Debug for TypeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCache")
            .field("types", &self.len())
            .field("hits", &self.hits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Unions
    // -----------------------------------------------------------------------

    #[test]
    fn union_flattens_and_dedupes() {
        let inner = Type::union([Type::Number, Type::String]);
        let outer = Type::union([inner, Type::Bool, Type::Number]);
        match &outer {
            Type::Union(members) => {
                assert_eq!(members.len(), 3);
                assert!(members.windows(2).all(|w| w[0].hash() < w[1].hash()));
            }
            other => panic!("expected union, got {other}"),
        }
    }

    #[test]
    fn union_is_order_independent() {
        let a = Type::union([Type::Number, Type::String, Type::Blob]);
        let b = Type::union([Type::Blob, Type::Number, Type::String]);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn single_member_union_collapses() {
        assert_eq!(Type::union([Type::Number, Type::Number]), Type::Number);
        assert_eq!(Type::union([]), Type::Union(vec![]));
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    #[test]
    fn recycle_folds_open_structs() {
        let node = Type::structure(
            "Node",
            [StructField::new("children", Type::list(Type::Cycle(0)))],
        );
        let mut stack = vec!["Node".to_string()];
        assert_eq!(node.recycle(&mut stack), Type::Cycle(0));

        let mut empty = Vec::new();
        assert_eq!(node.recycle(&mut empty), node);
        assert!(empty.is_empty());
    }

    #[test]
    fn anonymous_structs_never_cycle() {
        assert_eq!(cycle_depth(&["".to_string()], ""), None);
        let stack = vec!["A".to_string(), "B".to_string()];
        assert_eq!(cycle_depth(&stack, "A"), Some(1));
        assert_eq!(cycle_depth(&stack, "B"), Some(0));
    }

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    #[test]
    fn display_forms() {
        assert_eq!(Type::map(Type::String, Type::list(Type::Number)).to_string(), "Map<String, List<Number>>");
        let st = Type::structure(
            "Person",
            [
                StructField::optional("nick", Type::String),
                StructField::new("age", Type::Number),
            ],
        );
        assert_eq!(st.to_string(), "Struct Person { age: Number, nick?: String }");
        assert_eq!(Type::Cycle(2).to_string(), "Cycle<2>");
    }

    // -----------------------------------------------------------------------
    // TypeCache
    // -----------------------------------------------------------------------

    #[test]
    fn cache_counts_hits() {
        let cache = TypeCache::new();
        assert!(cache.get(b"x").is_none());
        cache.insert(b"x", Type::Number);
        assert_eq!(cache.get(b"x"), Some(Type::Number));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }
}
