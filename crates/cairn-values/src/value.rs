//! The value model.
//!
//! # Key Types
//!
//! - [`Value`]: the closed set of storable values.
//! - [`Struct`]: a named record with fields sorted by name.
//!
//! # Design Rules
//!
//! - Two values are equal iff their encodings hash equal. Primitives
//!   short-circuit on their payload, everything else compares hashes.
//! - `Value` deliberately does not implement `std::hash::Hash`; use
//!   [`Value::hash`] or [`OrderedKey`](crate::OrderedKey).

use std::collections::BTreeMap;

use cairn_types::Hash;

use crate::blob::Blob;
use crate::codec::Encoder;
use crate::error::{ValueError, ValueResult};
use crate::kind::Kind;
use crate::list::List;
use crate::map::Map;
use crate::number::Number;
use crate::reference::Ref;
use crate::set::Set;
use crate::types::{cycle_depth, StructField, StructType, Type};

/// A storable value.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Number(Number),
    String(String),
    Blob(Blob),
    List(List),
    Set(Set),
    Map(Map),
    Ref(Ref),
    Struct(Struct),
    Type(Type),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Bool(_) => Kind::Bool,
            Self::Number(_) => Kind::Number,
            Self::String(_) => Kind::String,
            Self::Blob(_) => Kind::Blob,
            Self::List(_) => Kind::List,
            Self::Set(_) => Kind::Set,
            Self::Map(_) => Kind::Map,
            Self::Ref(_) => Kind::Ref,
            Self::Struct(_) => Kind::Struct,
            Self::Type(_) => Kind::Type,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.kind().is_primitive()
    }

    /// Canonical encoding of this value.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_value(self);
        enc.into_bytes()
    }

    /// Content hash. Cached for collections.
    pub fn hash(&self) -> Hash {
        match self {
            Self::Blob(b) => b.sequence().hash(),
            Self::List(l) => l.sequence().hash(),
            Self::Set(s) => s.sequence().hash(),
            Self::Map(m) => m.sequence().hash(),
            _ => Hash::of(&self.encode()),
        }
    }

    /// Structural type of this value.
    pub fn type_of(&self) -> Type {
        self.type_in(&mut Vec::new())
    }

    pub(crate) fn type_in(&self, stack: &mut Vec<String>) -> Type {
        match self {
            Self::Bool(_) => Type::Bool,
            Self::Number(_) => Type::Number,
            Self::String(_) => Type::String,
            Self::Blob(_) => Type::Blob,
            Self::Type(_) => Type::Type,
            Self::List(l) => Type::list(l.sequence().elem_type_in(stack)),
            Self::Set(s) => Type::set(s.sequence().elem_type_in(stack)),
            Self::Map(m) => {
                let (k, v) = m.sequence().entry_types_in(stack);
                Type::map(k, v)
            }
            Self::Ref(r) => Type::reference(r.target_type().recycle(stack)),
            Self::Struct(s) => s.type_in(stack),
        }
    }

    /// Calls `f` for every ref embedded in this value's own encoding.
    ///
    /// Does not follow refs into other chunks.
    pub fn walk_refs(&self, f: &mut dyn FnMut(&Ref)) {
        match self {
            Self::Ref(r) => f(r),
            Self::Struct(s) => {
                for v in s.fields.values() {
                    v.walk_refs(f);
                }
            }
            Self::Blob(b) => b.sequence().walk_refs(f),
            Self::List(l) => l.sequence().walk_refs(f),
            Self::Set(s) => s.sequence().walk_refs(f),
            Self::Map(m) => m.sequence().walk_refs(f),
            Self::Bool(_) | Self::Number(_) | Self::String(_) | Self::Type(_) => {}
        }
    }

    /// Largest height among embedded refs, or 0 when there are none.
    pub fn max_ref_height(&self) -> u64 {
        let mut max = 0;
        self.walk_refs(&mut |r| max = max.max(r.height()));
        max
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::get)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Self::Type(t) => Some(t),
            _ => None,
        }
    }

    /// Build a number value, rejecting non-finite floats.
    pub fn number(v: f64) -> ValueResult<Self> {
        Number::new(v).map(Self::Number)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (a, b) if a.kind() == b.kind() => a.hash() == b.hash(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Number(Number::from(v))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Blob> for Value {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Self::List(l)
    }
}

impl From<Set> for Value {
    fn from(s: Set) -> Self {
        Self::Set(s)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Self::Map(m)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl From<Type> for Value {
    fn from(t: Type) -> Self {
        Self::Type(t)
    }
}

// ---------------------------------------------------------------------------
// Struct
// ---------------------------------------------------------------------------

/// A named record. Field order is always by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Struct {
    name: String,
    fields: BTreeMap<String, Value>,
}

impl Struct {
    /// Build a struct, validating the name and every field name.
    ///
    /// The struct name may be empty (anonymous); field names may not.
    pub fn new<N, I, K>(name: N, fields: I) -> ValueResult<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let name = name.into();
        if !name.is_empty() && !is_valid_name(&name) {
            return Err(ValueError::InvalidName(name));
        }
        let mut map = BTreeMap::new();
        for (k, v) in fields {
            let k = k.into();
            if !is_valid_name(&k) {
                return Err(ValueError::InvalidName(k));
            }
            map.insert(k, v);
        }
        Ok(Self { name, fields: map })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy with `field` set to `value`.
    pub fn set(&self, field: impl Into<String>, value: Value) -> ValueResult<Self> {
        let field = field.into();
        if !is_valid_name(&field) {
            return Err(ValueError::InvalidName(field));
        }
        let mut out = self.clone();
        out.fields.insert(field, value);
        Ok(out)
    }

    /// Copy without `field`.
    pub fn remove(&self, field: &str) -> Self {
        let mut out = self.clone();
        out.fields.remove(field);
        out
    }

    pub(crate) fn from_sorted_fields(name: String, fields: BTreeMap<String, Value>) -> Self {
        Self { name, fields }
    }

    fn type_in(&self, stack: &mut Vec<String>) -> Type {
        if let Some(depth) = cycle_depth(stack, &self.name) {
            return Type::Cycle(depth);
        }
        stack.push(self.name.clone());
        let fields = self
            .fields
            .iter()
            .map(|(k, v)| StructField::new(k.clone(), v.type_in(stack)))
            .collect();
        stack.pop();
        Type::Struct(StructType {
            name: self.name.clone(),
            fields,
        })
    }
}

/// `[A-Za-z][A-Za-z0-9_]*`
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, age: i32) -> Struct {
        Struct::new("Person", [("name", Value::from(name)), ("age", Value::from(age))]).unwrap()
    }

    // -----------------------------------------------------------------------
    // Equality and hashing
    // -----------------------------------------------------------------------

    #[test]
    fn primitives_compare_by_payload() {
        assert_eq!(Value::from(1), Value::from(1u8));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::from(true), Value::from(false));
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = Value::from(person("ada", 36));
        let b = Value::from(person("ada", 36));
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a, Value::from(person("ada", 37)));
    }

    #[test]
    fn hash_covers_kind_tag() {
        assert_ne!(Value::from(false).hash(), Value::from(0).hash());
    }

    // -----------------------------------------------------------------------
    // Structs
    // -----------------------------------------------------------------------

    #[test]
    fn fields_are_sorted_by_name() {
        let s = person("grace", 45);
        let names: Vec<&str> = s.fields().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["age", "name"]);
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(Struct::new("1abc", Vec::<(String, Value)>::new()).is_err());
        assert!(Struct::new("Ok", [("bad-field", Value::from(1))]).is_err());
        assert!(Struct::new("", [("x", Value::from(1))]).is_ok());
    }

    #[test]
    fn set_and_remove_copy() {
        let s = person("ada", 36);
        let older = s.set("age", Value::from(37)).unwrap();
        assert_eq!(s.get("age"), Some(&Value::from(36)));
        assert_eq!(older.get("age"), Some(&Value::from(37)));
        assert_eq!(older.remove("age").len(), 1);
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    #[test]
    fn struct_type_lists_fields() {
        let ty = Value::from(person("ada", 36)).type_of();
        assert_eq!(ty.to_string(), "Struct Person { age: Number, name: String }");
    }

    #[test]
    fn nested_same_name_struct_is_cycle() {
        let leaf = Struct::new("Node", [("v", Value::from(1))]).unwrap();
        let root = Struct::new("Node", [("child", Value::from(leaf)), ("v", Value::from(0))]).unwrap();
        match Value::from(root).type_of() {
            Type::Struct(st) => {
                assert_eq!(st.fields[0].name, "child");
                assert_eq!(st.fields[0].ty, Type::Cycle(0));
            }
            other => panic!("unexpected type {other}"),
        }
    }

    #[test]
    fn primitives_have_no_refs() {
        assert_eq!(Value::from("x").max_ref_height(), 0);
        let mut seen = 0;
        Value::from(person("a", 1)).walk_refs(&mut |_| seen += 1);
        assert_eq!(seen, 0);
    }
}
