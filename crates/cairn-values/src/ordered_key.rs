use std::cmp::Ordering;

use cairn_types::Hash;

use crate::number::Number;
use crate::value::Value;

/// Sort key of an entry in an ordered collection.
///
/// Primitives are keyed by value; every other value by its hash. All value
/// keys sort before all hash keys. Value keys compare by kind first
/// (`Bool < Number < String`), then by payload.
#[derive(Clone, Debug)]
pub enum OrderedKey {
    Value(Value),
    Hash(Hash),
}

impl OrderedKey {
    pub fn of(value: &Value) -> Self {
        if value.is_primitive() {
            Self::Value(value.clone())
        } else {
            Self::Hash(value.hash())
        }
    }

    /// Key used by indexed (List and Blob) meta tuples.
    pub(crate) fn from_count(n: u64) -> Self {
        Self::Value(Value::Number(Number::from(n)))
    }

    pub fn is_by_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Hash(_) => None,
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            Self::Value(v) => v.hash(),
            Self::Hash(h) => *h,
        }
    }
}

fn compare_primitives(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        // Mixed or non-primitive: fall back to kind, then hash.
        _ => a.kind().cmp(&b.kind()).then_with(|| a.hash().cmp(&b.hash())),
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => compare_primitives(a, b),
            (Self::Value(_), Self::Hash(_)) => Ordering::Less,
            (Self::Hash(_), Self::Value(_)) => Ordering::Greater,
            (Self::Hash(a), Self::Hash(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Struct;

    #[test]
    fn kinds_order_before_payload() {
        let mut keys = vec![
            OrderedKey::of(&Value::from("a")),
            OrderedKey::of(&Value::from(10)),
            OrderedKey::of(&Value::from(true)),
            OrderedKey::of(&Value::from(-3)),
            OrderedKey::of(&Value::from(false)),
        ];
        keys.sort();
        let values: Vec<Value> = keys.iter().filter_map(|k| k.value().cloned()).collect();
        assert_eq!(
            values,
            vec![
                Value::from(false),
                Value::from(true),
                Value::from(-3),
                Value::from(10),
                Value::from("a"),
            ]
        );
    }

    #[test]
    fn hash_keys_sort_after_values() {
        let s = Value::from(Struct::new("S", Vec::<(String, Value)>::new()).unwrap());
        let by_hash = OrderedKey::of(&s);
        assert!(!by_hash.is_by_value());
        assert!(OrderedKey::of(&Value::from("zzz")) < by_hash);
        assert_eq!(by_hash.hash(), s.hash());
    }

    #[test]
    fn strings_compare_bytewise() {
        assert!(OrderedKey::of(&Value::from("B")) < OrderedKey::of(&Value::from("a")));
        assert!(OrderedKey::of(&Value::from("ab")) < OrderedKey::of(&Value::from("b")));
    }
}
