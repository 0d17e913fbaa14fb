use std::fmt;

use cairn_types::Hash;

use crate::error::{ValueError, ValueResult};
use crate::store::ValueReader;
use crate::types::Type;
use crate::value::Value;

/// A typed pointer to another chunk.
///
/// `height` is 1 plus the largest height among the refs embedded in the
/// target, so a ref to a ref-free value has height 1.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    target: Hash,
    target_type: Type,
    height: u64,
}

impl Ref {
    /// Point at `value`.
    pub fn new(value: &Value) -> Self {
        Self {
            target: value.hash(),
            target_type: value.type_of(),
            height: value.max_ref_height() + 1,
        }
    }

    pub(crate) fn from_parts(target: Hash, target_type: Type, height: u64) -> Self {
        Self {
            target,
            target_type,
            height,
        }
    }

    pub fn target(&self) -> Hash {
        self.target
    }

    pub fn target_type(&self) -> &Type {
        &self.target_type
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Load the target and check it has the declared type.
    pub fn target_value(&self, vr: &dyn ValueReader) -> ValueResult<Value> {
        let value = vr
            .read_value(&self.target)?
            .ok_or(ValueError::NotFound(self.target))?;
        let actual = value.type_of();
        if actual != self.target_type {
            return Err(ValueError::TypeMismatch {
                target: self.target,
                expected: self.target_type.clone(),
                actual,
            });
        }
        Ok(value)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}>({}, height {})", self.target_type, self.target.short(), self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ValueStore, ValueWriter};
    use crate::value::Struct;

    #[test]
    fn height_counts_nested_refs() {
        let leaf = Value::from("leaf");
        let r1 = Ref::new(&leaf);
        assert_eq!(r1.height(), 1);
        let holder = Value::from(Struct::new("Holder", [("next", Value::from(r1.clone()))]).unwrap());
        let r2 = Ref::new(&holder);
        assert_eq!(r2.height(), 2);
        assert_eq!(r2.target_type().to_string(), "Struct Holder { next: Ref<String> }");
    }

    #[test]
    fn target_value_resolves_through_store() {
        let vs = ValueStore::in_memory().unwrap();
        let r = vs.write_value(&Value::from(42)).unwrap();
        assert_eq!(r.target_value(&vs).unwrap(), Value::from(42));
    }

    #[test]
    fn target_value_reports_missing() {
        let vs = ValueStore::in_memory().unwrap();
        let r = Ref::new(&Value::from("never written"));
        assert!(matches!(r.target_value(&vs), Err(ValueError::NotFound(_))));
    }

    #[test]
    fn target_value_checks_type() {
        let vs = ValueStore::in_memory().unwrap();
        let written = vs.write_value(&Value::from(7)).unwrap();
        let lying = Ref::from_parts(written.target(), Type::String, 1);
        assert!(matches!(lying.target_value(&vs), Err(ValueError::TypeMismatch { .. })));
    }
}
