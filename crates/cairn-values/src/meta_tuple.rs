use crate::error::{ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::reference::Ref;
use crate::sequence::Sequence;
use crate::store::ValueReader;

/// One entry of an interior tree node.
///
/// `key` is the largest key in the child's subtree (ordered collections) or
/// the child's leaf count (indexed collections). `child` optionally holds
/// the child sequence in memory; it is a cache and never part of equality
/// or of the encoding.
#[derive(Clone, Debug)]
pub struct MetaTuple {
    child_ref: Ref,
    key: OrderedKey,
    num_leaves: u64,
    child: Option<Sequence>,
}

impl MetaTuple {
    pub fn new(child_ref: Ref, key: OrderedKey, num_leaves: u64) -> Self {
        Self {
            child_ref,
            key,
            num_leaves,
            child: None,
        }
    }

    pub(crate) fn with_child(mut self, child: Sequence) -> Self {
        self.child = Some(child);
        self
    }

    pub fn child_ref(&self) -> &Ref {
        &self.child_ref
    }

    pub fn key(&self) -> &OrderedKey {
        &self.key
    }

    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// The in-memory child, if this tuple carries one.
    pub(crate) fn cached_child(&self) -> Option<&Sequence> {
        self.child.as_ref()
    }

    /// Load the child sequence, from memory when possible.
    pub fn child_sequence(&self, vr: &dyn ValueReader) -> ValueResult<Sequence> {
        if let Some(child) = &self.child {
            return Ok(child.clone());
        }
        let target = self.child_ref.target();
        let value = vr.read_value(&target)?.ok_or(ValueError::NotFound(target))?;
        Sequence::from_value(value, self.child_ref.target_type().kind())
    }
}

impl PartialEq for MetaTuple {
    fn eq(&self, other: &Self) -> bool {
        self.child_ref == other.child_ref && self.key == other.key && self.num_leaves == other.num_leaves
    }
}

impl Eq for MetaTuple {}
