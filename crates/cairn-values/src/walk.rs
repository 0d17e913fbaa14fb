//! Breadth-first reachability over the chunk graph.

use std::collections::HashSet;

use cairn_types::Hash;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::error::{ValueError, ValueResult};
use crate::store::ValueReader;
use crate::value::Value;

/// Visit every chunk reachable from `root` through refs, each once.
///
/// Each frontier level is loaded with one `read_many_values` call. `visit`
/// returns `false` to skip descending into a chunk. Returns `Ok(false)` if
/// the walk was cancelled before finishing. A ref to a missing chunk fails
/// with [`ValueError::NotFound`].
pub fn walk_refs(
    vr: &dyn ValueReader,
    root: &Value,
    cancel: &CancelSignal,
    visit: &mut dyn FnMut(&Hash, &Value) -> bool,
) -> ValueResult<bool> {
    let mut seen = HashSet::new();
    let mut frontier = Vec::new();
    collect_targets(root, &mut seen, &mut frontier);

    let mut levels = 0usize;
    while !frontier.is_empty() {
        if cancel.is_cancelled() {
            debug!(levels, visited = seen.len(), "walk cancelled");
            return Ok(false);
        }
        let values = vr.read_many_values(&frontier)?;
        let mut next = Vec::new();
        for (hash, value) in frontier.iter().zip(values) {
            let value = value.ok_or(ValueError::NotFound(*hash))?;
            if visit(hash, &value) {
                collect_targets(&value, &mut seen, &mut next);
            }
        }
        frontier = next;
        levels += 1;
    }
    debug!(levels, visited = seen.len(), "walk finished");
    Ok(true)
}

fn collect_targets(value: &Value, seen: &mut HashSet<Hash>, out: &mut Vec<Hash>) {
    value.walk_refs(&mut |r| {
        if seen.insert(r.target()) {
            out.push(r.target());
        }
    });
}
