//! Update operations over a record's value list.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Kinds of updates applicable to a record's value list. The `*OrCreate`
/// variants differ only at the dispatch layer (they may create the record
/// first); against an existing value list they behave like their plain
/// counterparts.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateOperation {
    ReplaceAll,
    ReplaceAllOrCreate,
    AppendWithDuplication,
    Append,
    AppendOrCreate,
    Remove,
    ReplaceSingleton,
    Substitute,
    Clear,

    /// Forward-compatibility arm for operation codes newer than this
    /// version; applying it changes nothing.
    #[serde(other)]
    Unrecognized,
}

/// Applies one update operation to `values` in place. Returns true iff the
/// list changed.
pub(crate) fn apply_update(
    values: &mut Vec<String>,
    new_values: &[String],
    old_values: &[String],
    op: UpdateOperation,
) -> bool {
    match op {
        UpdateOperation::ReplaceAll | UpdateOperation::ReplaceAllOrCreate => {
            values.clear();
            values.extend_from_slice(new_values);
            true
        }
        UpdateOperation::AppendWithDuplication => {
            values.extend_from_slice(new_values);
            !new_values.is_empty()
        }
        UpdateOperation::Append | UpdateOperation::AppendOrCreate => {
            // union semantics: collapse duplicates, order not guaranteed
            let mut singles: HashSet<String> = values.drain(..).collect();
            singles.extend(new_values.iter().cloned());
            values.extend(singles);
            true
        }
        UpdateOperation::Remove => {
            let before = values.len();
            values.retain(|v| !new_values.contains(v));
            values.len() != before
        }
        UpdateOperation::ReplaceSingleton => {
            values.clear();
            if let Some(first) = new_values.first() {
                values.push(first.clone());
            }
            true
        }
        UpdateOperation::Substitute => {
            // pairwise old[i] -> new[i], stopping at the shorter list
            let mut changed = false;
            for (old_val, new_val) in old_values.iter().zip(new_values.iter())
            {
                for slot in values.iter_mut() {
                    if slot == old_val {
                        *slot = new_val.clone();
                        changed = true;
                    }
                }
            }
            changed
        }
        UpdateOperation::Clear => {
            values.clear();
            true
        }
        UpdateOperation::Unrecognized => false,
    }
}
