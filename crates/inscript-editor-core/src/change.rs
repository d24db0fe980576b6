//! Decides whether a candidate state is worth a new history entry.

use std::collections::BTreeSet;

use smol_str::SmolStr;

use crate::snapshot::DocumentFields;

/// True when `current` differs from `baseline` in content, title, tag set or
/// category set.
///
/// Tag and category order is ignored, as are duplicates. Timestamps and the
/// original marker never count as a change.
pub fn has_meaningful_change(current: &impl DocumentFields, baseline: &impl DocumentFields) -> bool {
    current.content() != baseline.content()
        || current.title() != baseline.title()
        || !same_set(current.tags(), baseline.tags())
        || !same_set(current.categories(), baseline.categories())
}

/// Set equality over two string lists.
pub fn same_set(a: &[SmolStr], b: &[SmolStr]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(SmolStr::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(SmolStr::as_str).collect();
    a == b
}
