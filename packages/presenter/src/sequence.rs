//! Automatic row-number column.
//!
//! Injects a synthetic first column carrying the row's 1-based position
//! in the current list projection. The column is invisible to grouping,
//! substitution, and row classification, which all key off its
//! [`ColumnKind::Sequence`] kind.

use docflow_presenter_models::{AugmentedColumn, ColumnKind};

/// Prepends the row-number column unless one is already present.
#[must_use]
pub fn inject(columns: Vec<AugmentedColumn>) -> Vec<AugmentedColumn> {
    if columns.iter().any(|c| c.kind == ColumnKind::Sequence) {
        return columns;
    }
    let mut with_sequence = Vec::with_capacity(columns.len() + 1);
    with_sequence.push(AugmentedColumn::sequence());
    with_sequence.extend(columns);
    with_sequence
}

/// The rendered cell value for a row at the given 0-based position.
#[must_use]
pub fn cell_value(position: usize) -> String {
    (position + 1).to_string()
}
