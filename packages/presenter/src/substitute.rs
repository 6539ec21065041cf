//! Render-time field and header substitution.
//!
//! Field substitution swaps a column for another column of the view
//! (found in the total column set, invisible columns included) while
//! keeping the original stable id so row identity does not change.
//! Header substitution rewrites a column's label to a parent-record
//! value. Field substitution runs first, so a substituted column may
//! itself be relabeled.

use std::collections::BTreeMap;

use docflow_presenter_models::{AugmentedColumn, Record};

/// The replacement maps parsed from widget options: column name →
/// replacement column name, and column name → parent-record field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    /// `replace_field_<NAME>` directives.
    pub fields: BTreeMap<String, String>,
    /// `replace_header_<NAME>` directives.
    pub headers: BTreeMap<String, String>,
}

impl Replacements {
    /// Returns `true` when both maps are empty, in which case
    /// [`apply`] is the identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.headers.is_empty()
    }
}

/// Applies field then header substitution to the active column list.
///
/// `total` is the full column set of the view, including invisible
/// columns; replacement targets are resolved against it. Missing targets
/// leave the column unchanged (the parser already warned). A parent
/// value that is absent or falsy leaves the label unchanged.
#[must_use]
pub fn apply(
    active: &[AugmentedColumn],
    total: &[AugmentedColumn],
    replacements: &Replacements,
    parent: &Record,
) -> Vec<AugmentedColumn> {
    active
        .iter()
        .map(|column| {
            let mut column = substitute_field(column, total, replacements);
            substitute_header(&mut column, replacements, parent);
            column
        })
        .collect()
}

/// Swaps the column for its configured replacement, keeping the stable id.
fn substitute_field(
    column: &AugmentedColumn,
    total: &[AugmentedColumn],
    replacements: &Replacements,
) -> AugmentedColumn {
    if !column.is_data_field() {
        return column.clone();
    }
    let Some(replacement_name) = replacements.fields.get(&column.name) else {
        return column.clone();
    };
    if replacement_name == &column.name {
        return column.clone();
    }
    let Some(replacement) = total.iter().find(|c| &c.name == replacement_name) else {
        return column.clone();
    };

    let mut substituted = replacement.clone();
    substituted.id = column.id.clone();
    substituted.invisible = column.invisible;
    substituted
}

/// Rewrites the label from the parent record, keeping the old label for
/// tooltips.
fn substitute_header(column: &mut AugmentedColumn, replacements: &Replacements, parent: &Record) {
    if !column.is_data_field() {
        return;
    }
    let Some(parent_field) = replacements.headers.get(&column.name) else {
        return;
    };
    let Some(label) = parent.display_value(parent_field) else {
        return;
    };
    column.original_label = Some(std::mem::replace(&mut column.label, label));
}
