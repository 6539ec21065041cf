#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Section/grouped list presenter.
//!
//! A declarative layer that transforms a uniform row/column table
//! description, a record stream, and a set of per-column directives into
//! a rendered table with two-level grouped headers, title/section rows,
//! automatic row numbering, and per-column field/header substitution.
//!
//! The pipeline is a pure function of `(columns, records, parent)`:
//! directives are parsed once per view ([`directives::parse`]), and each
//! render composes substitution, numbering, header construction, and
//! per-row classification over the parsed configuration. Re-running it
//! with the same inputs produces the same output.

pub mod classify;
pub mod directives;
pub mod headers;
pub mod sequence;
pub mod substitute;

use std::collections::BTreeMap;

use docflow_presenter_models::{AugmentedColumn, GroupConfig, ListSchema, Record, TitleRowConfig};

use crate::classify::RowProjection;
use crate::headers::{HeaderRows, LabelRenderer};
use crate::substitute::Replacements;

/// Errors raised while parsing column directives.
///
/// These are the structural errors: the surrounding component reacts by
/// rendering an empty table and surfacing the diagnostic. Soft errors
/// (unknown substitution targets) are logged and skipped instead.
#[derive(Debug, thiserror::Error)]
pub enum DirectiveError {
    /// A `group_start` was found while another group was still open.
    #[error("column '{column}' starts a group inside the group opened by '{started_by}'")]
    NestedGroup {
        /// Column that opened the enclosing group.
        started_by: String,
        /// Column carrying the nested `group_start`.
        column: String,
    },

    /// A `group_end` with no matching `group_start`.
    #[error("column '{column}' ends a group that was never started")]
    UnmatchedGroupEnd {
        /// Column carrying the dangling `group_end`.
        column: String,
    },

    /// A `group_start` that never closes.
    #[error("group opened by column '{started_by}' is never closed")]
    UnclosedGroup {
        /// Column that opened the group.
        started_by: String,
    },

    /// An option value had the wrong JSON shape.
    #[error("option '{key}' is invalid: expected {expected}")]
    InvalidOption {
        /// The offending option key.
        key: String,
        /// What the parser expected to find.
        expected: String,
    },
}

/// The parsed, immutable per-view configuration: augmented columns plus
/// the grouping, title-row, and replacement directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenterConfig {
    /// The total column set, directives applied, invisible columns
    /// included.
    pub columns: Vec<AugmentedColumn>,
    /// How the grouped header is configured.
    pub group: GroupConfig,
    /// Title-row column toggling.
    pub title: TitleRowConfig,
    /// `replace_field_<NAME>` directives, validated against the total
    /// column set.
    pub field_replacements: BTreeMap<String, String>,
    /// `replace_header_<NAME>` directives.
    pub header_replacements: BTreeMap<String, String>,
}

impl PresenterConfig {
    /// The replacement maps in the form the substitution pass consumes.
    #[must_use]
    pub fn replacements(&self) -> Replacements {
        Replacements {
            fields: self.field_replacements.clone(),
            headers: self.header_replacements.clone(),
        }
    }
}

/// A fully projected table: grouped header rows, per-row column lists,
/// and the table marker class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableProjection {
    /// The one- or two-row header.
    pub header: HeaderRows,
    /// One projection per record, numbered 1..N.
    pub rows: Vec<RowProjection>,
    /// Table-level CSS class.
    pub css_class: String,
    /// Diagnostic carried by the empty fallback projection.
    pub diagnostic: Option<String>,
}

impl TableProjection {
    /// The empty table rendered when directive parsing fails, carrying
    /// the diagnostic for the host to surface.
    #[must_use]
    pub fn empty(diagnostic: &DirectiveError) -> Self {
        Self {
            header: HeaderRows::default(),
            rows: Vec::new(),
            css_class: classify::TABLE_CLASS.to_owned(),
            diagnostic: Some(diagnostic.to_string()),
        }
    }
}

/// Projects records through the full pipeline: substitution over the
/// active columns, row-number injection, grouped header construction,
/// and per-row title/data classification.
#[must_use]
pub fn project(
    config: &PresenterConfig,
    records: &[Record],
    parent: &Record,
    schema: &ListSchema,
    render_label: LabelRenderer<'_>,
) -> TableProjection {
    let active: Vec<AugmentedColumn> = config
        .columns
        .iter()
        .filter(|c| !c.invisible)
        .cloned()
        .collect();

    let active = substitute::apply(&active, &config.columns, &config.replacements(), parent);
    let active = sequence::inject(active);

    let header = headers::build_header_rows(&active, parent, schema, &config.group, render_label);

    let rows = records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let index = u32::try_from(position + 1).unwrap_or(u32::MAX);
            classify::classify_row(&active, record, index, &config.title)
        })
        .collect();

    TableProjection {
        header,
        rows,
        css_class: classify::TABLE_CLASS.to_owned(),
        diagnostic: None,
    }
}
