#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Column description, record, and schema types for the section/grouped
//! list presenter.
//!
//! The presenter pipeline is a pure transformation over these types: the
//! host list layer produces raw column descriptions, the directive parser
//! augments them into [`AugmentedColumn`]s, and the downstream passes
//! (row classification, grouped headers, numbering, substitution) only
//! ever read and rewrite these values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// Reserved column name for the synthetic row-number column.
pub const SEQUENCE_COLUMN_NAME: &str = "__sequence_number__";

/// Fixed label of the synthetic row-number column.
pub const SEQUENCE_COLUMN_LABEL: &str = "#";

/// Fixed CSS width of the synthetic row-number column.
pub const SEQUENCE_COLUMN_WIDTH: &str = "50px";

/// The kind of a column in the list description.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnKind {
    /// A regular data field bound to a record value.
    Field,
    /// A synthetic parent header spanning a run of grouped columns.
    FieldGroup,
    /// A column holding row-level buttons instead of a field.
    ButtonGroup,
    /// The synthetic row-number column.
    Sequence,
}

/// A button inside a [`ColumnKind::ButtonGroup`] column.
///
/// Only the grouping flag matters to the presenter; everything else about
/// the button (icon, handler) stays with the host renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnButton {
    /// Button name as declared in the view.
    pub name: String,
    /// `true` when the button's context closes an open column group.
    #[serde(default)]
    pub group_end: bool,
}

/// A column description enriched with parsed directives.
///
/// Produced once per view by the directive parser and treated as
/// immutable afterwards; render passes that need to change a column
/// (colspan assignment, label substitution) clone it first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedColumn {
    /// Stable column id assigned by the host list layer. Retained across
    /// field substitution so row identity stays stable.
    pub id: String,
    /// Field name the column is bound to.
    pub name: String,
    /// What kind of column this is.
    pub kind: ColumnKind,
    /// Header label.
    pub label: String,
    /// Widget name declared on the field, if any.
    pub widget: Option<String>,
    /// `true` when the column is hidden from the rendered table but still
    /// part of the total column set (substitution targets may be
    /// invisible).
    pub invisible: bool,
    /// Data type of the bound field (host-defined, e.g. `"char"`,
    /// `"float"`, `"many2one"`).
    pub field_type: String,
    /// Key of the group this column belongs to, once grouping has been
    /// resolved.
    pub group_key: Option<String>,
    /// CSS class propagated to every member of the group.
    pub group_class: Option<String>,
    /// `true` when this column opens a group.
    pub group_start: bool,
    /// `true` when this column closes a group.
    pub group_end: bool,
    /// Literal parent-header label (`group_header` / `add-label`
    /// directive).
    pub group_header: Option<String>,
    /// Schema field whose display name labels the parent header.
    pub group_label_field: Option<String>,
    /// Name of the column to substitute for this one at render time.
    pub replace_field_with: Option<String>,
    /// Parent-record field whose value replaces this column's label at
    /// render time.
    pub header_from_parent_field: Option<String>,
    /// Label before header substitution, kept for tooltips.
    pub original_label: Option<String>,
    /// Header row span, set by the grouped header builder.
    pub rowspan: Option<u32>,
    /// Cell/header column span, set by grouping and title-row fallback.
    pub colspan: Option<u32>,
    /// Buttons carried by a [`ColumnKind::ButtonGroup`] column.
    pub buttons: Vec<ColumnButton>,
    /// Fixed CSS width, if any (the sequence column pins one).
    pub width: Option<String>,
    /// `true` when the user may toggle the column from the optional-
    /// columns dropdown. The sequence column is never optional.
    pub optional: bool,
}

impl AugmentedColumn {
    /// Creates a plain data-field column with no directives applied.
    #[must_use]
    pub fn field(id: &str, name: &str, label: &str, field_type: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind: ColumnKind::Field,
            label: label.to_owned(),
            widget: None,
            invisible: false,
            field_type: field_type.to_owned(),
            group_key: None,
            group_class: None,
            group_start: false,
            group_end: false,
            group_header: None,
            group_label_field: None,
            replace_field_with: None,
            header_from_parent_field: None,
            original_label: None,
            rowspan: None,
            colspan: None,
            buttons: Vec::new(),
            width: None,
            optional: true,
        }
    }

    /// Creates the synthetic row-number column: first in the row, fixed
    /// label and width, never optional, ignored by every other pass.
    #[must_use]
    pub fn sequence() -> Self {
        let mut column = Self::field(
            SEQUENCE_COLUMN_NAME,
            SEQUENCE_COLUMN_NAME,
            SEQUENCE_COLUMN_LABEL,
            "integer",
        );
        column.kind = ColumnKind::Sequence;
        column.width = Some(SEQUENCE_COLUMN_WIDTH.to_owned());
        column.optional = false;
        column
    }

    /// Returns `true` for columns that participate in grouping, title
    /// classification, and substitution. The sequence column and button
    /// groups do not.
    #[must_use]
    pub fn is_data_field(&self) -> bool {
        self.kind == ColumnKind::Field
    }

    /// Returns `true` when this column closes a group, either directly or
    /// through a button that carries the closing directive.
    #[must_use]
    pub fn closes_group(&self) -> bool {
        self.group_end
            || (self.kind == ColumnKind::ButtonGroup && self.buttons.iter().any(|b| b.group_end))
    }
}

/// One field of the list schema: the host view's field definitions, used
/// to resolve display names for `group_label_field` directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Technical field name.
    pub name: String,
    /// Human-readable display name (e.g. "Year 1").
    pub display_name: String,
    /// Host-defined data type.
    pub field_type: String,
}

/// The list schema: field definitions keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSchema {
    fields: Vec<FieldSchema>,
}

impl ListSchema {
    /// Creates a schema from field definitions.
    #[must_use]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the display name for a field, if the schema defines it.
    #[must_use]
    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.display_name.as_str())
    }
}

/// An opaque record: a JSON object with at least an `is_title` flag plus
/// whatever domain fields the view references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record(serde_json::Map<String, Value>);

impl Record {
    /// Creates a record from a JSON object. Non-object values yield an
    /// empty record.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(serde_json::Map::new()),
        }
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_owned(), value);
    }

    /// Returns `true` when the record is a section/title row
    /// (`is_title` is truthy).
    #[must_use]
    pub fn is_title(&self) -> bool {
        self.get("is_title").is_some_and(is_truthy)
    }

    /// Renders a field value as a display string, or `None` when the
    /// value is absent or falsy (header substitution leaves the label
    /// unchanged in that case).
    #[must_use]
    pub fn display_value(&self, field: &str) -> Option<String> {
        let value = self.get(field)?;
        if !is_truthy(value) {
            return None;
        }
        match value {
            Value::String(s) => Some(s.clone()),
            // Many2one-style [id, display_name] pairs render as the name.
            Value::Array(items) => items.get(1).or_else(|| items.first()).and_then(|v| {
                if let Value::String(s) = v {
                    Some(s.clone())
                } else {
                    Some(v.to_string())
                }
            }),
            other => Some(other.to_string()),
        }
    }
}

/// JavaScript-style truthiness, matching how the host template language
/// evaluates record flags.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Title-row configuration declared on the widget: which column labels a
/// section row and which key column is hidden there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRowConfig {
    /// Name of the column shown in title rows (typically a display/label
    /// column).
    pub title_field: Option<String>,
    /// Name of the column hidden in title rows (typically a key column).
    pub remove_field: Option<String>,
}

impl TitleRowConfig {
    /// Returns `true` when no title/remove pair is configured, in which
    /// case row classification is the identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title_field.is_none() && self.remove_field.is_none()
    }
}

/// One table-level column group: a parent field naming the header and the
/// ordered child columns gathered under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLevelGroup {
    /// Parent-record field whose rendered value labels the group.
    pub parent_field: String,
    /// Names of the child columns gathered under the parent header.
    pub columns: Vec<String>,
}

/// How the grouped header is configured for a view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupConfig {
    /// No grouping; the header is a single row.
    #[default]
    None,
    /// Grouping is declared per column via `group_start`/`group_end`
    /// directives on the columns themselves.
    PerColumn,
    /// Grouping is declared table-level via the `group_columns` option.
    TableLevel(Vec<TableLevelGroup>),
}

impl GroupConfig {
    /// Returns `true` when a grouped (two-row) header applies.
    #[must_use]
    pub const fn is_grouped(&self) -> bool {
        !matches!(self, Self::None)
    }
}
