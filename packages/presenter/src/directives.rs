//! Per-column directive parsing.
//!
//! Translates the raw column descriptions produced by the host list layer,
//! the per-field `context` maps, and the field widget's `options` map into
//! a [`PresenterConfig`]: augmented columns plus the table-level grouping,
//! title-row, and replacement configuration. Parsing happens once per
//! view; the result is immutable. Parent-record-derived label values are
//! re-read on every render by the downstream passes.

use std::collections::BTreeMap;

use docflow_presenter_models::{
    AugmentedColumn, ColumnButton, ColumnKind, GroupConfig, TableLevelGroup, TitleRowConfig,
};
use serde_json::Value;

use crate::{DirectiveError, PresenterConfig};

/// Widget options key prefix for field substitution directives.
const REPLACE_FIELD_PREFIX: &str = "replace_field_";

/// Widget options key prefix for header substitution directives.
const REPLACE_HEADER_PREFIX: &str = "replace_header_";

/// A button on a raw column, with its declared context.
#[derive(Debug, Clone, Default)]
pub struct RawButton {
    /// Button name as declared in the view.
    pub name: String,
    /// Context map declared on the button.
    pub context: serde_json::Map<String, Value>,
}

/// A raw column description as produced by the host list layer, before
/// any directive has been applied.
#[derive(Debug, Clone)]
pub struct RawColumn {
    /// Stable column id assigned by the host.
    pub id: String,
    /// Field name the column is bound to.
    pub name: String,
    /// Column kind (`field` or `button_group`).
    pub kind: ColumnKind,
    /// Header label.
    pub label: String,
    /// Widget name declared on the field, if any.
    pub widget: Option<String>,
    /// `true` when the column is hidden.
    pub invisible: bool,
    /// Host-defined data type of the bound field.
    pub field_type: String,
    /// Per-field `context` map, which may carry directives.
    pub context: serde_json::Map<String, Value>,
    /// Buttons, for `button_group` columns.
    pub buttons: Vec<RawButton>,
}

impl RawColumn {
    /// Creates a plain field column with an empty context.
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
            context: serde_json::Map::new(),
            buttons: Vec::new(),
        }
    }

    /// Adds a context directive to this column.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_owned(), value);
        self
    }
}

/// Parses raw columns and widget options into a [`PresenterConfig`].
///
/// Soft errors (unknown `replace_field_*` target) are logged and skipped;
/// structural errors (unbalanced group markers) are returned as
/// [`DirectiveError`] so the caller can fall back to an empty table with
/// a diagnostic.
///
/// # Errors
///
/// Returns [`DirectiveError`] when group markers are unbalanced or nested,
/// or when an option value has the wrong shape.
pub fn parse(
    raw_columns: &[RawColumn],
    options: &serde_json::Map<String, Value>,
) -> Result<PresenterConfig, DirectiveError> {
    let columns: Vec<AugmentedColumn> = raw_columns.iter().map(augment).collect();

    validate_group_markers(&columns)?;

    let per_column_groups = columns.iter().any(|c| c.group_start);

    let mut config = PresenterConfig {
        group: if per_column_groups {
            GroupConfig::PerColumn
        } else {
            GroupConfig::None
        },
        columns,
        title: TitleRowConfig::default(),
        field_replacements: BTreeMap::new(),
        header_replacements: BTreeMap::new(),
    };

    for (key, value) in options {
        if let Some(target) = key.strip_prefix(REPLACE_FIELD_PREFIX) {
            parse_replace_field(&mut config, target, value);
        } else if let Some(target) = key.strip_prefix(REPLACE_HEADER_PREFIX) {
            parse_replace_header(&mut config, target, key, value)?;
        } else {
            match key.as_str() {
                "group_columns" => parse_group_columns(&mut config, value)?,
                "titleField" => {
                    config.title.title_field = as_string(value, key)?;
                }
                "removeField" => {
                    config.title.remove_field = as_string(value, key)?;
                }
                // Unrecognized options belong to other widgets; ignore.
                _ => {}
            }
        }
    }

    apply_replacement_marks(&mut config);

    Ok(config)
}

/// Builds one augmented column from a raw description, reading the
/// recognized per-field context directives.
fn augment(raw: &RawColumn) -> AugmentedColumn {
    let mut column = AugmentedColumn::field(&raw.id, &raw.name, &raw.label, &raw.field_type);
    column.kind = raw.kind;
    column.widget = raw.widget.clone();
    column.invisible = raw.invisible;
    column.buttons = raw
        .buttons
        .iter()
        .map(|b| ColumnButton {
            name: b.name.clone(),
            group_end: b.context.get("group_end").is_some_and(context_flag),
        })
        .collect();

    // `add-label` is a legacy alias of `group_header`.
    column.group_header = raw
        .context
        .get("group_header")
        .or_else(|| raw.context.get("add-label"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    column.group_start = raw.context.get("group_start").is_some_and(context_flag);
    column.group_end = raw.context.get("group_end").is_some_and(context_flag);
    column.group_class = raw
        .context
        .get("group_class")
        .and_then(Value::as_str)
        .map(str::to_owned);
    column.group_label_field = raw
        .context
        .get("group_label_field")
        .and_then(Value::as_str)
        .map(str::to_owned);

    column
}

/// Context flags may be written as booleans or as `1`/`"1"`.
fn context_flag(value: &Value) -> bool {
    docflow_presenter_models::is_truthy(value)
}

/// Checks that `group_start`/`group_end` markers pair up left to right
/// with no nesting and no dangling marker.
fn validate_group_markers(columns: &[AugmentedColumn]) -> Result<(), DirectiveError> {
    let mut open: Option<&str> = None;

    for column in columns {
        if column.group_start {
            if let Some(started_by) = open {
                return Err(DirectiveError::NestedGroup {
                    started_by: started_by.to_owned(),
                    column: column.name.clone(),
                });
            }
            open = Some(column.name.as_str());
        }
        if column.closes_group() && open.take().is_none() {
            return Err(DirectiveError::UnmatchedGroupEnd {
                column: column.name.clone(),
            });
        }
    }

    if let Some(started_by) = open {
        return Err(DirectiveError::UnclosedGroup {
            started_by: started_by.to_owned(),
        });
    }

    Ok(())
}

/// Handles one `replace_field_<NAME>` option. Unknown targets are a soft
/// error: warn and leave the column unchanged.
fn parse_replace_field(config: &mut PresenterConfig, target: &str, value: &Value) {
    let Some(replacement) = value.as_str() else {
        log::warn!("replace_field_{target}: expected a column name string, got {value}");
        return;
    };

    let known = config.columns.iter().any(|c| c.name == replacement);
    if !known {
        log::warn!(
            "replace_field_{target}: no column named '{replacement}' in the view (including invisible columns); leaving '{target}' unchanged"
        );
        return;
    }

    config
        .field_replacements
        .insert(target.to_owned(), replacement.to_owned());
}

/// Handles one `replace_header_<NAME>` option.
fn parse_replace_header(
    config: &mut PresenterConfig,
    target: &str,
    key: &str,
    value: &Value,
) -> Result<(), DirectiveError> {
    let parent_field = as_string(value, key)?.ok_or_else(|| DirectiveError::InvalidOption {
        key: key.to_owned(),
        expected: "a parent-record field name".to_owned(),
    })?;
    config
        .header_replacements
        .insert(target.to_owned(), parent_field);
    Ok(())
}

/// Handles the table-level `group_columns` option:
/// `{ parent_field: [child column names] }`.
fn parse_group_columns(config: &mut PresenterConfig, value: &Value) -> Result<(), DirectiveError> {
    let Value::Object(map) = value else {
        return Err(DirectiveError::InvalidOption {
            key: "group_columns".to_owned(),
            expected: "an object mapping parent fields to column name lists".to_owned(),
        });
    };

    if config.group.is_grouped() {
        // Per-column markers already define the grouping; the table-level
        // form is ignored rather than merged.
        log::warn!("group_columns ignored: per-column group markers are already present");
        return Ok(());
    }

    let mut groups = Vec::with_capacity(map.len());
    for (parent_field, children) in map {
        let Value::Array(items) = children else {
            return Err(DirectiveError::InvalidOption {
                key: format!("group_columns.{parent_field}"),
                expected: "a list of column names".to_owned(),
            });
        };
        let columns: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if columns.len() != items.len() {
            return Err(DirectiveError::InvalidOption {
                key: format!("group_columns.{parent_field}"),
                expected: "a list of column name strings".to_owned(),
            });
        }
        groups.push(TableLevelGroup {
            parent_field: parent_field.clone(),
            columns,
        });
    }

    config.group = GroupConfig::TableLevel(groups);
    Ok(())
}

/// Copies the validated replacement maps onto the affected columns so the
/// render passes can work column-local.
fn apply_replacement_marks(config: &mut PresenterConfig) {
    for column in &mut config.columns {
        if let Some(replacement) = config.field_replacements.get(&column.name) {
            column.replace_field_with = Some(replacement.clone());
        }
        if let Some(parent_field) = config.header_replacements.get(&column.name) {
            column.header_from_parent_field = Some(parent_field.clone());
        }
    }
}

fn as_string(value: &Value, key: &str) -> Result<Option<String>, DirectiveError> {
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        other => Err(DirectiveError::InvalidOption {
            key: key.to_owned(),
            expected: format!("a string, got {other}"),
        }),
    }
}
