//! Grouped header construction.
//!
//! Scans the active column list left to right and produces the two header
//! rows of a grouped table: row one holds the ungrouped columns (spanning
//! both rows) and one synthetic parent cell per group; row two holds the
//! grouped child columns in their left-to-right order.

use docflow_presenter_models::{
    AugmentedColumn, ColumnKind, GroupConfig, ListSchema, Record, TableLevelGroup,
};

/// Renders the parent-record value of a table-level group into a header
/// label. Hosts substitute their own localization; the default renders
/// `Year <value>`.
pub type LabelRenderer<'a> = &'a dyn Fn(&str) -> String;

/// The default table-level group label rendering.
#[must_use]
pub fn default_label_renderer(value: &str) -> String {
    format!("Year {value}")
}

/// The two rows of a grouped header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderRows {
    /// Row one: ungrouped columns with `rowspan = 2` and one synthetic
    /// `field_group` cell per group.
    pub top: Vec<AugmentedColumn>,
    /// Row two: the grouped child columns, each with `rowspan = 1`.
    pub bottom: Vec<AugmentedColumn>,
}

impl HeaderRows {
    /// Number of child cells row one promises via group colspans. Equals
    /// `bottom.len()` for a well-formed header.
    #[must_use]
    pub fn promised_children(&self) -> u32 {
        self.top
            .iter()
            .filter(|c| c.rowspan == Some(1))
            .map(|c| c.colspan.unwrap_or(1))
            .sum()
    }
}

/// Builds the header rows for the active (visible) column list.
///
/// With [`GroupConfig::None`] the result has every column in the top row
/// with no spans set and an empty bottom row.
#[must_use]
pub fn build_header_rows(
    columns: &[AugmentedColumn],
    parent: &Record,
    schema: &ListSchema,
    group: &GroupConfig,
    render_label: LabelRenderer<'_>,
) -> HeaderRows {
    let visible: Vec<&AugmentedColumn> = columns.iter().filter(|c| !c.invisible).collect();

    match group {
        GroupConfig::None => HeaderRows {
            top: visible.into_iter().cloned().collect(),
            bottom: Vec::new(),
        },
        GroupConfig::PerColumn => per_column_rows(&visible, schema),
        GroupConfig::TableLevel(groups) => table_level_rows(&visible, groups, parent, render_label),
    }
}

/// Header rows for per-column `group_start`/`group_end` directives.
fn per_column_rows(visible: &[&AugmentedColumn], schema: &ListSchema) -> HeaderRows {
    let mut rows = HeaderRows::default();
    let mut group_index = 0_usize;
    let mut cursor = 0_usize;

    while cursor < visible.len() {
        let column = visible[cursor];

        if !column.group_start {
            let mut cell = column.clone();
            cell.rowspan = Some(2);
            rows.top.push(cell);
            cursor += 1;
            continue;
        }

        // Walk to the closing column, propagating the group class and the
        // group key to every member.
        let start = cursor;
        let mut end = cursor;
        while end < visible.len() && !visible[end].closes_group() {
            end += 1;
        }
        // A dangling start is rejected at parse time; clamp defensively
        // so malformed input still renders something.
        let end = end.min(visible.len() - 1);

        let key = group_key(column);
        let label = resolve_group_label(column, schema, &key);

        let mut parent_cell = AugmentedColumn::field(
            &format!("column_group_{group_index}"),
            &format!("column_group_{group_index}"),
            &label,
            "char",
        );
        parent_cell.kind = ColumnKind::FieldGroup;
        parent_cell.group_key = Some(key.clone());
        parent_cell.group_class = column.group_class.clone();
        parent_cell.rowspan = Some(1);
        parent_cell.colspan = Some(u32::try_from(end - start + 1).unwrap_or(1));
        rows.top.push(parent_cell);

        for member in &visible[start..=end] {
            let mut cell = (*member).clone();
            cell.group_key = Some(key.clone());
            cell.group_class = column.group_class.clone();
            cell.rowspan = Some(1);
            rows.bottom.push(cell);
        }

        group_index += 1;
        cursor = end + 1;
    }

    rows
}

/// Header rows for the table-level `group_columns` form. The parent label
/// is the parent record's rendered value for the group's field; columns
/// not listed in any group span both rows.
fn table_level_rows(
    visible: &[&AugmentedColumn],
    groups: &[TableLevelGroup],
    parent: &Record,
    render_label: LabelRenderer<'_>,
) -> HeaderRows {
    let mut rows = HeaderRows::default();
    let mut emitted: Vec<&str> = Vec::new();

    for column in visible {
        let Some(group) = groups.iter().find(|g| g.columns.contains(&column.name)) else {
            let mut cell = (*column).clone();
            cell.rowspan = Some(2);
            rows.top.push(cell);
            continue;
        };

        if !emitted.contains(&group.parent_field.as_str()) {
            emitted.push(group.parent_field.as_str());

            let members = visible
                .iter()
                .filter(|c| group.columns.contains(&c.name))
                .count();
            let label = parent
                .display_value(&group.parent_field)
                .map_or_else(|| group.parent_field.clone(), |value| render_label(&value));

            let index = emitted.len() - 1;
            let mut parent_cell = AugmentedColumn::field(
                &format!("column_group_{index}"),
                &format!("column_group_{index}"),
                &label,
                "char",
            );
            parent_cell.kind = ColumnKind::FieldGroup;
            parent_cell.group_key = Some(group.parent_field.clone());
            parent_cell.rowspan = Some(1);
            parent_cell.colspan = Some(u32::try_from(members).unwrap_or(1));
            rows.top.push(parent_cell);
        }

        let mut cell = (*column).clone();
        cell.group_key = Some(group.parent_field.clone());
        cell.rowspan = Some(1);
        rows.bottom.push(cell);
    }

    rows
}

/// The stable key identifying a group: the label field when declared,
/// otherwise the literal header, otherwise the opening column's name.
fn group_key(start: &AugmentedColumn) -> String {
    start
        .group_label_field
        .clone()
        .or_else(|| start.group_header.clone())
        .unwrap_or_else(|| start.name.clone())
}

/// Parent-header label resolution order: schema display name of the label
/// field, then the literal `group_header`, then the group key.
fn resolve_group_label(start: &AugmentedColumn, schema: &ListSchema, key: &str) -> String {
    if let Some(field) = start.group_label_field.as_deref() {
        if let Some(display) = schema.display_name(field) {
            return display.to_owned();
        }
    }
    if let Some(literal) = start.group_header.as_deref() {
        return literal.to_owned();
    }
    key.to_owned()
}
