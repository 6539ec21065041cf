//! Row classification: title/section rows vs data rows.
//!
//! Given the active column list and a record, produces the effective
//! column list for that row. Title rows hide the key column, show the
//! title column, and may merge a run of data columns into a single
//! spanning label cell. Data rows hide the title column so the key column
//! is what users edit.

use docflow_presenter_models::{AugmentedColumn, Record, TitleRowConfig, is_truthy};

/// CSS classes added to title rows.
pub const TITLE_ROW_CLASSES: &[&str] = &["section", "bold"];

/// Marker class carried by the table as a whole.
pub const TABLE_CLASS: &str = "section-list-view";

/// Widget name that marks a column as the dedicated title cell.
pub const TITLE_WIDGET: &str = "section_title";

/// The effective presentation of one row: its 1-based position, the
/// column list to render, and the row-level CSS classes.
#[derive(Debug, Clone, PartialEq)]
pub struct RowProjection {
    /// 1-based position of the row in the current list projection.
    pub index: u32,
    /// Columns to render for this row.
    pub columns: Vec<AugmentedColumn>,
    /// Row-level CSS classes (`section bold` for title rows).
    pub css_classes: Vec<String>,
}

/// Keys that can be pressed while a cell is in edit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    /// The Enter key.
    Enter,
    /// The Tab key.
    Tab,
    /// Shift+Tab.
    ShiftTab,
}

/// Whether a key leaves edit mode. With toggled column visibility there
/// is no stable in-row navigation order, so every navigation key exits.
#[must_use]
pub const fn leaves_edit_mode(key: EditKey) -> bool {
    matches!(key, EditKey::Enter | EditKey::Tab | EditKey::ShiftTab)
}

/// Whether a newly added row must be created as a title row, per the
/// `default_is_title` key of the row-add context.
#[must_use]
pub fn new_row_is_title(context: &Record) -> bool {
    context.get("default_is_title").is_some_and(is_truthy)
}

/// Produces the effective column list for one record.
///
/// Identity cases: non-title rows with no `title_field` configured, and
/// any row when the [`TitleRowConfig`] is empty.
#[must_use]
pub fn classify_row(
    columns: &[AugmentedColumn],
    record: &Record,
    index: u32,
    config: &TitleRowConfig,
) -> RowProjection {
    if config.is_empty() {
        return RowProjection {
            index,
            columns: columns.to_vec(),
            css_classes: row_classes(record),
        };
    }

    let projected = if record.is_title() {
        title_columns(columns, config)
    } else {
        data_columns(columns, config)
    };

    RowProjection {
        index,
        columns: projected,
        css_classes: row_classes(record),
    }
}

/// Row-level CSS classes for a record.
#[must_use]
pub fn row_classes(record: &Record) -> Vec<String> {
    if record.is_title() {
        TITLE_ROW_CLASSES.iter().map(|&s| s.to_owned()).collect()
    } else {
        Vec::new()
    }
}

/// Column list for a title row: hide the remove column, keep the title
/// column visible, and merge the title cell with the run of data columns
/// that follows it.
fn title_columns(columns: &[AugmentedColumn], config: &TitleRowConfig) -> Vec<AugmentedColumn> {
    let mut toggled: Vec<AugmentedColumn> = columns
        .iter()
        .map(|c| {
            let mut column = c.clone();
            if config.remove_field.as_deref() == Some(column.name.as_str()) {
                column.invisible = true;
            }
            if config.title_field.as_deref() == Some(column.name.as_str()) {
                column.invisible = false;
            }
            column
        })
        .collect();

    let Some(title_field) = config.title_field.as_deref() else {
        return toggled;
    };

    // Preferred path: a column carrying the dedicated title widget is
    // replaced by the title column in place.
    let anchor = toggled
        .iter()
        .position(|c| c.widget.as_deref() == Some(TITLE_WIDGET))
        .or_else(|| {
            // Fallback: the first visible column bound to the title field.
            toggled
                .iter()
                .position(|c| !c.invisible && c.name == title_field)
        });

    let Some(anchor) = anchor else {
        return toggled;
    };

    if let Some(title_column) = columns.iter().find(|c| c.name == title_field) {
        let id = toggled[anchor].id.clone();
        let mut merged = title_column.clone();
        merged.id = id;
        merged.invisible = false;
        toggled[anchor] = merged;
    }

    // Span the title cell over the consecutive data columns that follow,
    // then drop the spanned columns from the row.
    let spanned = toggled[anchor + 1..]
        .iter()
        .take_while(|c| c.is_data_field() && !c.invisible)
        .count();
    toggled[anchor].colspan = Some(1 + u32::try_from(spanned).unwrap_or(u32::MAX - 1));
    toggled.drain(anchor + 1..anchor + 1 + spanned);

    toggled
}

/// Column list for a data row: the title column is hidden so the
/// key column is what users edit.
fn data_columns(columns: &[AugmentedColumn], config: &TitleRowConfig) -> Vec<AugmentedColumn> {
    columns
        .iter()
        .map(|c| {
            let mut column = c.clone();
            if config.title_field.as_deref() == Some(column.name.as_str()) {
                column.invisible = true;
            }
            column
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_presenter_models::ColumnKind;
    use serde_json::json;

    fn config() -> TitleRowConfig {
        TitleRowConfig {
            title_field: Some("display_name".to_owned()),
            remove_field: Some("product_id".to_owned()),
        }
    }

    fn columns() -> Vec<AugmentedColumn> {
        vec![
            AugmentedColumn::field("c1", "product_id", "Product", "many2one"),
            AugmentedColumn::field("c2", "display_name", "Name", "char"),
            AugmentedColumn::field("c3", "qty", "Qty", "float"),
            AugmentedColumn::field("c4", "uom", "UoM", "char"),
        ]
    }

    fn title_record() -> Record {
        Record::from_value(json!({"is_title": true}))
    }

    fn data_record() -> Record {
        Record::from_value(json!({"is_title": false}))
    }

    #[test]
    fn title_row_hides_remove_field_and_spans() {
        let row = classify_row(&columns(), &title_record(), 1, &config());
        // product_id hidden; display_name anchors and spans qty + uom.
        let visible: Vec<&str> = row
            .columns
            .iter()
            .filter(|c| !c.invisible)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(visible, vec!["display_name"]);
        let title = row.columns.iter().find(|c| c.name == "display_name").unwrap();
        assert_eq!(title.colspan, Some(3));
    }

    #[test]
    fn title_row_gets_section_classes() {
        let row = classify_row(&columns(), &title_record(), 1, &config());
        assert_eq!(row.css_classes, vec!["section", "bold"]);
    }

    #[test]
    fn data_row_hides_title_field() {
        let row = classify_row(&columns(), &data_record(), 2, &config());
        let visible: Vec<&str> = row
            .columns
            .iter()
            .filter(|c| !c.invisible)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(visible, vec!["product_id", "qty", "uom"]);
        assert!(row.css_classes.is_empty());
    }

    #[test]
    fn title_widget_column_is_replaced_in_place() {
        let mut cols = columns();
        cols[0].widget = Some(TITLE_WIDGET.to_owned());
        let row = classify_row(&cols, &title_record(), 1, &config());
        // The widget column's slot now holds the title column, with the
        // original stable id.
        assert_eq!(row.columns[0].name, "display_name");
        assert_eq!(row.columns[0].id, "c1");
    }

    #[test]
    fn span_stops_at_non_data_columns() {
        let mut cols = columns();
        cols[2].kind = docflow_presenter_models::ColumnKind::ButtonGroup;
        let row = classify_row(&cols, &title_record(), 1, &config());
        let title = row.columns.iter().find(|c| c.name == "display_name").unwrap();
        // Only itself: the button group right after stops the run.
        assert_eq!(title.colspan, Some(1));
    }

    #[test]
    fn non_title_row_is_identity_without_title_field() {
        let cols = columns();
        let no_title = TitleRowConfig {
            title_field: None,
            remove_field: Some("product_id".to_owned()),
        };
        let row = classify_row(&cols, &data_record(), 1, &no_title);
        assert_eq!(row.columns, cols);
    }

    #[test]
    fn empty_config_is_identity_even_for_title_rows() {
        let cols = columns();
        let row = classify_row(&cols, &title_record(), 1, &TitleRowConfig::default());
        assert_eq!(row.columns, cols);
    }

    #[test]
    fn sequence_column_is_untouched() {
        let mut cols = vec![AugmentedColumn::sequence()];
        cols.extend(columns());
        let row = classify_row(&cols, &title_record(), 1, &config());
        assert_eq!(row.columns[0].kind, ColumnKind::Sequence);
        assert!(!row.columns[0].invisible);
    }

    #[test]
    fn all_edit_keys_leave_edit_mode() {
        assert!(leaves_edit_mode(EditKey::Enter));
        assert!(leaves_edit_mode(EditKey::Tab));
        assert!(leaves_edit_mode(EditKey::ShiftTab));
    }

    #[test]
    fn new_row_context_forces_title() {
        let ctx = Record::from_value(json!({"default_is_title": true}));
        assert!(new_row_is_title(&ctx));
        assert!(!new_row_is_title(&Record::default()));
    }
}
