//! Schema record persisted on a table object's group.

use serde::{Deserialize, Serialize};

use crate::columns::{DataCol, InfoMap};
use crate::config::{DEFAULT_ERRORS, DEFAULT_NAN_REP};
use crate::frame::Label;
use crate::storer::ObjectType;

use super::TableType;

fn default_nan_rep() -> String {
    DEFAULT_NAN_REP.to_string()
}

fn default_errors() -> String {
    DEFAULT_ERRORS.to_string()
}

/// Group attributes of a table object.
///
/// Fields added after the first format version default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAttrs {
    /// Object type tag (`series_table` or `frame_table`).
    pub object_type: ObjectType,
    /// Format version that created the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    /// Table variant.
    pub table_type: TableType,
    /// `(axis, name)` of each index column.
    pub index_cols: Vec<(usize, String)>,
    /// Names of the value columns in field order.
    pub values_cols: Vec<String>,
    /// `(axis, labels)` of each non-index axis.
    pub non_index_axes: Vec<(usize, Vec<Label>)>,
    /// Promoted data columns.
    #[serde(default)]
    pub data_columns: Vec<String>,
    /// Missing string sentinel.
    #[serde(default = "default_nan_rep")]
    pub nan_rep: String,
    /// String encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Encoding error policy.
    #[serde(default = "default_errors")]
    pub errors: String,
    /// Names of the row index levels moved into data columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
    /// Value columns with a category side-table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,
    /// Per-column and per-axis annotations.
    #[serde(default)]
    pub info: InfoMap,
}

impl TableAttrs {
    /// Synthetic record of a table node written without object metadata.
    pub(crate) fn generic(values: &[DataCol]) -> Self {
        Self {
            object_type: ObjectType::FrameTable,
            format_version: None,
            table_type: TableType::GenericTable,
            index_cols: Vec::new(),
            values_cols: values.iter().map(|c| c.cname.clone()).collect(),
            non_index_axes: vec![(1, values.iter().flat_map(|c| c.items.iter().cloned()).collect())],
            data_columns: values
                .iter()
                .filter(|c| c.data_indexable)
                .map(|c| c.cname.clone())
                .collect(),
            nan_rep: default_nan_rep(),
            encoding: None,
            errors: default_errors(),
            levels: None,
            metadata: Vec::new(),
            info: InfoMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_records_default_missing_fields() -> Result<(), serde_json::Error> {
        let raw = r#"{
            "object_type": "frame_table",
            "table_type": "appendable_frame",
            "index_cols": [[0, "index"]],
            "values_cols": ["values_block_0"],
            "non_index_axes": [[1, ["a", "b"]]]
        }"#;
        let attrs: TableAttrs = serde_json::from_str(raw)?;
        assert_eq!(attrs.format_version, None);
        assert_eq!(attrs.nan_rep, "nan");
        assert_eq!(attrs.errors, "strict");
        assert!(attrs.data_columns.is_empty());
        assert_eq!(attrs.non_index_axes[0].1, vec![Label::from("a"), Label::from("b")]);
        Ok(())
    }
}
