//! Per-column attributes persisted on a table node.
//!
//! Each column contributes `<cname>_kind`; value columns add
//! `<cname>_dtype` and `<cname>_meta`. For value columns `_kind` holds the
//! column labels of the block, for index columns the kind name.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use snafu::prelude::*;

use super::descriptor::{DataCol, IndexCol};
use super::kind::Kind;
use crate::container::NodePath;
use crate::error::{CorruptSnafu, StoreResult};
use crate::frame::Label;

/// Column attributes of one table node, keyed `<cname>_<attr>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnAttrs(BTreeMap<String, Json>);

fn label_json(label: &Label) -> Json {
    match label {
        Label::Int(v) => Json::from(*v),
        Label::Str(s) => Json::from(s.as_str()),
        Label::Tuple(parts) => Json::Array(parts.iter().map(label_json).collect()),
    }
}

impl ColumnAttrs {
    /// Record the attributes of an index column.
    pub(crate) fn record_index(&mut self, col: &IndexCol) {
        self.0.insert(format!("{}_kind", col.cname), Json::from(col.kind.as_str()));
    }

    /// Record the attributes of a value column.
    pub(crate) fn record_data(&mut self, col: &DataCol) {
        self.0.insert(
            format!("{}_kind", col.cname),
            Json::Array(col.items.iter().map(label_json).collect()),
        );
        self.0.insert(format!("{}_dtype", col.cname), Json::from(col.dtype.as_str()));
        self.0.insert(
            format!("{}_meta", col.cname),
            col.meta.as_deref().map_or(Json::Null, Json::from),
        );
    }

    fn get<T: DeserializeOwned>(&self, table: &NodePath, cname: &str, attr: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.0.get(&format!("{cname}_{attr}")) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone()).map_err(|e| {
            CorruptSnafu {
                key: table.to_string(),
                reason: format!("attribute {cname}_{attr}: {e}"),
            }
            .build()
        })
    }

    fn require<T: DeserializeOwned>(&self, table: &NodePath, cname: &str, attr: &str) -> StoreResult<T> {
        self.get(table, cname, attr)?.context(CorruptSnafu {
            key: table.to_string(),
            reason: format!("attribute {cname}_{attr} is missing"),
        })
    }

    /// Kind of an index column.
    pub(crate) fn kind(&self, table: &NodePath, cname: &str) -> StoreResult<Kind> {
        self.require(table, cname, "kind")
    }

    /// Column labels held by a value column.
    pub(crate) fn items(&self, table: &NodePath, cname: &str) -> StoreResult<Vec<Label>> {
        self.require(table, cname, "kind")
    }

    /// Dtype name of a value column.
    pub(crate) fn dtype(&self, table: &NodePath, cname: &str) -> StoreResult<String> {
        self.require(table, cname, "dtype")
    }

    /// Meta tag of a value column.
    pub(crate) fn meta(&self, table: &NodePath, cname: &str) -> StoreResult<Option<String>> {
        Ok(self.get::<Option<String>>(table, cname, "meta")?.flatten())
    }
}
