//! Per-node records persisted as `_node.json`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::ResultExt;

use super::error::{ContainerResult, JsonSnafu, NodeKindMismatchSnafu};
use super::fs;
use super::table::TableManifest;

/// Current version of the node record layout.
pub const NODE_RECORD_VERSION: u32 = 1;

pub(crate) const NODE_FILE: &str = "_node.json";

/// Kind of a container node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A group of child nodes.
    Group,
    /// A fixed array of one or more equal-length columns.
    Array,
    /// An appendable table of fixed-layout records.
    Table,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Group => "group",
            NodeKind::Array => "array",
            NodeKind::Table => "table",
        })
    }
}

/// Layout details of an array node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayManifest {
    /// Rows per column.
    pub rows: u64,
    /// Number of columns.
    pub columns: usize,
}

/// Everything the container records about one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Record layout version.
    pub version: u32,
    /// Node kind.
    pub kind: NodeKind,
    /// Opaque attribute payload owned by the layer above.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attrs: serde_json::Value,
    /// Array layout, for array nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayManifest>,
    /// Table layout and segments, for table nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableManifest>,
}

impl NodeRecord {
    pub(crate) fn group() -> Self {
        Self {
            version: NODE_RECORD_VERSION,
            kind: NodeKind::Group,
            attrs: serde_json::Value::Null,
            array: None,
            table: None,
        }
    }

    pub(crate) fn file(dir: &Path) -> PathBuf {
        dir.join(NODE_FILE)
    }

    /// Load the record of the node stored in `dir`, if there is one.
    pub(crate) fn load(dir: &Path) -> ContainerResult<Option<Self>> {
        let file = Self::file(dir);
        if !file.is_file() {
            return Ok(None);
        }
        let bytes = fs::read_bytes(&file)?;
        let record = serde_json::from_slice(&bytes).context(JsonSnafu {
            path: file.display().to_string(),
        })?;
        Ok(Some(record))
    }

    pub(crate) fn store(&self, dir: &Path) -> ContainerResult<()> {
        let file = Self::file(dir);
        let bytes = serde_json::to_vec_pretty(self).context(JsonSnafu {
            path: file.display().to_string(),
        })?;
        fs::write_atomic(&file, &bytes)
    }

    pub(crate) fn expect_kind(&self, path: &str, expected: NodeKind) -> ContainerResult<()> {
        if self.kind != expected {
            return NodeKindMismatchSnafu {
                path,
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            }
            .fail();
        }
        Ok(())
    }

    /// Decode the attribute payload; `None` when no attributes were set.
    pub(crate) fn decode_attrs<T: DeserializeOwned>(&self, path: &str) -> ContainerResult<Option<T>> {
        if self.attrs.is_null() {
            return Ok(None);
        }
        let attrs = serde_json::from_value(self.attrs.clone()).context(JsonSnafu { path })?;
        Ok(Some(attrs))
    }

    pub(crate) fn encode_attrs<T: Serialize>(&mut self, path: &str, attrs: &T) -> ContainerResult<()> {
        self.attrs = serde_json::to_value(attrs).context(JsonSnafu { path })?;
        Ok(())
    }
}
