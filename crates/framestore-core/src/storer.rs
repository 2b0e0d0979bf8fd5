//! Storer dispatch.
//!
//! Every stored object is read and written by exactly one storer variant,
//! chosen from the type tags persisted on its group:
//!
//! - a group tagged `series` or `frame` is a [`FixedStorer`];
//! - a group tagged `series_table` or `frame_table` is a [`Table`] whose
//!   `table_type` picks the table variant;
//! - a bare table node, or an untagged group holding a `table` node, is a
//!   read-only generic table.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::container::{Container, NodeKind, NodePath};
use crate::error::{CorruptSnafu, StoreResult};
use crate::fixed::{FixedAttrs, FixedStorer};
use crate::table::{Table, TableType};

/// Object type tag persisted on every stored object's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// Fixed-layout series.
    Series,
    /// Fixed-layout frame.
    Frame,
    /// Table-layout series.
    SeriesTable,
    /// Table-layout frame.
    FrameTable,
}

impl ObjectType {
    /// Persisted name.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Series => "series",
            ObjectType::Frame => "frame",
            ObjectType::SeriesTable => "series_table",
            ObjectType::FrameTable => "frame_table",
        }
    }

    /// True for the table layout.
    pub fn is_table(self) -> bool {
        matches!(self, ObjectType::SeriesTable | ObjectType::FrameTable)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TypeTags {
    #[serde(default)]
    object_type: Option<ObjectType>,
    #[serde(default)]
    table_type: Option<TableType>,
}

/// Which storer handles an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorerKind {
    /// Fixed-layout series.
    Series,
    /// Fixed-layout frame.
    Frame,
    /// One of the table variants.
    Table(TableType),
}

impl fmt::Display for StorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorerKind::Series => f.write_str("series"),
            StorerKind::Frame => f.write_str("frame"),
            StorerKind::Table(t) => f.write_str(t.as_str()),
        }
    }
}

/// Reader and writer of one stored object.
#[derive(Debug)]
pub enum Storer {
    /// Whole-object layout.
    Fixed(FixedStorer),
    /// Row-structured, queryable layout.
    Table(Table),
}

impl Storer {
    /// Storer kind of the node at `key`, without opening it.
    ///
    /// `None` when `key` holds nothing, an array, or a plain group.
    pub(crate) fn probe(container: &Container, key: &NodePath) -> StoreResult<Option<StorerKind>> {
        Ok(match container.node_kind(key)? {
            None | Some(NodeKind::Array) => None,
            Some(NodeKind::Table) => Some(StorerKind::Table(TableType::GenericTable)),
            Some(NodeKind::Group) => {
                let tags: TypeTags = container.attrs(key)?.unwrap_or_default();
                match (tags.object_type, tags.table_type) {
                    (Some(ObjectType::Series), _) => Some(StorerKind::Series),
                    (Some(ObjectType::Frame), _) => Some(StorerKind::Frame),
                    (Some(object_type), table_type) => Some(StorerKind::Table(table_type.context(
                        CorruptSnafu {
                            key: key.to_string(),
                            reason: format!("{} without a table_type", object_type.as_str()),
                        },
                    )?)),
                    (None, _) => {
                        let child = key.join(Table::NODE)?;
                        (container.node_kind(&child)? == Some(NodeKind::Table))
                            .then_some(StorerKind::Table(TableType::GenericTable))
                    }
                }
            }
        })
    }

    /// Open the storer of the object at `key`; `None` when there is none.
    pub(crate) fn load(container: &Container, key: &NodePath) -> StoreResult<Option<Storer>> {
        let Some(kind) = Self::probe(container, key)? else {
            return Ok(None);
        };
        Ok(Some(match kind {
            StorerKind::Series | StorerKind::Frame => {
                let attrs: FixedAttrs = container.attrs(key)?.context(CorruptSnafu {
                    key: key.to_string(),
                    reason: "fixed attributes are missing",
                })?;
                Storer::Fixed(FixedStorer::open(key.clone(), attrs))
            }
            StorerKind::Table(TableType::GenericTable) => {
                let node = match container.node_kind(key)? {
                    Some(NodeKind::Table) => key.clone(),
                    _ => key.join(Table::NODE)?,
                };
                Storer::Table(Table::generic(container, key.clone(), node)?)
            }
            StorerKind::Table(_) => Storer::Table(Table::open(container, key)?),
        }))
    }

    /// Kind of this storer.
    pub fn kind(&self) -> StorerKind {
        match self {
            Storer::Fixed(f) => match f.object_type() {
                ObjectType::Series | ObjectType::SeriesTable => StorerKind::Series,
                ObjectType::Frame | ObjectType::FrameTable => StorerKind::Frame,
            },
            Storer::Table(t) => StorerKind::Table(t.table_type()),
        }
    }

    /// True for the table layout.
    pub fn is_table(&self) -> bool {
        matches!(self, Storer::Table(_))
    }

    /// One-line summary used by the store's `info`.
    pub(crate) fn describe(&self, container: &Container) -> StoreResult<String> {
        Ok(match self {
            Storer::Fixed(f) => {
                let shape = f
                    .shape(container)?
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{:<12} (shape->[{shape}])", f.object_type().as_str())
            }
            Storer::Table(t) => t.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenMode;
    use crate::container::{Atom, ColumnType, TableField};
    use crate::frame::{Dataset, Series};
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn object_type_tags_are_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&ObjectType::FrameTable)?, r#""frame_table""#);
        assert_eq!(serde_json::to_string(&TableType::AppendableMultiframe)?, r#""appendable_multiframe""#);
        Ok(())
    }

    #[test]
    fn probe_distinguishes_objects_from_plain_groups() -> TestResult {
        let tmp = TempDir::new()?;
        let c = Container::open(tmp.path().join("s"), OpenMode::Append, None)?;

        let values: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
        let series: Dataset = Series::from_array(values).into();
        FixedStorer::write(&c, &NodePath::parse("/a/s")?, &series, None)?;
        c.create_table(
            &NodePath::parse("/raw")?,
            vec![TableField::new("x", ColumnType::scalar(Atom::Int64))],
            10_000,
            None,
        )?;

        assert_eq!(Storer::probe(&c, &NodePath::parse("/a")?)?, None);
        assert_eq!(Storer::probe(&c, &NodePath::parse("/a/s")?)?, Some(StorerKind::Series));
        assert_eq!(
            Storer::probe(&c, &NodePath::parse("/raw")?)?,
            Some(StorerKind::Table(TableType::GenericTable))
        );
        assert_eq!(Storer::probe(&c, &NodePath::parse("/missing")?)?, None);

        let storer = Storer::load(&c, &NodePath::parse("/raw")?)?.ok_or("no storer")?;
        assert!(storer.is_table());
        Ok(())
    }
}
