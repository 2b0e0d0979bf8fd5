//! Directory-backed node container.
//!
//! The container is the storage capability the store is built on: a tree
//! of named nodes rooted at a directory. Every node is a directory holding
//! a `_node.json` record:
//!
//! - groups hold child nodes;
//! - arrays hold one parquet file of one or more equal-length columns;
//! - tables hold a fixed row layout and a list of parquet segments
//!   (see [`table`]).
//!
//! Attributes are an opaque JSON payload per node; the layers above decide
//! their shape and serialize them as a unit.

pub mod atom;
pub mod condition;
pub mod error;
pub mod filters;
pub mod path;
pub mod record;
pub mod stats;
pub mod table;

mod fs;
mod segment;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt};

pub use atom::{Atom, ColumnType};
pub use condition::{CmpOp, Condition, Literal};
pub use error::{ContainerError, ContainerResult};
pub use filters::Filters;
pub use path::NodePath;
pub use record::{ArrayManifest, NodeKind, NodeRecord};
pub use table::{IndexSpec, TableField, TableNode};

use crate::config::OpenMode;
use error::{
    ArrowSnafu, EmptyArraySnafu, MissingContainerSnafu, NodeExistsSnafu, NodeNotFoundSnafu,
    NotAContainerSnafu, RaggedArraySnafu, ReadOnlySnafu,
};
use filters::writer_properties;

const ARRAY_FILE: &str = "_data.parquet";

/// An open container rooted at a directory.
#[derive(Debug, Clone)]
pub struct Container {
    root: PathBuf,
    writable: bool,
    filters: Option<Filters>,
}

impl Container {
    /// Open (or create) the container at `root` according to `mode`.
    ///
    /// `w` replaces an existing container; it refuses to clear a non-empty
    /// directory that is not a container.
    pub fn open(root: impl Into<PathBuf>, mode: OpenMode, filters: Option<Filters>) -> ContainerResult<Self> {
        let root = root.into();
        let display = root.display().to_string();
        let exists = NodeRecord::load(&root)?.is_some();

        match mode {
            OpenMode::Read | OpenMode::ReadWrite => {
                if !exists {
                    return MissingContainerSnafu { path: display }.fail();
                }
            }
            OpenMode::Append => {
                if !exists {
                    if !fs::is_empty_dir(&root)? {
                        return NotAContainerSnafu { path: display }.fail();
                    }
                    fs::create_dir_all(&root)?;
                    NodeRecord::group().store(&root)?;
                }
            }
            OpenMode::Write => {
                if exists {
                    fs::remove_dir_all(&root)?;
                } else if !fs::is_empty_dir(&root)? {
                    return NotAContainerSnafu { path: display }.fail();
                }
                fs::create_dir_all(&root)?;
                NodeRecord::group().store(&root)?;
            }
        }

        Ok(Self {
            root,
            writable: mode.is_writable(),
            filters,
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True unless opened read-only.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Container-wide compression filters.
    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    fn ensure_writable(&self) -> ContainerResult<()> {
        if !self.writable {
            return ReadOnlySnafu {
                path: self.root.display().to_string(),
            }
            .fail();
        }
        Ok(())
    }

    fn dir(&self, path: &NodePath) -> PathBuf {
        path.to_fs(&self.root)
    }

    fn record(&self, path: &NodePath) -> ContainerResult<NodeRecord> {
        NodeRecord::load(&self.dir(path))?.context(NodeNotFoundSnafu {
            path: path.to_string(),
        })
    }

    /// Kind of the node at `path`, or `None` when nothing is there.
    pub fn node_kind(&self, path: &NodePath) -> ContainerResult<Option<NodeKind>> {
        Ok(NodeRecord::load(&self.dir(path))?.map(|r| r.kind))
    }

    /// Ensure a group exists at `path`, creating missing ancestors.
    pub fn create_group(&self, path: &NodePath) -> ContainerResult<()> {
        self.ensure_writable()?;
        let mut current = NodePath::root();
        for seg in path.segments() {
            current = current.join(seg)?;
            match NodeRecord::load(&self.dir(&current))? {
                Some(record) => record.expect_kind(&current.to_string(), NodeKind::Group)?,
                None => {
                    let dir = self.dir(&current);
                    fs::create_dir_all(&dir)?;
                    NodeRecord::group().store(&dir)?;
                }
            }
        }
        Ok(())
    }

    fn prepare_leaf(&self, path: &NodePath) -> ContainerResult<PathBuf> {
        self.ensure_writable()?;
        if self.node_kind(path)?.is_some() {
            return NodeExistsSnafu {
                path: path.to_string(),
            }
            .fail();
        }
        if let Some(parent) = path.parent() {
            self.create_group(&parent)?;
        }
        let dir = self.dir(path);
        // A stale directory without a record is leftover from an interrupted write.
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove the node at `path` and everything beneath it.
    pub fn remove_node(&self, path: &NodePath) -> ContainerResult<()> {
        self.ensure_writable()?;
        if path.is_root() {
            for (name, _) in self.children(path)? {
                self.remove_node(&path.join(&name)?)?;
            }
            return Ok(());
        }
        if self.node_kind(path)?.is_none() {
            return NodeNotFoundSnafu {
                path: path.to_string(),
            }
            .fail();
        }
        fs::remove_dir_all(&self.dir(path))
    }

    /// Direct children of a group with their kinds, sorted by name.
    pub fn children(&self, path: &NodePath) -> ContainerResult<Vec<(String, NodeKind)>> {
        let record = self.record(path)?;
        record.expect_kind(&path.to_string(), NodeKind::Group)?;
        let dir = self.dir(path);
        let mut out = Vec::new();
        for name in fs::child_dirs(&dir)? {
            if name.starts_with('_') {
                continue;
            }
            if let Some(child) = NodeRecord::load(&dir.join(&name))? {
                out.push((name, child.kind));
            }
        }
        Ok(out)
    }

    /// Decode the attributes of the node at `path`.
    pub fn attrs<T: DeserializeOwned>(&self, path: &NodePath) -> ContainerResult<Option<T>> {
        self.record(path)?.decode_attrs(&path.to_string())
    }

    /// Replace the attributes of the node at `path`.
    pub fn set_attrs<T: Serialize>(&self, path: &NodePath, attrs: &T) -> ContainerResult<()> {
        self.ensure_writable()?;
        let mut record = self.record(path)?;
        record.encode_attrs(&path.to_string(), attrs)?;
        record.store(&self.dir(path))
    }

    /// Create an array node from equal-length, non-empty columns.
    pub fn create_array<T: Serialize>(
        &self,
        path: &NodePath,
        columns: &[ArrayRef],
        attrs: &T,
        filters: Option<&Filters>,
    ) -> ContainerResult<()> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if rows == 0 {
            return EmptyArraySnafu {
                path: path.to_string(),
            }
            .fail();
        }
        if columns.iter().any(|c| c.len() != rows) {
            return RaggedArraySnafu {
                path: path.to_string(),
            }
            .fail();
        }
        let dir = self.prepare_leaf(path)?;

        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .enumerate()
                .map(|(i, c)| Field::new(format!("c{i}"), c.data_type().clone(), true))
                .collect::<Vec<_>>(),
        ));
        let batch = RecordBatch::try_new(schema, columns.to_vec()).context(ArrowSnafu)?;
        let props = writer_properties(filters.or(self.filters.as_ref()))?;
        segment::write_batch(&dir.join(ARRAY_FILE), &batch, props)?;

        let mut record = NodeRecord::group();
        record.kind = NodeKind::Array;
        record.array = Some(ArrayManifest {
            rows: rows as u64,
            columns: columns.len(),
        });
        record.encode_attrs(&path.to_string(), attrs)?;
        record.store(&dir)
    }

    /// Read every column of an array node.
    pub fn read_array(&self, path: &NodePath) -> ContainerResult<Vec<ArrayRef>> {
        let record = self.record(path)?;
        record.expect_kind(&path.to_string(), NodeKind::Array)?;
        let batch = segment::read_batch(&self.dir(path).join(ARRAY_FILE), None, None)?;
        Ok(batch.columns().to_vec())
    }

    /// Create an empty table node with the given row layout.
    pub fn create_table(
        &self,
        path: &NodePath,
        fields: Vec<TableField>,
        expectedrows: u64,
        filters: Option<Filters>,
    ) -> ContainerResult<TableNode> {
        let dir = self.prepare_leaf(path)?;
        TableNode::create(dir, path.clone(), fields, expectedrows, filters.or(self.filters))
    }

    /// Open the table node at `path`.
    pub fn open_table(&self, path: &NodePath) -> ContainerResult<TableNode> {
        let record = self.record(path)?;
        TableNode::open(self.dir(path), path.clone(), record, self.writable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexKind;
    use arrow::array::{AsArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Int64Type;
    use serde::Deserialize;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        label: String,
    }

    fn open(tmp: &TempDir) -> ContainerResult<Container> {
        Container::open(tmp.path().join("store"), OpenMode::Append, None)
    }

    fn int_table(c: &Container, path: &NodePath) -> ContainerResult<TableNode> {
        c.create_table(
            path,
            vec![
                TableField::new("index", ColumnType::scalar(Atom::Int64)),
                TableField::new("v", ColumnType::scalar(Atom::Float64)),
            ],
            10_000,
            None,
        )
    }

    fn append_range(t: &mut TableNode, range: std::ops::Range<i64>) -> TestResult {
        let idx: Vec<i64> = range.clone().collect();
        let vals: Vec<f64> = range.map(|v| v as f64 * 0.5).collect();
        let batch = RecordBatch::try_new(
            t.schema().clone(),
            vec![
                Arc::new(Int64Array::from(idx)),
                Arc::new(Float64Array::from(vals)),
            ],
        )?;
        t.append(&batch)?;
        t.flush()?;
        Ok(())
    }

    fn index_values(batch: &RecordBatch) -> Vec<i64> {
        batch.column(0).as_primitive::<Int64Type>().values().to_vec()
    }

    #[test]
    fn groups_arrays_and_attrs() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let path = NodePath::parse("/a/b/arr")?;
        let col: ArrayRef = Arc::new(StringArray::from(vec!["x", "y"]));
        c.create_array(&path, &[col.clone()], &Note { label: "hi".into() }, None)?;

        assert_eq!(c.node_kind(&NodePath::parse("/a")?)?, Some(NodeKind::Group));
        assert_eq!(c.read_array(&path)?, vec![col]);
        assert_eq!(c.attrs::<Note>(&path)?, Some(Note { label: "hi".into() }));
        assert_eq!(
            c.children(&NodePath::parse("/a/b")?)?,
            vec![("arr".to_string(), NodeKind::Array)]
        );

        c.remove_node(&NodePath::parse("/a")?)?;
        assert_eq!(c.node_kind(&path)?, None);
        Ok(())
    }

    #[test]
    fn empty_arrays_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let col: ArrayRef = Arc::new(Int64Array::from(Vec::<i64>::new()));
        let err = c
            .create_array(&NodePath::parse("/e")?, &[col], &Note { label: String::new() }, None)
            .err();
        assert!(matches!(err, Some(ContainerError::EmptyArray { .. })));
        Ok(())
    }

    #[test]
    fn read_only_container_refuses_writes() -> TestResult {
        let tmp = TempDir::new()?;
        open(&tmp)?;
        let ro = Container::open(tmp.path().join("store"), OpenMode::Read, None)?;
        let err = ro.create_group(&NodePath::parse("/g")?).err();
        assert!(matches!(err, Some(ContainerError::ReadOnly { .. })));
        Ok(())
    }

    #[test]
    fn write_mode_refuses_foreign_directories() -> TestResult {
        let tmp = TempDir::new()?;
        std::fs::write(tmp.path().join("precious.txt"), b"keep")?;
        let err = Container::open(tmp.path(), OpenMode::Write, None).err();
        assert!(matches!(err, Some(ContainerError::NotAContainer { .. })));
        assert!(tmp.path().join("precious.txt").exists());
        Ok(())
    }

    #[test]
    fn table_append_read_and_coordinates() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let path = NodePath::parse("/t/table")?;
        let mut t = int_table(&c, &path)?;
        append_range(&mut t, 0..40)?;
        append_range(&mut t, 40..100)?;

        let t = c.open_table(&path)?;
        assert_eq!(t.nrows(), 100);
        assert_eq!(t.segment_count(), 2);
        assert_eq!(index_values(&t.read(38, 42)?), vec![38, 39, 40, 41]);
        assert_eq!(index_values(&t.read_coordinates(&[99, 0, 41])?), vec![99, 0, 41]);
        assert!(t.read_coordinates(&[100]).is_err());
        Ok(())
    }

    #[test]
    fn filtered_reads_use_index_statistics() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let path = NodePath::parse("/t/table")?;
        let mut t = int_table(&c, &path)?;
        append_range(&mut t, 0..50)?;
        append_range(&mut t, 50..100)?;
        t.create_index(
            "index",
            IndexSpec {
                kind: IndexKind::Medium,
                optlevel: 6,
            },
        )?;

        let cond = Condition::compare("index", CmpOp::Ge, Literal::Int(50));
        let got = t.read_where(&cond, 0, 100)?;
        assert_eq!(index_values(&got), (50..100).collect::<Vec<_>>());
        assert_eq!(t.get_where_list(&cond, 0, 60)?, (50..60).collect::<Vec<u64>>());
        Ok(())
    }

    #[test]
    fn remove_rows_rewrites_only_touched_segments() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let path = NodePath::parse("/t/table")?;
        let mut t = int_table(&c, &path)?;
        append_range(&mut t, 0..10)?;
        append_range(&mut t, 10..20)?;
        append_range(&mut t, 20..30)?;

        assert_eq!(t.remove_rows(8, 22)?, 14);
        t.flush()?;

        let t = c.open_table(&path)?;
        assert_eq!(t.nrows(), 16);
        let expected: Vec<i64> = (0..8).chain(22..30).collect();
        assert_eq!(index_values(&t.read(0, 16)?), expected);
        assert_eq!(t.segment_count(), 2);
        Ok(())
    }

    #[test]
    fn append_checks_layout() -> TestResult {
        let tmp = TempDir::new()?;
        let c = open(&tmp)?;
        let mut t = int_table(&c, &NodePath::parse("/t/table")?)?;
        let schema = Arc::new(Schema::new(vec![Field::new("index", arrow::datatypes::DataType::Int64, true)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))])?;
        assert!(matches!(t.append(&batch), Err(ContainerError::LayoutMismatch { .. })));
        Ok(())
    }
}
