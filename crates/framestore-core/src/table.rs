//! Table layout: append-capable, predicate-queryable storage.
//!
//! A table object is a group holding one table node (`table`). The node's
//! row layout is derived from the first write: an index column with the
//! row keys, then one field per value block. A value block groups columns
//! of one dtype; promoted data columns get a field of their own and can be
//! queried and indexed independently.
//!
//! The group carries the schema record ([`TableAttrs`]); the node carries
//! per-column attributes ([`ColumnAttrs`]); categorical columns keep their
//! category list in a fixed series under `meta/<column>/meta`.

mod attrs;
mod axes;
mod read;
mod write;

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use attrs::TableAttrs;

use crate::columns::kind::{bytes_dtype, dtype_name};
use crate::columns::{ColumnAttrs, DataCol, IndexCol, Kind, StringCodec};
use crate::config::{DEFAULT_ENCODING, IndexKind};
use crate::container::{Atom, Container, IndexSpec, NodePath, TableNode};
use crate::error::{
    ColumnNotFoundSnafu, ComplexIndexSnafu, CorruptSnafu, NotExtractableSnafu, StoreResult,
    UnsupportedSnafu,
};
use crate::expr::{Predicate, Queryable, Queryables};
use crate::fixed::read_series_at;
use crate::frame::Label;
use crate::selection::normalize_range;

/// Table variant tag persisted as `table_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Series with a single-level row index.
    AppendableSeries,
    /// Series with a multi-level row index.
    AppendableMultiseries,
    /// Frame with a single-level row index.
    AppendableFrame,
    /// Frame with a multi-level row index.
    AppendableMultiframe,
    /// Table node written without object metadata; read-only.
    GenericTable,
    /// Write-once table; neither readable nor appendable here.
    Worm,
}

impl TableType {
    /// Persisted name.
    pub fn as_str(self) -> &'static str {
        match self {
            TableType::AppendableSeries => "appendable_series",
            TableType::AppendableMultiseries => "appendable_multiseries",
            TableType::AppendableFrame => "appendable_frame",
            TableType::AppendableMultiframe => "appendable_multiframe",
            TableType::GenericTable => "generic_table",
            TableType::Worm => "worm",
        }
    }

    /// Short name used in summaries.
    pub fn short(self) -> &'static str {
        match self {
            TableType::GenericTable => "generic_table",
            TableType::Worm => "worm",
            _ => "appendable",
        }
    }

    /// True for the series variants.
    pub fn is_series(self) -> bool {
        matches!(self, TableType::AppendableSeries | TableType::AppendableMultiseries)
    }

    /// True for variants with a multi-level row index.
    pub fn is_multi(self) -> bool {
        matches!(self, TableType::AppendableMultiseries | TableType::AppendableMultiframe)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the non-index axis in predicates.
pub(crate) const COLUMNS_AXIS: &str = "columns";

/// A queryable on-disk field of a table.
#[derive(Debug, Clone, Copy)]
enum FieldRef<'a> {
    Index(&'a IndexCol),
    Data(&'a DataCol),
}

impl FieldRef<'_> {
    fn cname(&self) -> &str {
        match self {
            FieldRef::Index(c) => &c.cname,
            FieldRef::Data(c) => &c.cname,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            FieldRef::Index(c) => c.kind,
            FieldRef::Data(c) => c.kind,
        }
    }
}

/// Maximal runs of consecutive values in an ascending, deduplicated list,
/// as `[start, stop)` ranges.
fn runs(coords: &[u64]) -> Vec<(u64, u64)> {
    let mut out: Vec<(u64, u64)> = Vec::new();
    for &c in coords {
        match out.last_mut() {
            Some((_, stop)) if *stop == c => *stop += 1,
            _ => out.push((c, c + 1)),
        }
    }
    out
}

fn version_tuple(version: &str) -> Vec<u32> {
    version.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}

/// Reader and writer of one table object.
#[derive(Debug)]
pub struct Table {
    group: NodePath,
    attrs: TableAttrs,
    node: TableNode,
    index_axes: Vec<IndexCol>,
    values_axes: Vec<DataCol>,
    codec: StringCodec,
}

impl Table {
    /// Name of the table node inside the object's group.
    pub(crate) const NODE: &'static str = "table";
    const META: &'static str = "meta";

    fn meta_path(group: &NodePath, cname: &str) -> StoreResult<NodePath> {
        Ok(group.join(Self::META)?.join(cname)?.join(Self::META)?)
    }

    fn codec_for(attrs: &TableAttrs) -> StoreResult<StringCodec> {
        StringCodec::new(
            &attrs.nan_rep,
            attrs.encoding.as_deref().unwrap_or(DEFAULT_ENCODING),
            &attrs.errors,
        )
    }

    /// Open the table object stored under `group`.
    pub(crate) fn open(container: &Container, group: &NodePath) -> StoreResult<Self> {
        let attrs: TableAttrs = container.attrs(group)?.context(CorruptSnafu {
            key: group.to_string(),
            reason: "table attributes are missing",
        })?;
        let node = container.open_table(&group.join(Self::NODE)?)?;
        let column_attrs: ColumnAttrs = node.attrs()?.unwrap_or_default();

        let index_axes = attrs
            .index_cols
            .iter()
            .map(|(axis, name)| IndexCol::infer(&node, name, *axis, &column_attrs, &attrs.info))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut values_axes = Vec::with_capacity(attrs.values_cols.len());
        for name in &attrs.values_cols {
            let categories = if attrs.metadata.contains(name) {
                let series = read_series_at(container, &Self::meta_path(group, name)?)?;
                Some(series.values().clone())
            } else {
                None
            };
            values_axes.push(DataCol::infer(
                &node,
                name,
                attrs.data_columns.contains(name),
                &column_attrs,
                &attrs.info,
                categories,
            )?);
        }
        let codec = Self::codec_for(&attrs)?;
        Ok(Self {
            group: group.clone(),
            attrs,
            node,
            index_axes,
            values_axes,
            codec,
        })
    }

    /// Open a table node that carries no object metadata.
    ///
    /// Every scalar field becomes a data column; the row index is the row
    /// position.
    pub(crate) fn generic(container: &Container, group: NodePath, node: NodePath) -> StoreResult<Self> {
        let node = container.open_table(&node)?;
        let mut values_axes = Vec::with_capacity(node.fields().len());
        for (pos, field) in node.fields().iter().enumerate() {
            let dtype = match field.column_type.atom {
                Atom::Bytes(n) => bytes_dtype(n),
                Atom::Complex(8) => "complex64".to_string(),
                Atom::Complex(_) => "complex128".to_string(),
                atom => dtype_name(&atom.arrow_type()),
            };
            let items = match field.column_type.shape {
                None => vec![Label::from(field.name.as_str())],
                Some(n) => (0..n).map(|i| Label::from(format!("{}_{i}", field.name))).collect(),
            };
            values_axes.push(DataCol {
                name: field.name.clone(),
                cname: field.name.clone(),
                pos,
                kind: Kind::from_dtype(&dtype),
                column_type: field.column_type,
                dtype,
                items,
                meta: None,
                tz: None,
                data_indexable: field.column_type.is_scalar(),
                categories: None,
            });
        }
        let attrs = TableAttrs::generic(&values_axes);
        let codec = Self::codec_for(&attrs)?;
        Ok(Self {
            group,
            attrs,
            node,
            index_axes: Vec::new(),
            values_axes,
            codec,
        })
    }

    /// Key of the object.
    pub fn group(&self) -> &NodePath {
        &self.group
    }

    /// Persisted schema record.
    pub fn attrs(&self) -> &TableAttrs {
        &self.attrs
    }

    /// Table variant.
    pub fn table_type(&self) -> TableType {
        self.attrs.table_type
    }

    /// Current row count.
    pub fn nrows(&self) -> u64 {
        self.node.nrows()
    }

    /// Index column descriptors.
    pub fn index_axes(&self) -> &[IndexCol] {
        &self.index_axes
    }

    /// Value column descriptors in field order.
    pub fn values_axes(&self) -> &[DataCol] {
        &self.values_axes
    }

    /// Names of the promoted data columns.
    pub fn data_columns(&self) -> &[String] {
        &self.attrs.data_columns
    }

    /// Column labels in stored order.
    pub fn labels(&self) -> Vec<Label> {
        self.attrs
            .non_index_axes
            .iter()
            .flat_map(|(_, labels)| labels.iter().cloned())
            .collect()
    }

    /// True when the table was written by a format version before 0.10.1.
    pub fn is_old_version(&self) -> bool {
        match &self.attrs.format_version {
            None => self.table_type() != TableType::GenericTable,
            Some(v) => version_tuple(v) < vec![0, 10, 1],
        }
    }

    /// Fields a predicate may reference.
    ///
    /// Index columns and data columns push down; the `columns` axis and
    /// the labels of non-promoted columns are applied after reading.
    pub fn queryables(&self) -> Queryables {
        let mut q = Queryables::new();
        if !self.attrs.non_index_axes.is_empty() {
            q.insert(COLUMNS_AXIS.to_string(), Queryable::Axis);
        }
        for label in self.labels() {
            if let Label::Str(s) = label {
                q.insert(s, Queryable::Label);
            }
        }
        for c in &self.index_axes {
            q.insert(
                c.cname.clone(),
                Queryable::Field {
                    kind: c.kind,
                    column_type: c.column_type,
                    tz: c.tz.clone(),
                    categories: None,
                },
            );
        }
        for c in self.values_axes.iter().filter(|c| c.data_indexable) {
            q.insert(
                c.cname.clone(),
                Queryable::Field {
                    kind: c.kind,
                    column_type: c.column_type,
                    tz: c.tz.clone(),
                    categories: c.categories.clone(),
                },
            );
        }
        q
    }

    /// Indexed fields with their index settings.
    pub fn indexed_columns(&self) -> Vec<(String, IndexSpec)> {
        self.fields()
            .filter_map(|f| self.node.index(f.cname()).map(|s| (f.cname().to_string(), *s)))
            .collect()
    }

    fn fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        self.index_axes.iter().map(FieldRef::Index).chain(
            self.values_axes
                .iter()
                .filter(|c| c.data_indexable)
                .map(FieldRef::Data),
        )
    }

    fn field(&self, column: &str) -> StoreResult<FieldRef<'_>> {
        if let Some(f) = self.fields().find(|f| f.cname() == column) {
            return Ok(f);
        }
        if self.labels().iter().any(|l| l.as_str() == Some(column)) {
            return NotExtractableSnafu { column }.fail();
        }
        ColumnNotFoundSnafu {
            key: self.group.to_string(),
            column,
        }
        .fail()
    }

    fn ensure_writable_variant(&self, action: &str) -> StoreResult<()> {
        match self.table_type() {
            TableType::GenericTable | TableType::Worm => UnsupportedSnafu {
                message: format!("cannot {action} a {} table", self.table_type()),
            }
            .fail(),
            _ => Ok(()),
        }
    }

    fn ensure_readable(&self) -> StoreResult<()> {
        ensure!(
            self.table_type() != TableType::Worm,
            UnsupportedSnafu {
                message: "write-once tables cannot be read",
            }
        );
        Ok(())
    }

    /// Remove rows and return how many were removed.
    ///
    /// Without a predicate, rows `[start, stop)` are removed. With one, the
    /// matching coordinates are grouped into runs of consecutive rows and
    /// removed from the last run to the first, so earlier removals never
    /// shift rows still pending. Repeated coordinates are removed once.
    pub(crate) fn delete(
        &mut self,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> StoreResult<u64> {
        self.ensure_writable_variant("delete from")?;
        let Some(predicate) = predicate else {
            let (start, stop) = normalize_range(self.nrows(), start, stop);
            let removed = self.node.remove_rows(start, stop)?;
            self.node.flush()?;
            return Ok(removed);
        };

        let mut coords = self.select_coords(Some(predicate), start, stop)?;
        coords.sort_unstable();
        coords.dedup();
        let runs = runs(&coords);
        let mut removed = 0;
        for (lo, hi) in runs.iter().rev() {
            removed += self.node.remove_rows(*lo, *hi)?;
        }
        self.node.flush()?;
        debug!("removed {removed} rows from {} in {} runs", self.group, runs.len());
        Ok(removed)
    }

    /// Build secondary indexes on `columns`, or on every queryable field.
    ///
    /// An existing index with different settings is dropped and rebuilt.
    pub(crate) fn create_index(
        &mut self,
        columns: Option<&[String]>,
        kind: IndexKind,
        optlevel: u8,
    ) -> StoreResult<()> {
        self.ensure_writable_variant("index")?;
        let targets: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => self.fields().map(|f| f.cname().to_string()).collect(),
        };
        let spec = IndexSpec { kind, optlevel };
        for column in targets {
            let field = self.field(&column)?;
            ensure!(field.kind() != Kind::Complex, ComplexIndexSnafu { column });
            match self.node.index(&column) {
                Some(current) if *current == spec => continue,
                Some(current) => {
                    debug!(
                        "rebuilding index on {column} of {}: {:?} -> {:?}",
                        self.group, current, spec
                    );
                    self.node.remove_index(&column)?;
                }
                None => {}
            }
            self.node.create_index(&column, spec)?;
        }
        Ok(())
    }

    /// One-line summary used by the store's `info`.
    pub(crate) fn describe(&self) -> String {
        let indexers = self
            .index_axes
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut out = format!(
            "{:<12} (typ->{},nrows->{},ncols->{},indexers->[{indexers}]",
            self.attrs.object_type.as_str(),
            self.table_type().short(),
            self.nrows(),
            self.labels().len(),
        );
        if !self.attrs.data_columns.is_empty() {
            out.push_str(&format!(",dc->[{}]", self.attrs.data_columns.join(",")));
        }
        out.push(')');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_split_on_gaps() {
        assert_eq!(runs(&[1, 2, 3, 7, 8, 20]), vec![(1, 4), (7, 9), (20, 21)]);
        assert_eq!(runs(&[]), Vec::<(u64, u64)>::new());
        assert_eq!(runs(&[5]), vec![(5, 6)]);
    }

    #[test]
    fn versions_compare_numerically() {
        assert!(version_tuple("0.9.3") < vec![0, 10, 1]);
        assert!(version_tuple("0.10.1") >= vec![0, 10, 1]);
        assert!(version_tuple("1.0.0") > vec![0, 10, 1]);
    }
}
