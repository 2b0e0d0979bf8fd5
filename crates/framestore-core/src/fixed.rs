//! Fixed layout: whole-object storage for series and frames.
//!
//! A fixed object is a group of array nodes. A series stores its index
//! (`index`) and its values (`values`). A frame stores its column labels
//! (`axis0`), its row labels (`axis1`) and one `block{i}_values` node per
//! run of same-typed columns, with `block{i}_items` holding the column
//! positions of that block. Fixed objects are read whole: column subsets
//! and predicates are rejected.

mod array;

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, Int64Array, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Int64Type};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use array::{ArrayAttrs, IndexLayout};
pub(crate) use array::{read_array, write_array};

use crate::config::{FORMAT_VERSION, SelectOptions};
use crate::container::{Container, Filters, NodePath};
use crate::error::{
    ArrowSnafu, CategoricalFixedSnafu, CorruptSnafu, FixedSelectionSnafu, NonUniqueColumnsSnafu, StoreResult,
};
use crate::frame::{Dataset, Frame, Series, is_categorical};
use crate::selection::normalize_range;
use crate::storer::ObjectType;
use array::{index_len, read_index, write_index};

/// Group attributes of a fixed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedAttrs {
    /// Object type tag (`series` or `frame`).
    pub object_type: ObjectType,
    /// Format version that wrote the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    /// Number of axes.
    pub ndim: usize,
    /// Number of value blocks of a frame.
    #[serde(default)]
    pub nblocks: usize,
    /// Series name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Layout of each stored axis.
    #[serde(default)]
    pub axes: BTreeMap<String, IndexLayout>,
}

/// Reader and writer of one fixed object.
#[derive(Debug, Clone)]
pub struct FixedStorer {
    group: NodePath,
    attrs: FixedAttrs,
}

fn reject_categoricals(label: impl Fn() -> String, arrays: &[ArrayRef]) -> StoreResult<()> {
    if arrays.iter().any(|a| is_categorical(a.data_type())) {
        return CategoricalFixedSnafu { column: label() }.fail();
    }
    Ok(())
}

/// Column positions grouped by dtype, in order of first appearance.
fn blocks_by_type(data: &[ArrayRef]) -> Vec<Vec<usize>> {
    let mut types: Vec<&DataType> = Vec::new();
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    for (pos, column) in data.iter().enumerate() {
        match types.iter().position(|t| *t == column.data_type()) {
            Some(b) => blocks[b].push(pos),
            None => {
                types.push(column.data_type());
                blocks.push(vec![pos]);
            }
        }
    }
    blocks
}

impl FixedStorer {
    pub(crate) fn open(group: NodePath, attrs: FixedAttrs) -> Self {
        Self { group, attrs }
    }

    /// Persisted group attributes.
    pub fn attrs(&self) -> &FixedAttrs {
        &self.attrs
    }

    /// Object type tag.
    pub fn object_type(&self) -> ObjectType {
        self.attrs.object_type
    }

    fn layout(&self, axis: &str) -> StoreResult<IndexLayout> {
        self.attrs.axes.get(axis).copied().context(CorruptSnafu {
            key: self.group.to_string(),
            reason: format!("no layout recorded for axis {axis}"),
        })
    }

    /// Write `obj` as a new fixed object under `group`.
    pub(crate) fn write(
        container: &Container,
        group: &NodePath,
        obj: &Dataset,
        filters: Option<&Filters>,
    ) -> StoreResult<Self> {
        match obj {
            Dataset::Series(s) => {
                reject_categoricals(|| s.name().unwrap_or("values").to_string(), &[s.values().clone()])?;
                reject_categoricals(|| "index".to_string(), s.index().levels())?;
            }
            Dataset::Frame(f) => {
                ensure!(f.columns().is_unique()?, NonUniqueColumnsSnafu);
                for (i, column) in f.data().iter().enumerate() {
                    reject_categoricals(
                        || f.columns().labels().ok().and_then(|l| l.get(i).map(ToString::to_string)).unwrap_or_default(),
                        std::slice::from_ref(column),
                    )?;
                }
                reject_categoricals(|| "index".to_string(), f.index().levels())?;
            }
        }

        container.create_group(group)?;
        let mut axes = BTreeMap::new();
        let attrs = match obj {
            Dataset::Series(s) => {
                axes.insert("index".to_string(), write_index(container, group, "index", s.index(), filters)?);
                write_array(
                    container,
                    &group.join("values")?,
                    std::slice::from_ref(s.values()),
                    ArrayAttrs::default(),
                    filters,
                )?;
                FixedAttrs {
                    object_type: ObjectType::Series,
                    format_version: Some(FORMAT_VERSION.to_string()),
                    ndim: 1,
                    nblocks: 0,
                    name: s.name().map(Into::into),
                    axes,
                }
            }
            Dataset::Frame(f) => {
                axes.insert("axis0".to_string(), write_index(container, group, "axis0", f.columns(), filters)?);
                axes.insert("axis1".to_string(), write_index(container, group, "axis1", f.index(), filters)?);
                let blocks = blocks_by_type(f.data());
                for (i, positions) in blocks.iter().enumerate() {
                    let columns: Vec<ArrayRef> = positions.iter().map(|p| f.column(*p).clone()).collect();
                    let values = ArrayAttrs {
                        transposed: true,
                        ..ArrayAttrs::default()
                    };
                    write_array(container, &group.join(&format!("block{i}_values"))?, &columns, values, filters)?;
                    let items: ArrayRef = Arc::new(Int64Array::from_iter_values(positions.iter().map(|p| *p as i64)));
                    write_array(
                        container,
                        &group.join(&format!("block{i}_items"))?,
                        &[items],
                        ArrayAttrs::default(),
                        filters,
                    )?;
                }
                FixedAttrs {
                    object_type: ObjectType::Frame,
                    format_version: Some(FORMAT_VERSION.to_string()),
                    ndim: 2,
                    nblocks: blocks.len(),
                    name: None,
                    axes,
                }
            }
        };
        container.set_attrs(group, &attrs)?;
        Ok(Self::open(group.clone(), attrs))
    }

    fn read_series(&self, container: &Container) -> StoreResult<Series> {
        let index = read_index(container, &self.group, "index", self.layout("index")?)?;
        let (values, _) = read_array(container, &self.group.join("values")?)?;
        let values = values.into_iter().next().context(CorruptSnafu {
            key: self.group.to_string(),
            reason: "series values are missing",
        })?;
        Ok(Series::new(index, values)?.with_name(self.attrs.name.clone()))
    }

    fn read_frame(&self, container: &Container) -> StoreResult<Frame> {
        let columns = read_index(container, &self.group, "axis0", self.layout("axis0")?)?;
        let index = read_index(container, &self.group, "axis1", self.layout("axis1")?)?;
        let mut data: Vec<Option<ArrayRef>> = vec![None; columns.len()];
        for i in 0..self.attrs.nblocks {
            let (values, _) = read_array(container, &self.group.join(&format!("block{i}_values"))?)?;
            let (items, _) = read_array(container, &self.group.join(&format!("block{i}_items"))?)?;
            let Some(items) = items.first() else {
                return CorruptSnafu {
                    key: self.group.to_string(),
                    reason: format!("block {i} has no items"),
                }
                .fail();
            };
            for (pos, column) in items.as_primitive::<Int64Type>().values().iter().zip(values) {
                if let Some(slot) = data.get_mut(*pos as usize) {
                    *slot = Some(column);
                }
            }
        }
        let data = data.into_iter().collect::<Option<Vec<_>>>().context(CorruptSnafu {
            key: self.group.to_string(),
            reason: "a column is missing from every block",
        })?;
        Ok(Frame::new(index, columns, data)?)
    }

    /// Read the whole object, optionally restricted to rows `[start, stop)`.
    pub(crate) fn read(&self, container: &Container, opts: &SelectOptions) -> StoreResult<Dataset> {
        ensure!(opts.columns.is_none() && opts.predicate.is_none(), FixedSelectionSnafu);
        let obj: Dataset = match self.attrs.object_type {
            ObjectType::Series => self.read_series(container)?.into(),
            ObjectType::Frame => self.read_frame(container)?.into(),
            other => {
                return CorruptSnafu {
                    key: self.group.to_string(),
                    reason: format!("{} is not a fixed object type", other.as_str()),
                }
                .fail();
            }
        };

        let nrows = obj.nrows() as u64;
        let (start, stop) = normalize_range(nrows, opts.start, opts.stop);
        if start == 0 && stop == nrows {
            return Ok(obj);
        }
        let rows = UInt64Array::from_iter_values(start..stop);
        Ok(match obj {
            Dataset::Series(s) => {
                let values = take(s.values().as_ref(), &rows, None).context(ArrowSnafu)?;
                Series::new(s.index().take(&rows)?, values)?
                    .with_name(s.name().map(Into::into))
                    .into()
            }
            Dataset::Frame(f) => f.take(&rows)?.into(),
        })
    }

    /// Row count, then column count for frames.
    pub(crate) fn shape(&self, container: &Container) -> StoreResult<Vec<usize>> {
        Ok(match self.attrs.object_type {
            ObjectType::Frame => vec![
                index_len(container, &self.group, "axis1", self.layout("axis1")?)?,
                index_len(container, &self.group, "axis0", self.layout("axis0")?)?,
            ],
            _ => vec![index_len(container, &self.group, "index", self.layout("index")?)?],
        })
    }
}

/// Read a fixed series stored at `group`.
pub(crate) fn read_series_at(container: &Container, group: &NodePath) -> StoreResult<Series> {
    let attrs: FixedAttrs = container.attrs(group)?.context(CorruptSnafu {
        key: group.to_string(),
        reason: "fixed attributes are missing",
    })?;
    FixedStorer::open(group.clone(), attrs).read_series(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenMode;
    use crate::error::{ErrorKind, StoreError};
    use crate::expr::Expr;
    use crate::frame::{Index, Label};
    use arrow::array::{
        DurationNanosecondArray, FixedSizeListArray, Float64Array, StringArray,
        TimestampNanosecondArray,
    };
    use arrow::datatypes::Field;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn container(tmp: &TempDir) -> Result<Container, Box<dyn std::error::Error>> {
        Ok(Container::open(tmp.path().join("s"), OpenMode::Append, None)?)
    }

    fn mixed_frame(n: usize) -> Result<Frame, Box<dyn std::error::Error>> {
        let ints: ArrayRef = Arc::new(Int64Array::from_iter_values(0..n as i64));
        let floats: ArrayRef = Arc::new(Float64Array::from_iter_values((0..n).map(|v| v as f64 / 2.0)));
        let strings: ArrayRef = Arc::new(StringArray::from_iter((0..n).map(|v| (v % 2 == 0).then(|| format!("s{v}")))));
        let stamps: ArrayRef = Arc::new(
            TimestampNanosecondArray::from_iter_values((0..n as i64).map(|v| v * 1_000_000_000)).with_timezone("UTC"),
        );
        let spans: ArrayRef = Arc::new(DurationNanosecondArray::from_iter_values((0..n as i64).map(|v| v * 7)));
        let complex: ArrayRef = Arc::new(FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float64, false)),
            2,
            Arc::new(Float64Array::from_iter_values((0..2 * n).map(|v| v as f64))),
            None,
        )?);
        let more: ArrayRef = Arc::new(Int64Array::from_iter_values((0..n as i64).map(|v| -v)));
        Ok(Frame::from_columns(
            Index::range(n),
            [
                ("i", ints),
                ("f", floats),
                ("s", strings),
                ("t", stamps),
                ("d", spans),
                ("c", complex),
                ("j", more),
            ],
        )?)
    }

    #[test]
    fn frames_round_trip_every_dtype() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let frame = mixed_frame(5)?;
        let group = NodePath::parse("/df")?;
        let storer = FixedStorer::write(&c, &group, &frame.clone().into(), None)?;
        assert_eq!(storer.attrs().nblocks, 6);
        assert_eq!(storer.shape(&c)?, vec![5, 7]);
        let back = storer.read(&c, &SelectOptions::default())?;
        assert_eq!(back, Dataset::Frame(frame));
        Ok(())
    }

    #[test]
    fn zero_length_frames_keep_shape_and_dtypes() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let frame = mixed_frame(0)?;
        let group = NodePath::parse("/empty")?;
        let back = FixedStorer::write(&c, &group, &frame.clone().into(), None)?.read(&c, &SelectOptions::default())?;
        let back = back.into_frame().ok_or("not a frame")?;
        assert_eq!(back.nrows(), 0);
        assert_eq!(back.fields()?, frame.fields()?);
        Ok(())
    }

    #[test]
    fn series_keep_name_and_slice_by_range() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let values: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0)]));
        let series = Series::new(Index::range(3), values)?.with_name(Some("x".into()));
        let group = NodePath::parse("/s")?;
        let storer = FixedStorer::write(&c, &group, &series.into(), None)?;

        let opts = SelectOptions::default().range(Some(1), None);
        let back = storer.read(&c, &opts)?.into_series().ok_or("not a series")?;
        assert_eq!(back.name(), Some("x"));
        assert_eq!(back.index().labels()?, vec![Label::Int(1), Label::Int(2)]);
        assert_eq!(back.len(), 2);
        Ok(())
    }

    #[test]
    fn duplicate_columns_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1]));
        let frame = Frame::from_columns(Index::range(1), [("a", a.clone()), ("a", a)])?;
        let err = FixedStorer::write(&c, &NodePath::parse("/dup")?, &frame.into(), None).err();
        assert!(matches!(err, Some(StoreError::NonUniqueColumns)));
        assert_eq!(c.node_kind(&NodePath::parse("/dup")?)?, None);
        Ok(())
    }

    #[test]
    fn selections_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let storer = FixedStorer::write(&c, &NodePath::parse("/df")?, &mixed_frame(2)?.into(), None)?;
        let by_expr = storer.read(&c, &SelectOptions::matching(Expr::col("index").gt(0))).err();
        assert_eq!(by_expr.map(|e| e.kind()), Some(ErrorKind::UnsupportedOperation));
        let by_columns = storer.read(&c, &SelectOptions::default().columns(["i"])).err();
        assert!(matches!(by_columns, Some(StoreError::FixedSelection)));
        Ok(())
    }
}
