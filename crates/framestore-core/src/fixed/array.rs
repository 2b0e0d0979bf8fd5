//! Array nodes of the fixed layout.
//!
//! Values are stored in their in-memory arrow type except where parquet
//! cannot carry the type faithfully: timestamps and durations become
//! nanosecond integers, complex numbers become packed byte pairs. The
//! `value_type` attribute records the original dtype so reads can restore
//! it. The container refuses zero-length arrays, so an empty array is
//! written as a one-element null sentinel with its true `shape`.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, UInt64Array, new_null_array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::row::{RowConverter, SortField};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::columns::codec::{
    complex_from_storage, complex_to_storage, nanos_from_storage,
    nanos_to_storage,
};
use crate::columns::kind::{dtype_name, dtype_to_arrow, timezone};
use crate::columns::Kind;
use crate::container::{Container, Filters, NodePath};
use crate::error::{ArrowSnafu, CategoricalFixedSnafu, CorruptSnafu, StoreResult};
use crate::frame::{Index, is_categorical};

/// Attributes of one fixed-layout array node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayAttrs {
    /// In-memory dtype of the values.
    pub value_type: String,
    /// Logical shape: `[rows]`, or `[columns, rows]` for value blocks.
    #[serde(default)]
    pub shape: Vec<usize>,
    /// True when each stored column is one logical column of a block.
    #[serde(default)]
    pub transposed: bool,
    /// Kind of index labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    /// Index or level name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index flavor (`Index`, `DatetimeIndex`, `TimedeltaIndex`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_class: Option<String>,
    /// Frequency of a regular index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<String>,
    /// Timezone of timestamp values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

impl ArrayAttrs {
    /// True when the node holds an empty-array sentinel.
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    fn index(array: &ArrayRef, name: Option<String>, freq: Option<String>) -> Self {
        let class = match array.data_type() {
            DataType::Timestamp(_, _) => "DatetimeIndex",
            DataType::Duration(_) => "TimedeltaIndex",
            _ => "Index",
        };
        Self {
            kind: Some(Kind::of(array.data_type())),
            name,
            index_class: Some(class.to_string()),
            freq,
            ..Self::default()
        }
    }
}

/// How an index axis is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum IndexLayout {
    /// One array of labels.
    Regular,
    /// Per level, an array of distinct labels plus an array of codes.
    Multi {
        /// Number of levels.
        nlevels: usize,
    },
}

fn to_storage(path: &NodePath, array: &ArrayRef) -> StoreResult<ArrayRef> {
    let data_type = array.data_type();
    if is_categorical(data_type) {
        return CategoricalFixedSnafu {
            column: path.to_string(),
        }
        .fail();
    }
    match Kind::of(data_type) {
        Kind::Datetime64 | Kind::Timedelta64 => nanos_to_storage(array),
        Kind::Complex => Ok(complex_to_storage(array)),
        _ => Ok(array.clone()),
    }
}

fn from_storage(raw: &ArrayRef, attrs: &ArrayAttrs) -> StoreResult<ArrayRef> {
    match Kind::from_dtype(&attrs.value_type) {
        Kind::Datetime64 => nanos_from_storage(
            raw,
            &DataType::Timestamp(TimeUnit::Nanosecond, attrs.tz.as_deref().map(Into::into)),
        ),
        Kind::Timedelta64 => nanos_from_storage(raw, &DataType::Duration(TimeUnit::Nanosecond)),
        Kind::Complex => complex_from_storage(raw),
        Kind::String if raw.data_type() != &DataType::Utf8 => {
            cast(raw, &DataType::Utf8).context(ArrowSnafu)
        }
        Kind::Date if raw.data_type() != &DataType::Date32 => {
            cast(raw, &DataType::Date32).context(ArrowSnafu)
        }
        _ => match dtype_to_arrow(&attrs.value_type, None) {
            Some(target) if &target != raw.data_type() => cast(raw, &target).context(ArrowSnafu),
            _ => Ok(raw.clone()),
        },
    }
}

/// Write equal-length arrays of one dtype as a single array node.
pub(crate) fn write_array(
    container: &Container,
    path: &NodePath,
    columns: &[ArrayRef],
    mut attrs: ArrayAttrs,
    filters: Option<&Filters>,
) -> StoreResult<()> {
    let Some(first) = columns.first() else {
        return CorruptSnafu {
            key: path.to_string(),
            reason: "no columns to write",
        }
        .fail();
    };
    let rows = first.len();
    attrs.value_type = dtype_name(first.data_type());
    attrs.tz = timezone(first.data_type());
    attrs.shape = if attrs.transposed {
        vec![columns.len(), rows]
    } else {
        vec![rows]
    };

    let mut stored = Vec::with_capacity(columns.len());
    for column in columns {
        let raw = to_storage(path, column)?;
        stored.push(if rows == 0 {
            new_null_array(raw.data_type(), 1)
        } else {
            raw
        });
    }
    container.create_array(path, &stored, &attrs, filters)?;
    Ok(())
}

/// Read an array node back into its in-memory arrays.
pub(crate) fn read_array(container: &Container, path: &NodePath) -> StoreResult<(Vec<ArrayRef>, ArrayAttrs)> {
    let attrs: ArrayAttrs = container.attrs(path)?.context(CorruptSnafu {
        key: path.to_string(),
        reason: "array attributes are missing",
    })?;
    let mut out = Vec::new();
    for raw in container.read_array(path)? {
        let array = from_storage(&raw, &attrs)?;
        out.push(if attrs.is_empty() { array.slice(0, 0) } else { array });
    }
    Ok((out, attrs))
}

fn read_single(container: &Container, path: &NodePath) -> StoreResult<(ArrayRef, ArrayAttrs)> {
    let (arrays, attrs) = read_array(container, path)?;
    let array = arrays.into_iter().next().context(CorruptSnafu {
        key: path.to_string(),
        reason: "array node holds no columns",
    })?;
    Ok((array, attrs))
}

/// Distinct values in order of first appearance plus one code per row.
fn factorize(level: &ArrayRef) -> StoreResult<(ArrayRef, ArrayRef)> {
    let converter = RowConverter::new(vec![SortField::new(level.data_type().clone())])
        .context(ArrowSnafu)?;
    let rows = converter
        .convert_columns(std::slice::from_ref(level))
        .context(ArrowSnafu)?;
    let mut seen = HashMap::new();
    let mut firsts = Vec::new();
    let mut codes = Vec::with_capacity(level.len());
    for (i, row) in rows.iter().enumerate() {
        let next = firsts.len() as i64;
        let code = *seen.entry(row).or_insert_with(|| {
            firsts.push(i as u64);
            next
        });
        codes.push(code);
    }
    let uniques = take(level.as_ref(), &UInt64Array::from(firsts), None).context(ArrowSnafu)?;
    Ok((uniques, Arc::new(Int64Array::from(codes))))
}

/// Write an index axis under `group` as `key` (or `key_level{i}` and
/// `key_label{i}` per level of a multi-level index).
pub(crate) fn write_index(
    container: &Container,
    group: &NodePath,
    key: &str,
    index: &Index,
    filters: Option<&Filters>,
) -> StoreResult<IndexLayout> {
    if !index.is_multi() {
        let values = index.level(0);
        let attrs = ArrayAttrs::index(values, index.name().map(Into::into), index.freq().map(Into::into));
        write_array(container, &group.join(key)?, std::slice::from_ref(values), attrs, filters)?;
        return Ok(IndexLayout::Regular);
    }

    for (i, (level, name)) in index.levels().iter().zip(index.names()).enumerate() {
        let (uniques, codes) = factorize(level)?;
        let attrs = ArrayAttrs::index(&uniques, name.clone(), None);
        write_array(container, &group.join(&format!("{key}_level{i}"))?, &[uniques], attrs, filters)?;
        write_array(
            container,
            &group.join(&format!("{key}_label{i}"))?,
            &[codes],
            ArrayAttrs::default(),
            filters,
        )?;
    }
    Ok(IndexLayout::Multi {
        nlevels: index.nlevels(),
    })
}

/// Read an index axis written by [`write_index`].
pub(crate) fn read_index(
    container: &Container,
    group: &NodePath,
    key: &str,
    layout: IndexLayout,
) -> StoreResult<Index> {
    match layout {
        IndexLayout::Regular => {
            let (values, attrs) = read_single(container, &group.join(key)?)?;
            Ok(Index::new(values).with_names(vec![attrs.name])?.with_freq(attrs.freq))
        }
        IndexLayout::Multi { nlevels } => {
            let mut levels = Vec::with_capacity(nlevels);
            let mut names = Vec::with_capacity(nlevels);
            for i in 0..nlevels {
                let (uniques, attrs) = read_single(container, &group.join(&format!("{key}_level{i}"))?)?;
                let (codes, _) = read_single(container, &group.join(&format!("{key}_label{i}"))?)?;
                let codes = cast(&codes, &DataType::UInt64).context(ArrowSnafu)?;
                let picks = codes.as_any().downcast_ref::<UInt64Array>().context(CorruptSnafu {
                    key: group.to_string(),
                    reason: format!("codes of level {i} are not integers"),
                })?;
                levels.push(take(uniques.as_ref(), picks, None).context(ArrowSnafu)?);
                names.push(attrs.name);
            }
            Ok(Index::multi(levels, names)?)
        }
    }
}

/// Logical row count of the index written under `key`.
pub(crate) fn index_len(
    container: &Container,
    group: &NodePath,
    key: &str,
    layout: IndexLayout,
) -> StoreResult<usize> {
    let path = match layout {
        IndexLayout::Regular => group.join(key)?,
        IndexLayout::Multi { .. } => group.join(&format!("{key}_label0"))?,
    };
    let attrs: ArrayAttrs = container.attrs(&path)?.context(CorruptSnafu {
        key: path.to_string(),
        reason: "array attributes are missing",
    })?;
    Ok(attrs.shape.last().copied().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenMode;
    use crate::error::ErrorKind;
    use arrow::array::{DictionaryArray, StringArray, TimestampNanosecondArray};
    use arrow::datatypes::Int8Type;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn container(tmp: &TempDir) -> Result<Container, Box<dyn std::error::Error>> {
        Ok(Container::open(tmp.path().join("s"), OpenMode::Append, None)?)
    }

    #[test]
    fn empty_arrays_keep_their_dtype() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let path = NodePath::parse("/e/values")?;
        let empty: ArrayRef = Arc::new(TimestampNanosecondArray::from(Vec::<i64>::new()).with_timezone("UTC"));
        write_array(&c, &path, &[empty.clone()], ArrayAttrs::default(), None)?;
        let (back, attrs) = read_array(&c, &path)?;
        assert_eq!(attrs.shape, vec![0]);
        assert_eq!(back, vec![empty]);
        Ok(())
    }

    #[test]
    fn multi_level_index_round_trips_through_codes() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let group = NodePath::parse("/m")?;
        c.create_group(&group)?;
        let outer: ArrayRef = Arc::new(StringArray::from(vec!["a", "a", "b", "b"]));
        let inner: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 1, 2]));
        let index = Index::multi(vec![outer, inner], vec![Some("k".into()), None])?;

        let layout = write_index(&c, &group, "index", &index, None)?;
        assert_eq!(layout, IndexLayout::Multi { nlevels: 2 });
        let (uniques, _) = read_single(&c, &group.join("index_level0")?)?;
        assert_eq!(uniques.len(), 2);
        assert_eq!(read_index(&c, &group, "index", layout)?, index);
        assert_eq!(index_len(&c, &group, "index", layout)?, 4);
        Ok(())
    }

    #[test]
    fn categoricals_need_the_table_layout() -> TestResult {
        let tmp = TempDir::new()?;
        let c = container(&tmp)?;
        let cat: ArrayRef = Arc::new(DictionaryArray::<Int8Type>::try_new(
            arrow::array::Int8Array::from(vec![0]),
            Arc::new(StringArray::from(vec!["x"])),
        )?);
        let err = write_array(&c, &NodePath::parse("/c")?, &[cat], ArrayAttrs::default(), None)
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::UnsupportedOperation));
        Ok(())
    }
}
