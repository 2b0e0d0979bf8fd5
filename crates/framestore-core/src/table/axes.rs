//! Schema derivation for table writes.
//!
//! [`create_axes`] turns an incoming object into a frozen row layout:
//!
//! 1. series and multi-level row indexes are normalized to one row key
//!    plus labeled columns;
//! 2. an existing table fixes the string settings, the data columns and
//!    the column order, and new data must conform;
//! 3. columns are grouped into blocks by dtype, with each categorical and
//!    each data column in a block of its own;
//! 4. on append, blocks are matched to the persisted blocks by their item
//!    labels;
//! 5. positions are assigned index first, then values, and every column
//!    is validated against its persisted counterpart.
//!
//! Nothing is written until the whole layout validates.

use std::collections::HashSet;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use snafu::prelude::*;

use super::{COLUMNS_AXIS, Table, TableAttrs, TableType};
use crate::columns::lifecycle::Validated;
use crate::columns::{AxisInfo, AxisType, ColumnAttrs, DataCol, IndexCol, InfoMap, StringCodec};
use crate::config::{
    DEFAULT_ENCODING, DEFAULT_ERRORS, DEFAULT_NAN_REP, DataColumns, FORMAT_VERSION, PutOptions,
};
use crate::container::TableField;
use crate::error::{
    DuplicateLevelNamesSnafu, InvalidCombinationSnafu, InvalidMinItemsizeSnafu,
    MultiIndexDataColumnsSnafu, NonStringDataColumnSnafu, StoreResult, StructureMismatchSnafu,
};
use crate::frame::{Dataset, Index, Label, display_labels, is_categorical};
use crate::storer::ObjectType;

/// Name of the index column.
pub(super) const INDEX_COLUMN: &str = "index";
/// `min_itemsize` key applying to every non-promoted string block.
pub(super) const VALUES_KEY: &str = "values";

/// An object reduced to one row key and labeled columns.
#[derive(Debug)]
struct Normalized {
    object_type: ObjectType,
    table_type: TableType,
    keys: ArrayRef,
    freq: Option<String>,
    index_name: Option<String>,
    columns: Index,
    labels: Vec<Label>,
    data: Vec<ArrayRef>,
    levels: Option<Vec<String>>,
    promoted: Vec<String>,
}

fn level_names(index: &Index) -> Vec<String> {
    index
        .names()
        .iter()
        .enumerate()
        .map(|(i, n)| n.clone().unwrap_or_else(|| format!("level_{i}")))
        .collect()
}

fn normalize(obj: &Dataset) -> StoreResult<Normalized> {
    let (object_type, index, mut columns, mut labels, mut data, mut promoted) = match obj {
        Dataset::Series(s) => {
            let label = s.name().unwrap_or(VALUES_KEY).to_string();
            (
                ObjectType::SeriesTable,
                s.index(),
                Index::from_labels(&[Label::from(label.as_str())])?,
                vec![Label::from(label.as_str())],
                vec![s.values().clone()],
                vec![label],
            )
        }
        Dataset::Frame(f) => (
            ObjectType::FrameTable,
            f.index(),
            f.columns().clone(),
            f.columns().labels()?,
            f.data().to_vec(),
            Vec::new(),
        ),
    };

    let multi = index.is_multi();
    let table_type = match (object_type, multi) {
        (ObjectType::SeriesTable, false) => TableType::AppendableSeries,
        (ObjectType::SeriesTable, true) => TableType::AppendableMultiseries,
        (_, false) => TableType::AppendableFrame,
        (_, true) => TableType::AppendableMultiframe,
    };

    if !multi {
        return Ok(Normalized {
            object_type,
            table_type,
            keys: index.level(0).clone(),
            freq: index.freq().map(Into::into),
            index_name: index.name().map(Into::into),
            columns,
            labels,
            data,
            levels: None,
            promoted,
        });
    }

    // Row levels move into leading data columns; the row key becomes positional.
    let names = level_names(index);
    let mut seen = HashSet::new();
    let collides = names
        .iter()
        .any(|n| !seen.insert(n.as_str()) || labels.iter().any(|l| l.as_str() == Some(n.as_str())));
    ensure!(!collides, DuplicateLevelNamesSnafu);
    if labels.iter().any(|l| matches!(l, Label::Tuple(_))) {
        return MultiIndexDataColumnsSnafu {
            columns: names.join(","),
        }
        .fail();
    }
    let mut all_labels: Vec<Label> = names.iter().map(|n| Label::from(n.as_str())).collect();
    all_labels.append(&mut labels);
    let mut all_data = index.levels().to_vec();
    all_data.append(&mut data);
    columns = Index::from_labels(&all_labels)?;
    promoted.splice(0..0, names.iter().cloned());

    Ok(Normalized {
        object_type,
        table_type,
        keys: Index::range(index.len()).level(0).clone(),
        freq: None,
        index_name: None,
        columns,
        labels: all_labels,
        data: all_data,
        levels: Some(names),
        promoted,
    })
}

/// Reorder `data` to the persisted label order when `labels` is a
/// permutation of it.
fn conform_labels(
    labels: Vec<Label>,
    data: Vec<ArrayRef>,
    existing: &[Label],
) -> StoreResult<(Vec<Label>, Vec<ArrayRef>)> {
    if labels == existing {
        return Ok((labels, data));
    }
    let mismatch = || {
        InvalidCombinationSnafu {
            what: "non_index_axes",
            new: display_labels(&labels),
            existing: display_labels(existing),
        }
        .fail()
    };
    if labels.len() != existing.len() {
        return mismatch();
    }
    let mut used = vec![false; labels.len()];
    let mut order = Vec::with_capacity(labels.len());
    for want in existing {
        match (0..labels.len()).find(|i| !used[*i] && &labels[*i] == want) {
            Some(i) => {
                used[i] = true;
                order.push(i);
            }
            None => return mismatch(),
        }
    }
    let data = order.iter().map(|i| data[*i].clone()).collect();
    Ok((existing.to_vec(), data))
}

fn requested_data_columns(
    norm: &Normalized,
    labels: &[Label],
    opts: &PutOptions,
) -> StoreResult<Vec<String>> {
    let mut out = norm.promoted.clone();
    let multi_columns = labels.iter().any(|l| matches!(l, Label::Tuple(_)));
    match &opts.data_columns {
        Some(DataColumns::All) => {
            ensure!(!multi_columns, MultiIndexDataColumnsSnafu { columns: "all" });
            for label in labels {
                match label {
                    Label::Str(s) => out.push(s.clone()),
                    other => {
                        return NonStringDataColumnSnafu {
                            label: other.to_string(),
                        }
                        .fail();
                    }
                }
            }
        }
        Some(DataColumns::Named(names)) if !names.is_empty() => {
            ensure!(
                !multi_columns,
                MultiIndexDataColumnsSnafu {
                    columns: names.join(","),
                }
            );
            out.extend(names.iter().cloned());
        }
        _ => {}
    }
    if let Some(min_itemsize) = &opts.min_itemsize {
        out.extend(
            min_itemsize
                .keys()
                .filter(|k| k.as_str() != VALUES_KEY && k.as_str() != INDEX_COLUMN)
                .cloned(),
        );
    }
    let mut seen = HashSet::new();
    out.retain(|c| labels.iter().any(|l| l.as_str() == Some(c.as_str())) && seen.insert(c.clone()));
    Ok(out)
}

/// One planned value field before declaration.
#[derive(Debug)]
struct Planned {
    items: Vec<Label>,
    arrays: Vec<ArrayRef>,
    data_column: Option<String>,
}

fn plan_blocks(labels: &[Label], data: &[ArrayRef], data_columns: &[String]) -> Vec<Planned> {
    let mut blocks: Vec<Planned> = Vec::new();
    let mut block_types: Vec<Option<DataType>> = Vec::new();
    for (label, array) in labels.iter().zip(data) {
        if label.as_str().is_some_and(|s| data_columns.iter().any(|c| c == s)) {
            continue;
        }
        let categorical = is_categorical(array.data_type());
        let slot = (!categorical)
            .then(|| block_types.iter().position(|t| t.as_ref() == Some(array.data_type())))
            .flatten();
        match slot {
            Some(b) => {
                blocks[b].items.push(label.clone());
                blocks[b].arrays.push(array.clone());
            }
            None => {
                block_types.push((!categorical).then(|| array.data_type().clone()));
                blocks.push(Planned {
                    items: vec![label.clone()],
                    arrays: vec![array.clone()],
                    data_column: None,
                });
            }
        }
    }
    for name in data_columns {
        if let Some(i) = labels.iter().position(|l| l.as_str() == Some(name.as_str())) {
            blocks.push(Planned {
                items: vec![labels[i].clone()],
                arrays: vec![data[i].clone()],
                data_column: Some(name.clone()),
            });
        }
    }
    blocks
}

/// Pair each planned block with the persisted column it must match.
fn match_existing<'a>(
    blocks: Vec<Planned>,
    existing: &'a [DataCol],
) -> StoreResult<Vec<(Planned, Option<&'a DataCol>)>> {
    if existing.is_empty() {
        return Ok(blocks.into_iter().map(|b| (b, None)).collect());
    }
    let mut pending = blocks;
    let mut out = Vec::with_capacity(existing.len());
    for old in existing {
        let Some(i) = pending.iter().position(|b| b.items == old.items) else {
            return StructureMismatchSnafu {
                items: display_labels(&old.items),
            }
            .fail();
        };
        out.push((pending.remove(i), Some(old)));
    }
    if let Some(extra) = pending.first() {
        return StructureMismatchSnafu {
            items: display_labels(&extra.items),
        }
        .fail();
    }
    Ok(out)
}

/// A value field ready to write, with the in-memory arrays it came from.
#[derive(Debug)]
pub(super) struct Block {
    pub column: Validated<DataCol>,
    pub source: Vec<ArrayRef>,
}

/// A validated row layout and the values to write.
#[derive(Debug)]
pub(super) struct Layout {
    pub attrs: TableAttrs,
    pub codec: StringCodec,
    pub index: Validated<IndexCol>,
    pub values: Vec<Block>,
    pub nrows: usize,
}

impl Layout {
    /// Row layout in field order.
    pub fn fields(&self) -> Vec<TableField> {
        let index = self.index.column();
        std::iter::once(TableField::new(&index.cname, index.column_type))
            .chain(
                self.values
                    .iter()
                    .map(|b| TableField::new(&b.column.column().cname, b.column.column().column_type)),
            )
            .collect()
    }

    /// Descriptors of every column.
    pub fn descriptors(&self) -> (Vec<IndexCol>, Vec<DataCol>) {
        (
            vec![self.index.column().clone()],
            self.values.iter().map(|b| b.column.column().clone()).collect(),
        )
    }
}

/// Per-column attributes for a set of descriptors.
pub(super) fn column_attrs(index: &[IndexCol], values: &[DataCol]) -> ColumnAttrs {
    let mut attrs = ColumnAttrs::default();
    for c in index {
        attrs.record_index(c);
    }
    for c in values {
        attrs.record_data(c);
    }
    attrs
}

/// Derive and validate the row layout for writing `obj`.
pub(super) fn create_axes(obj: &Dataset, opts: &PutOptions, existing: Option<&Table>) -> StoreResult<Layout> {
    let norm = normalize(obj)?;
    if let Some(t) = existing {
        ensure!(
            t.table_type() == norm.table_type,
            InvalidCombinationSnafu {
                what: "table_type",
                new: norm.table_type.as_str(),
                existing: t.table_type().as_str(),
            }
        );
    }

    let (nan_rep, encoding, errors) = match existing {
        Some(t) => (
            t.attrs.nan_rep.clone(),
            t.attrs.encoding.clone().unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            t.attrs.errors.clone(),
        ),
        None => (
            opts.nan_rep.clone().unwrap_or_else(|| DEFAULT_NAN_REP.to_string()),
            opts.encoding.clone().unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            opts.errors.clone().unwrap_or_else(|| DEFAULT_ERRORS.to_string()),
        ),
    };
    let codec = StringCodec::new(&nan_rep, &encoding, &errors)?;

    let (labels, data) = match existing {
        Some(t) => conform_labels(norm.labels.clone(), norm.data.clone(), &t.labels())?,
        None => (norm.labels.clone(), norm.data.clone()),
    };
    let data_columns = match existing {
        Some(t) => t.attrs.data_columns.clone(),
        None => requested_data_columns(&norm, &labels, opts)?,
    };

    let min_itemsize = opts.min_itemsize.clone().unwrap_or_default();
    for key in min_itemsize.keys() {
        ensure!(
            key == VALUES_KEY || key == INDEX_COLUMN || data_columns.contains(key),
            InvalidMinItemsizeSnafu { key }
        );
    }

    let mut info: InfoMap = existing.map(|t| t.attrs.info.clone()).unwrap_or_default();
    let existing_index = existing.and_then(|t| t.index_axes.first());
    let index = IndexCol::declare(
        INDEX_COLUMN,
        0,
        &norm.keys,
        norm.freq.clone(),
        norm.index_name.clone(),
        &codec,
        min_itemsize.get(INDEX_COLUMN).copied(),
        existing_index,
    )?
    .bind(0)
    .validate(existing_index, &mut info)?;

    let planned = plan_blocks(&labels, &data, &data_columns);
    let matched = match_existing(planned, existing.map_or(&[][..], |t| &t.values_axes[..]))?;
    let mut values = Vec::with_capacity(matched.len());
    let mut auto = 0;
    for (i, (block, old)) in matched.into_iter().enumerate() {
        let name = match (&block.data_column, old) {
            (_, Some(old)) => old.cname.clone(),
            (Some(name), None) => name.clone(),
            (None, None) => {
                auto += 1;
                format!("values_block_{}", auto - 1)
            }
        };
        let limit = match &block.data_column {
            Some(dc) => min_itemsize.get(dc),
            None => min_itemsize.get(VALUES_KEY),
        };
        let column = DataCol::declare(
            &name,
            block.items,
            &block.arrays,
            block.data_column.is_some(),
            &codec,
            limit.copied(),
            old,
        )?
        .bind(i + 1)
        .validate(old, &mut info)?;
        values.push(Block {
            column,
            source: block.arrays,
        });
    }

    let names = norm.columns.names().to_vec();
    let axis_type = if norm.columns.is_multi() {
        AxisType::MultiIndex
    } else {
        AxisType::Index
    };
    let axis_info = info.entry(COLUMNS_AXIS.to_string()).or_insert_with(AxisInfo::default);
    axis_info.names = Some(names);
    axis_info.axis_type = Some(axis_type);

    let attrs = TableAttrs {
        object_type: norm.object_type,
        format_version: existing
            .and_then(|t| t.attrs.format_version.clone())
            .or_else(|| Some(FORMAT_VERSION.to_string())),
        table_type: norm.table_type,
        index_cols: vec![(0, INDEX_COLUMN.to_string())],
        values_cols: values.iter().map(|b| b.column.column().cname.clone()).collect(),
        non_index_axes: vec![(1, labels)],
        data_columns,
        nan_rep,
        encoding: Some(encoding),
        errors,
        levels: norm.levels,
        metadata: values
            .iter()
            .filter(|b| b.column.column().is_categorical())
            .map(|b| b.column.column().cname.clone())
            .collect(),
        info,
    };
    Ok(Layout {
        attrs,
        codec,
        index,
        values,
        nrows: obj.nrows(),
    })
}
