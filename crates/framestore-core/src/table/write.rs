//! Table write path.

use arrow::array::{Array, ArrayRef, BooleanArray, UInt64Array};
use arrow::compute::{filter, take};
use arrow::record_batch::RecordBatch;
use log::debug;
use snafu::prelude::*;

use super::axes::{Block, Layout, column_attrs, create_axes};
use super::Table;

use crate::config::{DEFAULT_CHUNKSIZE, DEFAULT_OPTLEVEL, IndexKind, MIN_EXPECTED_ROWS, PutOptions};
use crate::container::{Container, Filters, NodePath};
use crate::error::{ArrowSnafu, StoreResult};
use crate::fixed::FixedStorer;
use crate::frame::{Dataset, Series, is_missing};

/// Rows to keep: those with at least one present value in some block.
fn keep_mask(blocks: &[Block], nrows: usize) -> BooleanArray {
    (0..nrows)
        .map(|row| {
            let all_missing = blocks
                .iter()
                .all(|b| b.source.iter().all(|a| is_missing(a, row)));
            Some(!all_missing)
        })
        .collect()
}

/// Expand per-axis keys to one entry per coordinate tuple of their
/// cartesian product, the last axis varying fastest.
pub(super) fn broadcast(keys: &[ArrayRef]) -> StoreResult<Vec<ArrayRef>> {
    if keys.len() < 2 {
        return Ok(keys.to_vec());
    }
    let lens: Vec<usize> = keys.iter().map(|k| k.len()).collect();
    let total: usize = lens.iter().product();
    let mut out = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let stride: usize = lens[i + 1..].iter().product();
        let picks = UInt64Array::from_iter_values((0..total).map(|r| ((r / stride) % lens[i]) as u64));
        out.push(take(key.as_ref(), &picks, None).context(ArrowSnafu)?);
    }
    Ok(out)
}

impl Table {
    /// Write `obj` into the table at `group`, creating it when `existing`
    /// is `None` and appending otherwise.
    pub(crate) fn write(
        container: &Container,
        group: &NodePath,
        obj: &Dataset,
        opts: &PutOptions,
        dropna: bool,
        existing: Option<Table>,
    ) -> StoreResult<Table> {
        if let Some(t) = &existing {
            t.ensure_writable_variant("append to")?;
        }
        let layout = create_axes(obj, opts, existing.as_ref())?;
        let mut table = match existing {
            Some(mut t) => {
                let (index_axes, values_axes) = layout.descriptors();
                t.attrs = layout.attrs.clone();
                t.index_axes = index_axes;
                t.values_axes = values_axes;
                t
            }
            None => Self::create(container, group, &layout, opts)?,
        };
        table.write_data(&layout, opts.chunksize.unwrap_or(DEFAULT_CHUNKSIZE), dropna)?;
        table.persist_attrs(container)?;
        if opts.index.unwrap_or(true) {
            table.create_index(None, IndexKind::default(), DEFAULT_OPTLEVEL)?;
        }
        Ok(table)
    }

    fn create(container: &Container, group: &NodePath, layout: &Layout, opts: &PutOptions) -> StoreResult<Table> {
        container.create_group(group)?;
        container.set_attrs(group, &layout.attrs)?;
        let expectedrows = opts
            .expectedrows
            .unwrap_or(layout.nrows as u64)
            .max(MIN_EXPECTED_ROWS);
        let node = container.create_table(
            &group.join(Self::NODE)?,
            layout.fields(),
            expectedrows,
            Filters::from_options(opts.complib, opts.complevel),
        )?;
        let (index_axes, values_axes) = layout.descriptors();
        for col in &values_axes {
            if let Some(categories) = &col.categories {
                let meta: Dataset = Series::from_array(categories.clone()).into();
                FixedStorer::write(container, &Self::meta_path(group, &col.cname)?, &meta, None)?;
            }
        }
        debug!("created table {} with expectedrows {expectedrows}", group);
        Ok(Table {
            group: group.clone(),
            attrs: layout.attrs.clone(),
            node,
            index_axes,
            values_axes,
            codec: layout.codec.clone(),
        })
    }

    /// Stream the layout's rows into the node in chunks of `chunksize`,
    /// flushing after each chunk.
    fn write_data(&mut self, layout: &Layout, chunksize: usize, dropna: bool) -> StoreResult<()> {
        let nrows = layout.nrows;
        let keep = dropna.then(|| keep_mask(&layout.values, nrows));
        let mut columns = broadcast(std::slice::from_ref(layout.index.values()))?;
        columns.extend(layout.values.iter().map(|b| b.column.values().clone()));

        let schema = self.node.schema().clone();
        let chunksize = chunksize.max(1);
        for start in (0..nrows).step_by(chunksize) {
            let len = chunksize.min(nrows - start);
            let mut chunk: Vec<ArrayRef> = columns.iter().map(|c| c.slice(start, len)).collect();
            if let Some(keep) = &keep {
                let keep = keep.slice(start, len);
                chunk = chunk
                    .iter()
                    .map(|c| filter(c.as_ref(), &keep))
                    .collect::<Result<_, _>>()
                    .context(ArrowSnafu)?;
            }
            let batch = RecordBatch::try_new(schema.clone(), chunk).context(ArrowSnafu)?;
            self.node.append(&batch)?;
            self.node.flush()?;
            debug!(
                "wrote {} of rows {start}..{} to {}",
                batch.num_rows(),
                start + len,
                self.group
            );
        }
        Ok(())
    }

    fn persist_attrs(&mut self, container: &Container) -> StoreResult<()> {
        container.set_attrs(&self.group, &self.attrs)?;
        self.node
            .set_attrs(&column_attrs(&self.index_axes, &self.values_axes))?;
        Ok(())
    }
}
