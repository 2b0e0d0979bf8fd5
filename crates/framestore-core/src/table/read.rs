//! Table read path: selection, decoding, and post-read axis processing.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, UInt64Array};
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use super::{COLUMNS_AXIS, FieldRef, Table};
use crate::config::SelectOptions;
use crate::error::{StoreResult, UnknownFieldSnafu};
use crate::expr::{FilterTerm, Predicate, array_values};
use crate::frame::{Dataset, Frame, Index, Label, Series};
use crate::selection::{Selection, normalize_range};

use super::axes::VALUES_KEY;

/// True for the placeholder name given to an unnamed index level.
fn is_placeholder_level(name: &str, i: usize) -> bool {
    name == format!("level_{i}")
}

impl Table {
    /// Resolve a predicate over rows `[start, stop)` of this table.
    pub(crate) fn selection(
        &self,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> StoreResult<Selection> {
        Selection::new(
            &self.node,
            predicate,
            start,
            stop,
            &self.queryables(),
            &self.codec,
            self.is_old_version(),
        )
    }

    /// Read the rows and columns addressed by `opts`.
    pub(crate) fn read(&self, opts: &SelectOptions) -> StoreResult<Dataset> {
        self.ensure_readable()?;
        let selection = self.selection(opts.predicate.as_ref(), opts.start, opts.stop)?;
        self.read_selection(&selection, opts.columns.as_deref())
    }

    /// Read one resolved selection and shape it like the written object.
    pub(crate) fn read_selection(&self, selection: &Selection, columns: Option<&[Label]>) -> StoreResult<Dataset> {
        let (batch, index) = match self.index_axes.first() {
            None => {
                let coords = selection.select_coords(&self.node)?;
                let batch = self.node.read_coordinates(&coords)?;
                let positions: ArrayRef = Arc::new(Int64Array::from_iter_values(coords.iter().map(|&c| c as i64)));
                (batch, Index::new(positions))
            }
            Some(col) => {
                let batch = selection.select(&self.node)?;
                let keys = col.convert(batch.column(col.pos), &self.codec)?;
                let index = Index::new(keys)
                    .with_freq(col.freq.clone())
                    .with_names(vec![col.index_name.clone()])?;
                (batch, index)
            }
        };

        let frame = self.decode_values(&batch, index)?;
        let frame = self.restore_levels(frame)?;
        let frame = self.process_axes(frame, selection.filter(), columns)?;

        if self.table_type().is_series() {
            let series = frame.to_series(0)?;
            let name = series.name().filter(|n| *n != VALUES_KEY).map(str::to_string);
            return Ok(series.with_name(name).into());
        }
        Ok(frame.into())
    }

    fn decode_values(&self, batch: &RecordBatch, index: Index) -> StoreResult<Frame> {
        let mut by_label: HashMap<Label, ArrayRef> = HashMap::new();
        for col in &self.values_axes {
            let arrays = col.convert(batch.column(col.pos), &self.codec)?;
            by_label.extend(col.items.iter().cloned().zip(arrays));
        }
        let labels: Vec<Label> = self
            .labels()
            .into_iter()
            .filter(|l| by_label.contains_key(l))
            .collect();
        let data = labels
            .iter()
            .filter_map(|l| by_label.remove(l))
            .collect::<Vec<_>>();

        let mut columns = Index::from_labels(&labels)?;
        if let Some(names) = self.attrs.info.get(COLUMNS_AXIS).and_then(|i| i.names.clone()) {
            if names.len() == columns.nlevels() {
                columns = columns.with_names(names)?;
            }
        }
        Ok(Frame::new(index, columns, data)?)
    }

    /// Move the level columns of a multi-level row index back into the index.
    fn restore_levels(&self, frame: Frame) -> StoreResult<Frame> {
        let Some(levels) = &self.attrs.levels else {
            return Ok(frame);
        };
        let labels = frame.columns().labels()?;
        let mut arrays = Vec::with_capacity(levels.len());
        let mut level_positions = Vec::with_capacity(levels.len());
        for name in levels {
            let pos = labels
                .iter()
                .position(|l| l.as_str() == Some(name.as_str()))
                .context(UnknownFieldSnafu {
                    field: name.clone(),
                    queryables: levels.join(","),
                })?;
            arrays.push(frame.column(pos).clone());
            level_positions.push(pos);
        }
        let names = levels
            .iter()
            .enumerate()
            .map(|(i, n)| (!is_placeholder_level(n, i)).then(|| n.clone()))
            .collect();
        let keep: Vec<usize> = (0..labels.len()).filter(|p| !level_positions.contains(p)).collect();
        let index = Index::multi(arrays, names)?;
        Ok(frame.select_columns(&keep)?.with_index(index)?)
    }

    /// Apply residual filter terms, then the requested column subset.
    fn process_axes(&self, mut frame: Frame, filter: Option<&[FilterTerm]>, columns: Option<&[Label]>) -> StoreResult<Frame> {
        for term in filter.unwrap_or_default() {
            let labels = frame.columns().labels()?;
            if term.field == COLUMNS_AXIS {
                let keep: Vec<usize> = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| term.matches_label(l))
                    .map(|(i, _)| i)
                    .collect();
                frame = frame.select_columns(&keep)?;
                continue;
            }
            let keep = self.term_mask(&frame, term)?;
            let rows = UInt64Array::from_iter_values(
                keep.iter()
                    .enumerate()
                    .filter(|(_, k)| **k)
                    .map(|(i, _)| i as u64),
            );
            frame = frame.take(&rows)?;
        }

        let Some(columns) = columns else {
            return Ok(frame);
        };
        if self.table_type().is_series() {
            return Ok(frame);
        }
        let labels = frame.columns().labels()?;
        let keep: Vec<usize> = columns
            .iter()
            .filter_map(|c| labels.iter().position(|l| l == c))
            .collect();
        Ok(frame.select_columns(&keep)?)
    }

    /// Rows of `frame` that pass a residual term over a column label.
    fn term_mask(&self, frame: &Frame, term: &FilterTerm) -> StoreResult<Vec<bool>> {
        let label = Label::from(term.field.as_str());
        let Some(column) = frame.column_by_label(&label)? else {
            return UnknownFieldSnafu {
                field: term.field.clone(),
                queryables: self.queryables().keys().cloned().collect::<Vec<_>>().join(","),
            }
            .fail();
        };
        Ok(array_values(column)?
            .iter()
            .map(|v| term.matches(v.as_ref()))
            .collect())
    }

    /// Absolute coordinates of the rows matching `predicate`, ascending.
    ///
    /// Residual terms over column labels are applied by reading the
    /// candidate rows.
    pub(crate) fn select_coords(
        &self,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> StoreResult<Vec<u64>> {
        self.ensure_readable()?;
        let selection = self.selection(predicate, start, stop)?;
        let coords = selection.select_coords(&self.node)?;
        let terms: Vec<&FilterTerm> = selection
            .filter()
            .unwrap_or_default()
            .iter()
            .filter(|t| t.field != COLUMNS_AXIS)
            .collect();
        if terms.is_empty() || coords.is_empty() {
            return Ok(coords);
        }
        let batch = self.node.read_coordinates(&coords)?;
        let frame = self.decode_values(&batch, Index::range(coords.len()))?;
        let mut keep = vec![true; coords.len()];
        for term in terms {
            for (k, pass) in keep.iter_mut().zip(self.term_mask(&frame, term)?) {
                *k &= pass;
            }
        }
        Ok(coords
            .into_iter()
            .zip(keep)
            .filter(|(_, k)| *k)
            .map(|(c, _)| c)
            .collect())
    }

    /// Resolve a chunked read: the selection plus the coordinates to walk.
    pub(crate) fn plan_chunks(&self, opts: &SelectOptions) -> StoreResult<(Selection, Vec<u64>)> {
        self.ensure_readable()?;
        let selection = self.selection(opts.predicate.as_ref(), opts.start, opts.stop)?;
        let coords = selection.select_coords(&self.node)?;
        Ok((selection, coords))
    }

    /// Read one index or data column over rows `[start, stop)`.
    pub(crate) fn select_column(&self, column: &str, start: Option<i64>, stop: Option<i64>) -> StoreResult<Series> {
        self.ensure_readable()?;
        let field = self.field(column)?;
        let (start, stop) = normalize_range(self.nrows(), start, stop);
        let raw = self.node.read_column(field.cname(), start, stop)?;
        let values = match field {
            FieldRef::Index(c) => c.convert(&raw, &self.codec)?,
            FieldRef::Data(c) => c
                .convert(&raw, &self.codec)?
                .into_iter()
                .next()
                .unwrap_or(raw),
        };
        Ok(Series::from_array(values).with_name(Some(column.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_levels_match_their_position() {
        assert!(is_placeholder_level("level_0", 0));
        assert!(is_placeholder_level("level_2", 2));
        assert!(!is_placeholder_level("level_1", 0));
        assert!(!is_placeholder_level("date", 0));
    }
}
