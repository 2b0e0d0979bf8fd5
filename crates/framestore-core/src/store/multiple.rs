//! Frames split across several tables that share row positions.

use arrow::array::UInt64Array;
use snafu::prelude::*;

use super::Store;
use crate::config::{PutOptions, SelectOptions};
use crate::error::{RowCountMismatchSnafu, StoreResult, UnsupportedSnafu};
use crate::expr::Predicate;
use crate::frame::{Dataset, Frame, Index, Label, is_missing};

/// Columns routed to one table by [`Store::append_to_multiple`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    /// These labels.
    Columns(Vec<Label>),
    /// Every label no other table claims.
    Remaining,
}

fn positions(labels: &[Label], wanted: &[Label]) -> Vec<usize> {
    wanted
        .iter()
        .filter_map(|w| labels.iter().position(|l| l == w))
        .collect()
}

impl Store {
    /// Split `frame` by column across the tables in `spec` and append each
    /// part.
    ///
    /// At most one table may take the [`ColumnSpec::Remaining`] columns.
    /// Data columns and `min_itemsize` settings in `opts` apply to the
    /// `selector` table only. With `dropna`, rows missing in every column of
    /// any one part are dropped from all parts so the tables stay aligned.
    pub fn append_to_multiple(
        &mut self,
        spec: &[(String, ColumnSpec)],
        frame: &Frame,
        selector: &str,
        opts: PutOptions,
        dropna: bool,
    ) -> StoreResult<()> {
        let remaining = spec.iter().filter(|(_, c)| *c == ColumnSpec::Remaining).count();
        ensure!(
            remaining <= 1,
            UnsupportedSnafu {
                message: "append_to_multiple can only have one table that takes the remaining columns",
            }
        );
        ensure!(
            spec.iter().any(|(k, _)| k == selector),
            UnsupportedSnafu {
                message: format!("append_to_multiple requires the selector [{selector}] to be one of the tables"),
            }
        );

        let labels = frame.columns().labels()?;
        let claimed: Vec<Label> = spec
            .iter()
            .filter_map(|(_, c)| match c {
                ColumnSpec::Columns(cols) => Some(cols.iter().cloned()),
                ColumnSpec::Remaining => None,
            })
            .flatten()
            .collect();
        let parts: Vec<(&str, Vec<usize>)> = spec
            .iter()
            .map(|(key, cols)| {
                let picked = match cols {
                    ColumnSpec::Columns(cols) => positions(&labels, cols),
                    ColumnSpec::Remaining => (0..labels.len()).filter(|p| !claimed.contains(&labels[*p])).collect(),
                };
                (key.as_str(), picked)
            })
            .collect();

        let mut frame = frame.clone();
        if dropna {
            let keep: Vec<u64> = (0..frame.nrows())
                .filter(|row| {
                    parts.iter().all(|(_, cols)| {
                        cols.is_empty() || cols.iter().any(|c| !is_missing(frame.column(*c), *row))
                    })
                })
                .map(|row| row as u64)
                .collect();
            if keep.len() < frame.nrows() {
                frame = frame.take(&UInt64Array::from(keep))?;
            }
        }

        for (key, cols) in parts {
            let part = frame.select_columns(&cols)?;
            let mut part_opts = opts.clone();
            if key != selector {
                part_opts.data_columns = None;
                part_opts.min_itemsize = part_opts.min_itemsize.map(|m| {
                    m.into_iter()
                        .filter(|(name, _)| {
                            cols.iter().any(|c| labels[*c].as_str() == Some(name.as_str()))
                        })
                        .collect()
                });
            }
            part_opts.dropna = Some(false);
            self.append(key, part, part_opts)?;
        }
        Ok(())
    }

    /// Read several tables with equal row counts as one frame.
    ///
    /// Rows are chosen by evaluating `opts.predicate` against `selector`
    /// (default: the first key); the same rows are read from every table and
    /// their columns concatenated in key order.
    pub fn select_as_multiple(&self, keys: &[&str], selector: Option<&str>, opts: SelectOptions) -> StoreResult<Frame> {
        let Some(first) = keys.first() else {
            return UnsupportedSnafu {
                message: "select_as_multiple needs at least one key",
            }
            .fail();
        };
        let selector = selector.unwrap_or(first);

        let tables = keys
            .iter()
            .map(|k| self.table(k, "select as multiple from"))
            .collect::<StoreResult<Vec<_>>>()?;
        let nrows = tables[0].nrows();
        ensure!(tables.iter().all(|t| t.nrows() == nrows), RowCountMismatchSnafu);

        let coords = self
            .table(selector, "select as multiple from")?
            .select_coords(opts.predicate.as_ref(), opts.start, opts.stop)?;
        let rows = SelectOptions {
            predicate: Some(Predicate::Coordinates(coords.iter().map(|&c| c as i64).collect())),
            columns: opts.columns.clone(),
            ..SelectOptions::default()
        };

        let mut index = None;
        let mut labels = Vec::new();
        let mut data = Vec::new();
        for table in &tables {
            let frame = match table.read(&rows)? {
                Dataset::Frame(f) => f,
                Dataset::Series(s) => s.to_frame(s.name().unwrap_or("values")),
            };
            let (idx, columns, arrays) = frame.into_parts();
            index.get_or_insert(idx);
            labels.extend(columns.labels()?);
            data.extend(arrays);
        }
        let index = index.unwrap_or_else(|| Index::range(0));
        Ok(Frame::new(index, Index::from_labels(&labels)?, data)?)
    }
}
