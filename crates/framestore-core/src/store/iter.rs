//! Chunked reads over a table.

use log::debug;

use super::Store;
use crate::config::{DEFAULT_CHUNKSIZE, SelectOptions};
use crate::error::StoreResult;
use crate::frame::{Dataset, Label};
use crate::selection::Selection;
use crate::table::Table;

/// Lazy, chunked read of one table selection.
///
/// The matching coordinates are resolved up front; each step reads the
/// next `chunksize` of them and yields the rows that survive any residual
/// filter. Empty chunks are skipped. The sequence ends after the last
/// coordinate and is not restartable.
///
/// With `auto_close` the owning store is closed when the iterator is
/// exhausted, closed early with [`TableIterator::close`], or dropped.
#[derive(Debug)]
pub struct TableIterator<'a> {
    store: &'a mut Store,
    table: Table,
    selection: Selection,
    coords: Vec<u64>,
    columns: Option<Vec<Label>>,
    chunksize: usize,
    pos: usize,
    auto_close: bool,
}

impl<'a> TableIterator<'a> {
    pub(crate) fn new(store: &'a mut Store, table: Table, opts: SelectOptions) -> StoreResult<Self> {
        let (selection, coords) = table.plan_chunks(&opts)?;
        debug!(
            "iterating {} coordinates of {} in chunks of {}",
            coords.len(),
            table.group(),
            opts.chunksize.unwrap_or(DEFAULT_CHUNKSIZE)
        );
        Ok(Self {
            store,
            table,
            selection,
            coords,
            columns: opts.columns,
            chunksize: opts.chunksize.unwrap_or(DEFAULT_CHUNKSIZE).max(1),
            pos: 0,
            auto_close: opts.auto_close,
        })
    }

    /// Number of coordinates the iteration walks.
    pub fn coordinates(&self) -> usize {
        self.coords.len()
    }

    /// Stop iterating, closing the store when `auto_close` was requested.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.pos = self.coords.len();
        if self.auto_close {
            self.store.close();
        }
    }
}

impl Iterator for TableIterator<'_> {
    type Item = StoreResult<Dataset>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.coords.len() {
            let end = (self.pos + self.chunksize).min(self.coords.len());
            let chunk = self.coords[self.pos..end].to_vec();
            self.pos = end;
            match self
                .table
                .read_selection(&self.selection.chunk(chunk), self.columns.as_deref())
            {
                Ok(obj) if obj.is_empty() => continue,
                other => return Some(other),
            }
        }
        self.finish();
        None
    }
}

impl Drop for TableIterator<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{PutOptions, SelectOptions, StoreOptions};
    use crate::expr::Expr;
    use crate::frame::{Frame, Index};
    use crate::store::Store;
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn chunks_cover_the_selection_and_auto_close() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        let a: ArrayRef = Arc::new(Int64Array::from_iter_values(0..25));
        store.append("t", Frame::from_columns(Index::range(25), [("a", a)])?, PutOptions::default())?;

        let opts = SelectOptions {
            auto_close: true,
            ..SelectOptions::matching(Expr::col("index").ge(5)).chunked(7)
        };
        let sizes = store
            .select_chunks("t", opts)?
            .map(|chunk| chunk.map(|c| c.nrows()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(sizes, vec![7, 7, 6]);
        assert!(!store.is_open());
        Ok(())
    }

    #[test]
    fn dropping_without_auto_close_keeps_the_store_open() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        let a: ArrayRef = Arc::new(Int64Array::from_iter_values(0..10));
        store.append("t", Frame::from_columns(Index::range(10), [("a", a)])?, PutOptions::default())?;

        let mut chunks = store.select_chunks("t", SelectOptions::default().chunked(3))?;
        assert_eq!(chunks.coordinates(), 10);
        assert!(chunks.next().is_some());
        chunks.close();
        assert!(store.is_open());
        Ok(())
    }
}
