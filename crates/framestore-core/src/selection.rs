//! Row selection over a table node.
//!
//! A [`Selection`] resolves a predicate and a `[start, stop)` row range into
//! one of three read plans: the whole range, an explicit coordinate list, or
//! a push-down condition with optional residual filter terms.

use arrow::record_batch::RecordBatch;
use log::warn;

use crate::columns::StringCodec;
use crate::container::{Condition, TableNode};
use crate::error::{CoordinateOutOfRangeSnafu, MaskLengthSnafu, StoreResult};
use crate::expr::{Expression, FilterTerm, Predicate, Queryables};

/// Resolve `start`/`stop` against `nrows`: negative values count from the
/// end, and both ends are clamped to the table.
pub(crate) fn normalize_range(nrows: u64, start: Option<i64>, stop: Option<i64>) -> (u64, u64) {
    let resolve = |v: i64| -> u64 {
        let n = nrows as i64;
        let v = if v < 0 { v + n } else { v };
        v.clamp(0, n) as u64
    };
    let start = start.map_or(0, resolve);
    let stop = stop.map_or(nrows, resolve).max(start);
    (start, stop)
}

#[derive(Debug, Clone)]
enum Plan {
    Full,
    Coordinates(Vec<u64>),
    Condition(Option<Condition>),
}

/// A predicate resolved against one table.
#[derive(Debug, Clone)]
pub struct Selection {
    start: u64,
    stop: u64,
    plan: Plan,
    filter: Option<Vec<FilterTerm>>,
}

impl Selection {
    /// Resolve `predicate` over rows `[start, stop)` of `table`.
    ///
    /// `old_format` flags tables written by a format version that predates
    /// reliable push-down; expressions against them are evaluated anyway,
    /// with a warning.
    pub(crate) fn new(
        table: &TableNode,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
        queryables: &Queryables,
        codec: &StringCodec,
        old_format: bool,
    ) -> StoreResult<Self> {
        let nrows = table.nrows();
        let (start, stop) = normalize_range(nrows, start, stop);
        let mut filter = None;
        let plan = match predicate {
            None => Plan::Full,
            Some(Predicate::Mask(mask)) => {
                let expected = (stop - start) as usize;
                if mask.len() != expected {
                    return MaskLengthSnafu {
                        len: mask.len(),
                        expected,
                    }
                    .fail();
                }
                Plan::Coordinates(
                    mask.iter()
                        .enumerate()
                        .filter(|(_, keep)| **keep)
                        .map(|(i, _)| start + i as u64)
                        .collect(),
                )
            }
            Some(Predicate::Coordinates(coords)) => {
                let mut resolved = Vec::with_capacity(coords.len());
                for &c in coords {
                    let abs = if c < 0 { c + nrows as i64 } else { c };
                    if abs < start as i64 || abs >= stop as i64 {
                        return CoordinateOutOfRangeSnafu {
                            coordinate: c,
                            start,
                            stop,
                        }
                        .fail();
                    }
                    resolved.push(abs as u64);
                }
                Plan::Coordinates(resolved)
            }
            Some(Predicate::Expr(expr)) => {
                if old_format {
                    warn!(
                        "where criteria on [{}] runs against a table written by an old format version; \
                         copy the store to upgrade it",
                        table.path()
                    );
                }
                let (condition, residual) = Expression::bind(expr, queryables, codec)?.evaluate();
                filter = residual;
                Plan::Condition(condition)
            }
        };
        Ok(Self {
            start,
            stop,
            plan,
            filter,
        })
    }

    /// First row of the addressed range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// End of the addressed range (exclusive).
    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Residual terms to apply after reading.
    pub fn filter(&self) -> Option<&[FilterTerm]> {
        self.filter.as_deref()
    }

    /// The same selection narrowed to explicit `coords`, keeping the
    /// residual filter terms.
    pub(crate) fn chunk(&self, coords: Vec<u64>) -> Selection {
        Selection {
            start: self.start,
            stop: self.stop,
            plan: Plan::Coordinates(coords),
            filter: self.filter.clone(),
        }
    }

    /// Read the selected rows in on-disk representation.
    pub(crate) fn select(&self, table: &TableNode) -> StoreResult<RecordBatch> {
        Ok(match &self.plan {
            Plan::Coordinates(coords) => table.read_coordinates(coords)?,
            Plan::Condition(Some(condition)) => table.read_where(condition, self.start, self.stop)?,
            Plan::Full | Plan::Condition(None) => table.read(self.start, self.stop)?,
        })
    }

    /// Absolute coordinates of the selected rows, ascending.
    ///
    /// Residual filter terms are not applied. Duplicate coordinates in an
    /// explicit list are kept.
    pub(crate) fn select_coords(&self, table: &TableNode) -> StoreResult<Vec<u64>> {
        Ok(match &self.plan {
            Plan::Coordinates(coords) => {
                let mut sorted = coords.clone();
                sorted.sort_unstable();
                sorted
            }
            Plan::Condition(Some(condition)) => table.get_where_list(condition, self.start, self.stop)?,
            Plan::Full | Plan::Condition(None) => (self.start..self.stop).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::Kind;
    use crate::config::OpenMode;
    use crate::container::{Atom, ColumnType, Container, NodePath, TableField};
    use crate::error::ErrorKind;
    use crate::expr::{Expr, Queryable};
    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::Int64Type;
    use std::sync::{Arc, Mutex};
    use std::thread::ThreadId;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn hundred_rows(tmp: &TempDir) -> TestResult {
        let c = Container::open(tmp.path().join("s"), OpenMode::Append, None)?;
        let mut t = c.create_table(
            &NodePath::parse("/t/table")?,
            vec![TableField::new("index", ColumnType::scalar(Atom::Int64))],
            10_000,
            None,
        )?;
        let batch = RecordBatch::try_new(t.schema().clone(), vec![Arc::new(Int64Array::from_iter_values(0..100))])?;
        t.append(&batch)?;
        t.flush()?;
        Ok(())
    }

    fn table(tmp: &TempDir) -> Result<TableNode, Box<dyn std::error::Error>> {
        let c = Container::open(tmp.path().join("s"), OpenMode::Read, None)?;
        Ok(c.open_table(&NodePath::parse("/t/table")?)?)
    }

    fn queryables() -> Queryables {
        let mut q = Queryables::new();
        q.insert(
            "index".into(),
            Queryable::Field {
                kind: Kind::Integer,
                column_type: ColumnType::scalar(Atom::Int64),
                tz: None,
                categories: None,
            },
        );
        q
    }

    fn resolve(t: &TableNode, p: Option<Predicate>, start: Option<i64>, stop: Option<i64>) -> StoreResult<Selection> {
        Selection::new(t, p.as_ref(), start, stop, &queryables(), &StringCodec::new("nan", "UTF-8", "strict")?, false)
    }

    #[test]
    fn ranges_wrap_negative_bounds_and_clamp() {
        assert_eq!(normalize_range(100, Some(-10), None), (90, 100));
        assert_eq!(normalize_range(100, None, Some(-90)), (0, 10));
        assert_eq!(normalize_range(100, Some(150), Some(200)), (100, 100));
        assert_eq!(normalize_range(100, Some(50), Some(10)), (50, 50));
    }

    #[test]
    fn expression_pushes_down() -> TestResult {
        let tmp = TempDir::new()?;
        hundred_rows(&tmp)?;
        let t = table(&tmp)?;
        let sel = resolve(&t, Some(Expr::col("index").ge(50).into()), None, None)?;
        let rows = sel.select(&t)?;
        let got = rows.column(0).as_primitive::<Int64Type>().values().to_vec();
        assert_eq!(got, (50..100).collect::<Vec<_>>());
        assert_eq!(sel.select_coords(&t)?.len(), 50);
        Ok(())
    }

    #[test]
    fn masks_are_relative_to_start() -> TestResult {
        let tmp = TempDir::new()?;
        hundred_rows(&tmp)?;
        let t = table(&tmp)?;
        let mask = vec![true, false, true];
        let sel = resolve(&t, Some(mask.into()), Some(10), Some(13))?;
        assert_eq!(sel.select_coords(&t)?, vec![10, 12]);

        let err = resolve(&t, Some(vec![true].into()), Some(10), Some(13)).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::InvalidPredicate));
        Ok(())
    }

    #[test]
    fn coordinates_are_sorted_and_range_checked() -> TestResult {
        let tmp = TempDir::new()?;
        hundred_rows(&tmp)?;
        let t = table(&tmp)?;
        let sel = resolve(&t, Some(vec![7i64, 3, 3, -1].into()), None, None)?;
        assert_eq!(sel.select_coords(&t)?, vec![3, 3, 7, 99]);

        let err = resolve(&t, Some(vec![5i64].into()), Some(10), Some(20)).err();
        assert!(matches!(err, Some(crate::error::StoreError::CoordinateOutOfRange { coordinate: 5, .. })));
        Ok(())
    }

    // ==================== old format warning ====================

    /// Keeps warnings with the thread that emitted them.
    struct Captured(Mutex<Vec<(ThreadId, String)>>);

    impl log::Log for Captured {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record<'_>) {
            if self.enabled(record.metadata()) {
                if let Ok(mut records) = self.0.lock() {
                    records.push((std::thread::current().id(), record.args().to_string()));
                }
            }
        }

        fn flush(&self) {}
    }

    static CAPTURED: Captured = Captured(Mutex::new(Vec::new()));

    fn warnings_on_this_thread() -> Vec<String> {
        let me = std::thread::current().id();
        CAPTURED
            .0
            .lock()
            .map(|r| r.iter().filter(|(t, _)| *t == me).map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn old_format_tables_warn_but_still_select() -> TestResult {
        let _ = log::set_logger(&CAPTURED);
        log::set_max_level(log::LevelFilter::Warn);
        let tmp = TempDir::new()?;
        hundred_rows(&tmp)?;
        let t = table(&tmp)?;
        let codec = StringCodec::new("nan", "UTF-8", "strict")?;
        let expr: Predicate = Expr::col("index").lt(3).into();

        Selection::new(&t, Some(&expr), None, None, &queryables(), &codec, false)?;
        assert!(warnings_on_this_thread().is_empty());

        let sel = Selection::new(&t, Some(&expr), None, None, &queryables(), &codec, true)?;
        let warnings = warnings_on_this_thread();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("old format version"));
        assert!(warnings[0].contains("/t/table"));
        assert_eq!(sel.select_coords(&t)?, vec![0, 1, 2]);

        // only predicates warn
        Selection::new(&t, None, None, None, &queryables(), &codec, true)?;
        assert_eq!(warnings_on_this_thread().len(), 1);
        Ok(())
    }
}
