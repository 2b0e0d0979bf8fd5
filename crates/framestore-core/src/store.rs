//! The store: a session over one container, addressed by hierarchical keys.
//!
//! Every key names one stored object. [`Store`] resolves the key to a
//! [`Storer`] from the object's persisted type tags and dispatches reads
//! and writes to it. Writes default to the fixed layout for `put` and the
//! table layout for `append`; the store-wide [`WriteDefaults`] apply when a
//! call leaves the format or `dropna` unset.
//!
//! [`WriteDefaults`]: crate::config::WriteDefaults

mod copy;
mod iter;
mod multiple;
mod oneshot;

use std::path::{Path, PathBuf};

use log::debug;
use snafu::prelude::*;

pub use iter::TableIterator;
pub use multiple::ColumnSpec;
pub use oneshot::{read, write};

use crate::config::{Format, IndexOptions, OpenMode, PutOptions, SelectOptions, StoreOptions};
use crate::container::{Container, Filters, NodeKind, NodePath};
use crate::error::{
    AppendToFixedSnafu, ClosedSnafu, KeyNotFoundSnafu, PossibleDataLossSnafu, StoreResult, UnsupportedSnafu,
};
use crate::expr::Predicate;
use crate::fixed::FixedStorer;
use crate::frame::{Dataset, Series};
use crate::storer::{Storer, StorerKind};
use crate::table::Table;

/// One level of [`Store::walk`]: a plain group, its plain child groups and
/// the objects directly beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Group path.
    pub path: String,
    /// Names of child groups that are not objects.
    pub groups: Vec<String>,
    /// Names of stored objects in the group.
    pub leaves: Vec<String>,
}

/// An open (or closed) session over one container directory.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    options: StoreOptions,
    container: Option<Container>,
}

impl Store {
    /// Open the store at `path`.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> StoreResult<Self> {
        let mut store = Self {
            path: path.into(),
            options,
            container: None,
        };
        store.connect()?;
        Ok(store)
    }

    fn connect(&mut self) -> StoreResult<()> {
        let filters = Filters::from_options(self.options.complib, self.options.complevel);
        self.container = Some(Container::open(&self.path, self.options.mode, filters)?);
        debug!("opened {} in mode {}", self.path.display(), self.options.mode);
        Ok(())
    }

    /// Reopen the session with `mode`; a no-op when it is already open in
    /// that mode.
    ///
    /// Reopening an open session in `w` mode would truncate the container
    /// under the caller and is refused.
    pub fn reopen(&mut self, mode: OpenMode) -> StoreResult<()> {
        if self.is_open() && mode == self.options.mode {
            return Ok(());
        }
        if self.is_open() && mode == OpenMode::Write {
            return PossibleDataLossSnafu {
                path: self.path.display().to_string(),
                mode: mode.as_str(),
            }
            .fail();
        }
        self.close();
        self.options.mode = mode;
        self.connect()
    }

    /// Close the session. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.container.take().is_some() {
            debug!("closed {}", self.path.display());
        }
    }

    /// True while the session is open.
    pub fn is_open(&self) -> bool {
        self.container.is_some()
    }

    /// Ensure everything written so far is durable.
    ///
    /// Writes are flushed as they happen; this only checks the session.
    pub fn flush(&self) -> StoreResult<()> {
        self.container().map(|_| ())
    }

    /// Container directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode of the current session.
    pub fn mode(&self) -> OpenMode {
        self.options.mode
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub(crate) fn container(&self) -> StoreResult<&Container> {
        self.container.as_ref().context(ClosedSnafu {
            path: self.path.display().to_string(),
        })
    }

    fn storer(&self, key: &str) -> StoreResult<Storer> {
        let path = NodePath::parse(key)?;
        Storer::load(self.container()?, &path)?.context(KeyNotFoundSnafu {
            key: path.to_string(),
        })
    }

    fn table(&self, key: &str, action: &str) -> StoreResult<Table> {
        match self.storer(key)? {
            Storer::Table(t) => Ok(t),
            Storer::Fixed(_) => UnsupportedSnafu {
                message: format!("can only {action} a table; [{key}] is stored in the fixed format"),
            }
            .fail(),
        }
    }

    // ===== discovery =====

    /// Stored objects with their storer kinds, depth first in name order.
    pub fn groups(&self) -> StoreResult<Vec<(String, StorerKind)>> {
        let container = self.container()?;
        let mut out = Vec::new();
        for entry in self.walk(None)? {
            for leaf in entry.leaves {
                let key = child_key(&entry.path, &leaf);
                if let Some(kind) = Storer::probe(container, &NodePath::parse(&key)?)? {
                    out.push((key, kind));
                }
            }
        }
        Ok(out)
    }

    /// Every stored object with its storer, in [`Store::groups`] order.
    pub fn items(&self) -> StoreResult<Vec<(String, Storer)>> {
        let container = self.container()?;
        let mut out = Vec::new();
        for (key, _) in self.groups()? {
            if let Some(storer) = Storer::load(container, &NodePath::parse(&key)?)? {
                out.push((key, storer));
            }
        }
        Ok(out)
    }

    /// Kind of the raw container node at `key`, object or not.
    pub fn get_node(&self, key: &str) -> StoreResult<Option<NodeKind>> {
        Ok(self.container()?.node_kind(&NodePath::parse(key)?)?)
    }

    /// Absolute keys of every stored object.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.groups()?.into_iter().map(|(key, _)| key).collect())
    }

    /// True when an object is stored under `key`.
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        let path = NodePath::parse(key)?;
        Ok(Storer::probe(self.container()?, &path)?.is_some())
    }

    /// Number of stored objects.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }

    /// True when the store holds no objects.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Walk the plain groups beneath `root` (default `/`), parents first.
    pub fn walk(&self, root: Option<&str>) -> StoreResult<Vec<WalkEntry>> {
        let container = self.container()?;
        let mut pending = vec![NodePath::parse(root.unwrap_or("/"))?];
        let mut out = Vec::new();
        while let Some(path) = pending.pop() {
            let mut entry = WalkEntry {
                path: path.to_string(),
                groups: Vec::new(),
                leaves: Vec::new(),
            };
            let mut subgroups = Vec::new();
            for (name, kind) in container.children(&path)? {
                let child = path.join(&name)?;
                if Storer::probe(container, &child)?.is_some() {
                    entry.leaves.push(name);
                } else if kind == NodeKind::Group {
                    entry.groups.push(name);
                    subgroups.push(child);
                }
            }
            pending.extend(subgroups.into_iter().rev());
            out.push(entry);
        }
        Ok(out)
    }

    /// Human-readable summary: the path, then one line per object.
    pub fn info(&self) -> StoreResult<String> {
        let mut out = format!("File path: {}\n", self.path.display());
        let Some(container) = &self.container else {
            out.push_str("File is CLOSED");
            return Ok(out);
        };
        let keys = self.keys()?;
        if keys.is_empty() {
            out.push_str("Empty");
            return Ok(out);
        }
        for key in keys {
            let path = NodePath::parse(&key)?;
            let line = match Storer::load(container, &path)? {
                Some(storer) => storer.describe(container)?,
                None => continue,
            };
            out.push_str(&format!("{key:<24}{line}\n"));
        }
        Ok(out)
    }

    /// Storer of the object under `key`, or `None` when there is none.
    pub fn get_storer(&self, key: &str) -> StoreResult<Option<Storer>> {
        Storer::load(self.container()?, &NodePath::parse(key)?)
    }

    // ===== writes =====

    /// Store `obj` under `key`, replacing what is there unless
    /// `opts.append` is set.
    ///
    /// The fixed layout is the default; appending and compression options
    /// need the table layout.
    pub fn put(&mut self, key: &str, obj: impl Into<Dataset>, opts: PutOptions) -> StoreResult<()> {
        let format = opts
            .format
            .or(self.options.defaults.format)
            .unwrap_or(Format::Fixed);
        if format == Format::Fixed {
            ensure!(!opts.append, AppendToFixedSnafu);
            ensure!(
                opts.complib.is_none() && opts.complevel.is_none(),
                UnsupportedSnafu {
                    message: "compression is not supported on fixed format stores",
                }
            );
        }
        let append = opts.append;
        self.write_to(key, &obj.into(), format, &opts, append)
    }

    /// Append `obj` to the table under `key`, creating it when missing.
    pub fn append(&mut self, key: &str, obj: impl Into<Dataset>, opts: PutOptions) -> StoreResult<()> {
        let format = opts
            .format
            .or(self.options.defaults.format)
            .unwrap_or(Format::Table);
        ensure!(format == Format::Table, AppendToFixedSnafu);
        self.write_to(key, &obj.into(), format, &opts, true)
    }

    fn write_to(&self, key: &str, obj: &Dataset, format: Format, opts: &PutOptions, append: bool) -> StoreResult<()> {
        let path = NodePath::parse(key)?;
        let container = self.container()?;
        if format == Format::Table && obj.is_empty() {
            debug!("skipping empty write to {path}");
            return Ok(());
        }
        let existing = Storer::load(container, &path)?;
        let existing = match (existing, append) {
            (Some(_), false) => {
                container.remove_node(&path)?;
                None
            }
            (existing, _) => existing,
        };
        match format {
            Format::Fixed => {
                FixedStorer::write(container, &path, obj, None)?;
            }
            Format::Table => {
                let existing = match existing {
                    Some(Storer::Table(t)) => Some(t),
                    Some(Storer::Fixed(_)) => return AppendToFixedSnafu.fail(),
                    None => None,
                };
                let dropna = opts.dropna.unwrap_or(self.options.defaults.dropna);
                Table::write(container, &path, obj, opts, dropna, existing)?;
            }
        }
        Ok(())
    }

    // ===== reads =====

    /// Read the whole object under `key`.
    pub fn get(&self, key: &str) -> StoreResult<Dataset> {
        self.select(key, SelectOptions::default())
    }

    /// Read the rows and columns addressed by `opts`.
    ///
    /// Predicates and column subsets need the table layout; a row range
    /// works on both layouts.
    pub fn select(&self, key: &str, opts: SelectOptions) -> StoreResult<Dataset> {
        match self.storer(key)? {
            Storer::Fixed(f) => f.read(self.container()?, &opts),
            Storer::Table(t) => t.read(&opts),
        }
    }

    /// Iterate the selection in chunks of `opts.chunksize` rows.
    ///
    /// With `opts.auto_close` the store is closed once the iterator is
    /// exhausted or dropped.
    pub fn select_chunks(&mut self, key: &str, opts: SelectOptions) -> StoreResult<TableIterator<'_>> {
        let table = self.table(key, "iterate over")?;
        TableIterator::new(self, table, opts)
    }

    /// Coordinates of the rows matching `predicate`.
    pub fn select_as_coordinates(
        &self,
        key: &str,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> StoreResult<Vec<u64>> {
        self.table(key, "read coordinates from")?
            .select_coords(predicate, start, stop)
    }

    /// Read one index column or data column.
    pub fn select_column(&self, key: &str, column: &str, start: Option<i64>, stop: Option<i64>) -> StoreResult<Series> {
        self.table(key, "select a column from")?
            .select_column(column, start, stop)
    }

    // ===== maintenance =====

    /// Remove the object under `key`, or rows of its table.
    ///
    /// With neither a predicate nor a range the whole object is removed and
    /// `None` is returned; otherwise the number of removed rows.
    pub fn remove(
        &mut self,
        key: &str,
        predicate: Option<&Predicate>,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> StoreResult<Option<u64>> {
        let path = NodePath::parse(key)?;
        let storer = self.storer(key)?;
        if predicate.is_none() && start.is_none() && stop.is_none() {
            self.container()?.remove_node(&path)?;
            debug!("removed {path}");
            return Ok(None);
        }
        match storer {
            Storer::Fixed(_) => UnsupportedSnafu {
                message: format!("cannot remove rows from [{path}]; it is stored in the fixed format"),
            }
            .fail(),
            Storer::Table(mut t) => Ok(Some(t.delete(predicate, start, stop)?)),
        }
    }

    /// Build secondary indexes on a table.
    pub fn create_table_index(&mut self, key: &str, opts: IndexOptions) -> StoreResult<()> {
        self.table(key, "create an index on")?
            .create_index(opts.columns.as_deref(), opts.kind, opts.optlevel)
    }
}

fn child_key(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenMode;
    use crate::error::{ErrorKind, StoreError};
    use crate::frame::{Frame, Index};
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn frame(n: i64) -> Result<Frame, Box<dyn std::error::Error>> {
        let a: ArrayRef = Arc::new(Int64Array::from_iter_values(0..n));
        Ok(Frame::from_columns(Index::range(n as usize), [("a", a)])?)
    }

    #[test]
    fn keys_skip_plain_groups_and_side_tables() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        store.put("df", frame(3)?, PutOptions::default())?;
        store.append("grp/sub/t", frame(3)?, PutOptions::default())?;

        assert_eq!(store.keys()?, vec!["/df".to_string(), "/grp/sub/t".to_string()]);
        assert!(store.contains("/grp/sub/t")?);
        assert!(!store.contains("grp")?);
        let walk = store.walk(None)?;
        assert_eq!(walk[0].leaves, vec!["df".to_string()]);
        assert_eq!(walk[0].groups, vec!["grp".to_string()]);
        Ok(())
    }

    #[test]
    fn items_pair_keys_with_storers_and_nodes_are_raw() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        store.put("df", frame(3)?, PutOptions::default())?;
        store.append("grp/t", frame(3)?, PutOptions::default())?;

        let items: Vec<(String, StorerKind)> = store.items()?.into_iter().map(|(k, s)| (k, s.kind())).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "/df");
        assert!(matches!(items[1].1, StorerKind::Table(_)));

        assert_eq!(store.get_node("grp")?, Some(NodeKind::Group));
        assert_eq!(store.get_node("/grp/t/table")?, Some(NodeKind::Table));
        assert_eq!(store.get_node("nope")?, None);
        Ok(())
    }

    #[test]
    fn closed_store_reports_resource_state() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        store.close();
        let err = store.keys().err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::ResourceState));
        assert!(store.info()?.ends_with("File is CLOSED"));
        Ok(())
    }

    #[test]
    fn reopen_in_write_mode_is_refused() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        assert!(matches!(
            store.reopen(OpenMode::Write),
            Err(StoreError::PossibleDataLoss { .. })
        ));
        store.reopen(OpenMode::Read)?;
        assert_eq!(store.mode(), OpenMode::Read);
        Ok(())
    }

    #[test]
    fn fixed_layout_rejects_append_and_compression() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        let opts = PutOptions {
            append: true,
            ..PutOptions::default()
        };
        assert!(matches!(store.put("df", frame(2)?, opts), Err(StoreError::AppendToFixed)));
        let opts = PutOptions {
            format: Some(Format::Fixed),
            ..PutOptions::default()
        };
        assert!(matches!(store.append("df", frame(2)?, opts), Err(StoreError::AppendToFixed)));
        let opts = PutOptions {
            complevel: Some(5),
            ..PutOptions::default()
        };
        assert_eq!(
            store.put("df", frame(2)?, opts).err().map(|e| e.kind()),
            Some(ErrorKind::UnsupportedOperation)
        );
        Ok(())
    }

    #[test]
    fn remove_without_selection_drops_the_object() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        store.append("t", frame(10)?, PutOptions::default())?;
        assert_eq!(store.remove("t", None, Some(2), Some(5))?, Some(3));
        assert_eq!(store.get("t")?.nrows(), 7);
        assert_eq!(store.remove("t", None, None, None)?, None);
        assert!(matches!(store.remove("t", None, None, None), Err(StoreError::KeyNotFound { .. })));
        Ok(())
    }

    #[test]
    fn empty_table_writes_are_skipped() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = Store::open(tmp.path().join("s"), StoreOptions::default())?;
        store.append("t", frame(0)?, PutOptions::default())?;
        assert!(!store.contains("t")?);
        Ok(())
    }
}
