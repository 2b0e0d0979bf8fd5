//! Copying a store's objects into a new container.

use std::path::PathBuf;

use log::debug;

use super::Store;
use crate::config::{CopyOptions, DataColumns, MinItemsize, PutOptions, SelectOptions, StoreOptions};
use crate::container::NodePath;
use crate::error::StoreResult;
use crate::storer::Storer;
use crate::table::{Table, TableType};

/// Settings that reproduce a table's layout when its rows are re-appended.
fn table_put_options(table: &Table) -> PutOptions {
    let attrs = table.attrs();
    let mut min_itemsize = MinItemsize::new();
    for col in table.index_axes() {
        if let Some(size) = col.itemsize() {
            min_itemsize.insert(col.cname.clone(), size);
        }
    }
    for col in table.values_axes() {
        let Some(size) = col.itemsize() else { continue };
        let key = if col.data_indexable {
            col.cname.clone()
        } else {
            "values".to_string()
        };
        let slot = min_itemsize.entry(key).or_insert(size);
        *slot = (*slot).max(size);
    }
    PutOptions {
        data_columns: Some(DataColumns::Named(attrs.data_columns.clone())),
        min_itemsize: (!min_itemsize.is_empty()).then_some(min_itemsize),
        nan_rep: Some(attrs.nan_rep.clone()),
        encoding: attrs.encoding.clone(),
        errors: Some(attrs.errors.clone()),
        index: Some(false),
        dropna: Some(false),
        ..PutOptions::default()
    }
}

impl Store {
    /// Copy objects into the store at `dest` and return it open.
    ///
    /// Tables are re-selected and re-appended with their data columns,
    /// string sizes and encoding; with `propindexes` their indexes are
    /// rebuilt with the same settings. Fixed objects are re-put. Generic
    /// and write-once tables are skipped.
    pub fn copy(&self, dest: impl Into<PathBuf>, opts: CopyOptions) -> StoreResult<Store> {
        let mut out = Store::open(
            dest,
            StoreOptions {
                mode: opts.mode,
                complib: opts.complib,
                complevel: opts.complevel,
                ..self.options.clone()
            },
        )?;
        let keys = match &opts.keys {
            Some(keys) => keys
                .iter()
                .map(|k| NodePath::parse(k).map(|p| p.to_string()))
                .collect::<Result<Vec<_>, _>>()?,
            None => self.keys()?,
        };
        for key in keys {
            let storer = self.storer(&key)?;
            if out.contains(&key)? {
                if !opts.overwrite {
                    debug!("keeping existing {key} in {}", out.path().display());
                    continue;
                }
                out.remove(&key, None, None, None)?;
            }
            match storer {
                Storer::Fixed(f) => {
                    let obj = f.read(self.container()?, &SelectOptions::default())?;
                    out.put(&key, obj, PutOptions::default())?;
                }
                Storer::Table(t) => {
                    if matches!(t.table_type(), TableType::GenericTable | TableType::Worm) {
                        debug!("skipping {} {key}", t.table_type());
                        continue;
                    }
                    let obj = t.read(&SelectOptions::default())?;
                    out.append(&key, obj, table_put_options(&t))?;
                    if opts.propindexes {
                        let mut copied = out.table(&key, "index")?;
                        for (column, spec) in t.indexed_columns() {
                            copied.create_index(Some(std::slice::from_ref(&column)), spec.kind, spec.optlevel)?;
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}
