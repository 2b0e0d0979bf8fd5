//! One-call reads and writes that open and close their own session.

use std::path::Path;

use log::debug;

use super::Store;
use crate::config::{OpenMode, PutOptions, SelectOptions, StoreOptions};
use crate::error::{KeyRequiredSnafu, NoObjectsSnafu, StoreResult};
use crate::frame::Dataset;

/// Read one object from the store at `path`.
///
/// Without a key the store must hold exactly one object, which is read;
/// an empty store reports `NoObjects` and several objects `KeyRequired`.
/// The session is opened read-only and closed before returning.
pub fn read(path: impl AsRef<Path>, key: Option<&str>, opts: SelectOptions) -> StoreResult<Dataset> {
    let path = path.as_ref();
    let mut store = Store::open(path, StoreOptions::with_mode(OpenMode::Read))?;
    let key = match key {
        Some(key) => key.to_string(),
        None => sole_key(&store)?,
    };
    let out = store.select(&key, opts);
    store.close();
    out
}

/// Write `obj` under `key` in the store at `path`, creating the store when
/// missing.
///
/// `opts.append` appends to a table; otherwise the key is replaced as with
/// [`Store::put`].
pub fn write(path: impl AsRef<Path>, key: &str, obj: impl Into<Dataset>, opts: PutOptions) -> StoreResult<()> {
    let path = path.as_ref();
    let mut store = Store::open(path, StoreOptions::with_mode(OpenMode::Append))?;
    let out = if opts.append {
        store.append(key, obj, opts)
    } else {
        store.put(key, obj, opts)
    };
    store.close();
    out
}

fn sole_key(store: &Store) -> StoreResult<String> {
    let display = store.path().display().to_string();
    let mut keys = store.keys()?;
    match keys.len() {
        0 => NoObjectsSnafu { path: display }.fail(),
        1 => {
            let key = keys.remove(0);
            debug!("reading the only object {key} in {display}");
            Ok(key)
        }
        count => KeyRequiredSnafu { path: display, count }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Format;
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
    fn keyless_read_takes_the_only_object() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("s");
        write(&path, "df", frame(4)?, PutOptions::default())?;

        let back = read(&path, None, SelectOptions::default())?;
        assert_eq!(back, Dataset::from(frame(4)?));
        Ok(())
    }

    #[test]
    fn keyless_read_needs_exactly_one_object() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("s");
        Store::open(&path, StoreOptions::default())?.close();

        let err = read(&path, None, SelectOptions::default()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotFound));

        write(&path, "a", frame(2)?, PutOptions::default())?;
        write(&path, "b", frame(2)?, PutOptions::default())?;
        let err = read(&path, None, SelectOptions::default()).err();
        assert!(matches!(err, Some(StoreError::KeyRequired { count: 2, .. })));

        assert_eq!(read(&path, Some("b"), SelectOptions::default())?.nrows(), 2);
        Ok(())
    }

    #[test]
    fn appending_writes_grow_a_table() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("s");
        let opts = PutOptions {
            append: true,
            format: Some(Format::Table),
            ..PutOptions::default()
        };
        write(&path, "t", frame(3)?, opts.clone())?;
        write(&path, "t", frame(3)?, opts)?;

        assert_eq!(read(&path, Some("t"), SelectOptions::default())?.nrows(), 6);
        Ok(())
    }

    #[test]
    fn reading_a_missing_store_fails() -> TestResult {
        let tmp = TempDir::new()?;
        let err = read(tmp.path().join("absent"), None, SelectOptions::default()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotFound));
        Ok(())
    }
}
