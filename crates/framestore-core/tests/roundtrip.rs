#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use common::*;
use framestore_core::config::{Format, PutOptions};
use framestore_core::error::{ErrorKind, StoreError};
use framestore_core::frame::{Dataset, Frame, Index, Series};
use framestore_core::storer::StorerKind;
use framestore_core::table::TableType;
use tempfile::TempDir;

fn table_format() -> PutOptions {
    PutOptions {
        format: Some(Format::Table),
        ..PutOptions::default()
    }
}

// ==================== both layouts ====================

#[test]
fn table_roundtrip_preserves_every_kind() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = mixed_frame()?;

    store.put("mixed", frame.clone(), table_format())?;

    let back = store.get("mixed")?;
    assert_eq!(back, Dataset::from(frame));
    Ok(())
}

#[test]
fn fixed_roundtrip_preserves_every_kind() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    // everything but the categorical
    let frame = mixed_frame()?.select_columns(&[0, 1, 2, 3, 4, 5, 7])?;

    store.put("mixed", frame.clone(), PutOptions::default())?;

    assert_eq!(store.get("mixed")?, Dataset::from(frame));
    Ok(())
}

#[test]
fn fixed_rejects_categoricals() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = Frame::from_columns(Index::range(2), [("c", categorical(&["a", "b"], &["a", "b"])?)])?;

    let err = store.put("c", frame, PutOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::CategoricalFixed { .. }));
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    Ok(())
}

#[test]
fn named_series_roundtrip_in_both_layouts() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let values: ArrayRef = Arc::new(Float64Array::from(vec![1.5, 2.5, 3.5]));
    let series = Series::new(Index::named(ints([10, 20, 30]), "t"), values)?.with_name(Some("px".into()));

    store.put("fixed", series.clone(), PutOptions::default())?;
    store.put("table", series.clone(), table_format())?;

    assert_eq!(store.get("fixed")?.as_series(), Some(&series));
    assert_eq!(store.get("table")?.as_series(), Some(&series));
    assert_eq!(store.get_storer("table")?.map(|s| s.kind()), Some(StorerKind::Table(TableType::AppendableSeries)));
    Ok(())
}

#[test]
fn multi_level_rows_roundtrip_as_table() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let index = Index::multi(
        vec![strings(&["a", "a", "b", "b"]), ints([1, 2, 1, 2])],
        vec![Some("sym".into()), None],
    )?;
    let frame = Frame::from_columns(index, [("px", floats([1.0, 2.0, 3.0, 4.0]))])?;

    store.append("mi", frame.clone(), PutOptions::default())?;

    let back = store.get("mi")?;
    assert_eq!(back.index().names(), &[Some("sym".to_string()), None]);
    assert_eq!(back, Dataset::from(frame));
    Ok(())
}

// ==================== zero-length axes ====================

#[test]
fn zero_length_fixed_frame_roundtrips() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = Frame::from_columns(Index::range(0), [("a", ints([])), ("b", floats([]))])?;

    store.put("empty", frame.clone(), PutOptions::default())?;

    let back = store.get("empty")?;
    assert_eq!(back.nrows(), 0);
    assert_eq!(back.as_frame().map(Frame::ncols), Some(2));
    Ok(())
}

#[test]
fn zero_column_fixed_frame_roundtrips() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = Frame::from_columns::<&str>(Index::range(3), [])?;

    store.put("nocols", frame, PutOptions::default())?;

    let back = store.get("nocols")?;
    assert_eq!(back.nrows(), 3);
    assert_eq!(back.as_frame().map(Frame::ncols), Some(0));
    Ok(())
}

#[test]
fn zero_length_table_write_is_skipped() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = Frame::from_columns(Index::range(0), [("a", ints([]))])?;

    store.append("empty", frame, PutOptions::default())?;

    assert!(!store.contains("empty")?);
    Ok(())
}

// ==================== strings ====================

#[test]
fn missing_strings_use_the_nan_sentinel() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let s: ArrayRef = Arc::new(StringArray::from(vec![Some("x"), None, Some("zz")]));
    let frame = Frame::from_columns(Index::range(3), [("s", s.clone())])?;

    store.append(
        "s",
        frame,
        PutOptions {
            nan_rep: Some("<na>".into()),
            ..PutOptions::default()
        },
    )?;

    let back = store.get("s")?.into_frame().ok_or("not a frame")?;
    assert_eq!(back.column(0), &s);
    Ok(())
}
