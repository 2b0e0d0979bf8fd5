#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use common::*;
use framestore_core::config::{DataColumns, MinItemsize, PutOptions};
use framestore_core::error::{ErrorKind, StoreError};
use framestore_core::frame::{Frame, Index};
use framestore_core::storer::Storer;
use tempfile::TempDir;

fn shifted(n: usize, offset: i64) -> TestResult<Frame> {
    let frame = int_frame(n)?;
    Ok(frame.with_index(Index::new(ints(offset..offset + n as i64)))?)
}

// ==================== row counts and schema ====================

#[test]
fn appends_add_rows_and_keep_schema() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;

    store.append("t", shifted(10, 0)?, PutOptions::default())?;
    let Some(Storer::Table(before)) = store.get_storer("t")? else {
        return Err("expected a table".into());
    };
    store.append("t", shifted(5, 10)?, PutOptions::default())?;
    store.append("t", shifted(7, 15)?, PutOptions::default())?;

    let Some(Storer::Table(after)) = store.get_storer("t")? else {
        return Err("expected a table".into());
    };
    assert_eq!(after.nrows(), 22);
    assert_eq!(after.labels(), before.labels());
    assert_eq!(after.values_axes(), before.values_axes());
    assert_eq!(store.get("t")?.index().level(0), &ints(0..22));
    Ok(())
}

#[test]
fn append_reorders_columns_to_the_persisted_order() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(3)?, PutOptions::default())?;

    let swapped = Frame::from_columns(Index::range(2), [("b", floats([7.0, 8.0])), ("a", ints([5, 6]))])?;
    store.append("t", swapped, PutOptions::default())?;

    let back = store.get("t")?.into_frame().ok_or("not a frame")?;
    assert_eq!(back.column(0), &ints([0, 1, 2, 5, 6]));
    assert_eq!(back.column(1), &floats([0.0, 1.0, 2.0, 7.0, 8.0]));
    Ok(())
}

#[test]
fn dtype_conflict_leaves_table_unmodified() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(4)?, PutOptions::default())?;
    let before = store.get("t")?;

    let clash = Frame::from_columns(Index::range(2), [("a", floats([0.5, 1.5])), ("b", floats([1.0, 2.0]))])?;
    let err = store.append("t", clash, PutOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    assert_eq!(store.get("t")?, before);
    Ok(())
}

#[test]
fn unknown_columns_are_rejected() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(4)?, PutOptions::default())?;

    let extra = Frame::from_columns(
        Index::range(1),
        [("a", ints([1])), ("b", floats([1.0])), ("c", floats([2.0]))],
    )?;
    let err = store.append("t", extra, PutOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    assert_eq!(store.get("t")?.nrows(), 4);
    Ok(())
}

// ==================== strings ====================

fn string_frame(values: &[&str]) -> TestResult<Frame> {
    let s: ArrayRef = Arc::new(StringArray::from(values.to_vec()));
    Ok(Frame::from_columns(Index::range(values.len()), [("s", s)])?)
}

#[test]
fn wider_strings_overflow_the_persisted_width() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", string_frame(&["abcde", "ab"])?, PutOptions::default())?;

    let err = store
        .append("t", string_frame(&["abcdefghij"])?, PutOptions::default())
        .unwrap_err();

    assert!(matches!(err, StoreError::StringTooNarrow { required: 10, limit: 5, .. }));
    assert_eq!(store.get("t")?.nrows(), 2);
    Ok(())
}

#[test]
fn min_itemsize_reserves_room_for_wider_strings() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let opts = PutOptions {
        min_itemsize: Some(MinItemsize::from([("s".to_string(), 10)])),
        ..PutOptions::default()
    };
    store.append("t", string_frame(&["abcde"])?, opts)?;
    store.append("t", string_frame(&["abcdefghij"])?, PutOptions::default())?;

    let Some(Storer::Table(t)) = store.get_storer("t")? else {
        return Err("expected a table".into());
    };
    let width = t.values_axes().iter().find(|c| c.name == "s").and_then(|c| c.itemsize());
    assert!(width.is_some_and(|w| w >= 10));
    assert_eq!(t.data_columns(), &["s".to_string()]);
    assert_eq!(store.get("t")?.nrows(), 2);
    Ok(())
}

#[test]
fn min_itemsize_keys_must_be_queryable() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", string_frame(&["abc"])?, PutOptions::default())?;

    let opts = PutOptions {
        min_itemsize: Some(MinItemsize::from([("nope".to_string(), 10)])),
        ..PutOptions::default()
    };
    let err = store.append("t", string_frame(&["abc"])?, opts).unwrap_err();

    assert!(matches!(err, StoreError::InvalidMinItemsize { ref key } if key == "nope"));
    Ok(())
}

// ==================== categoricals ====================

#[test]
fn categorical_appends_need_matching_categories() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let first = Frame::from_columns(Index::range(3), [("c", categorical(&["a", "b", "a"], &["a", "b"])?)])?;
    store.append("t", first, PutOptions::default())?;

    let same = Frame::from_columns(Index::range(1), [("c", categorical(&["b"], &["a", "b"])?)])?;
    store.append("t", same, PutOptions::default())?;

    let other = Frame::from_columns(Index::range(1), [("c", categorical(&["c"], &["a", "c"])?)])?;
    let err = store.append("t", other, PutOptions::default()).unwrap_err();

    assert!(matches!(err, StoreError::CategoriesMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    let back = store.get("t")?.into_frame().ok_or("not a frame")?;
    assert_eq!(back.column(0), &categorical(&["a", "b", "a", "b"], &["a", "b"])?);
    Ok(())
}

// ==================== data columns ====================

#[test]
fn data_columns_are_fixed_at_creation() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let opts = PutOptions {
        data_columns: Some(DataColumns::Named(vec!["b".into()])),
        ..PutOptions::default()
    };
    store.append("t", int_frame(4)?, opts)?;
    store.append(
        "t",
        shifted(2, 4)?,
        PutOptions {
            data_columns: Some(DataColumns::All),
            ..PutOptions::default()
        },
    )?;

    let Some(Storer::Table(t)) = store.get_storer("t")? else {
        return Err("expected a table".into());
    };
    assert_eq!(t.data_columns(), &["b".to_string()]);
    assert_eq!(t.nrows(), 6);
    Ok(())
}

#[test]
fn all_missing_rows_are_dropped_with_dropna() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    let frame = Frame::from_columns(
        Index::range(3),
        [("x", floats([1.0, f64::NAN, 3.0])), ("y", floats([f64::NAN, f64::NAN, 4.0]))],
    )?;

    store.append(
        "t",
        frame,
        PutOptions {
            dropna: Some(true),
            ..PutOptions::default()
        },
    )?;

    let back = store.get("t")?;
    assert_eq!(back.index().level(0), &ints([0, 2]));
    Ok(())
}
