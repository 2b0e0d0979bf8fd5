#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use arrow::record_batch::RecordBatch;
use common::*;
use framestore_core::config::{DataColumns, OpenMode, PutOptions, SelectOptions};
use framestore_core::container::{Atom, ColumnType, Container, NodePath, TableField};
use framestore_core::error::{ErrorKind, StoreError};
use framestore_core::expr::{Expr, Predicate};
use framestore_core::frame::Label;
use framestore_core::storer::StorerKind;
use framestore_core::table::TableType;
use tempfile::TempDir;

fn promoted(columns: &[&str]) -> PutOptions {
    PutOptions {
        data_columns: Some(DataColumns::Named(columns.iter().map(|c| c.to_string()).collect())),
        ..PutOptions::default()
    }
}

// ==================== push-down ====================

#[test]
fn index_predicate_returns_matching_rows_in_order() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(100)?, PutOptions::default())?;

    let rows = store.select("t", SelectOptions::matching(Expr::col("index").ge(50)))?;

    assert_eq!(rows.nrows(), 50);
    assert_eq!(rows.index().level(0), &ints(50..100));
    Ok(())
}

#[test]
fn data_column_predicates_combine() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(20)?, promoted(&["a"]))?;

    let expr = Expr::col("a").gt(3) & Expr::col("a").le(6) | Expr::col("a").eq(15);
    let rows = store.select("t", SelectOptions::matching(expr))?;

    assert_eq!(rows.index().level(0), &ints([4, 5, 6, 15]));
    Ok(())
}

#[test]
fn membership_predicates_push_down() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, promoted(&["a"]))?;

    let rows = store.select("t", SelectOptions::matching(Expr::col("a").isin([1, 3, 8])))?;
    assert_eq!(rows.index().level(0), &ints([1, 3, 8]));

    let rows = store.select("t", SelectOptions::matching(!Expr::col("a").isin([0, 1, 2])))?;
    assert_eq!(rows.nrows(), 7);
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(5)?, PutOptions::default())?;

    let err = store
        .select("t", SelectOptions::matching(Expr::col("nope").eq(1)))
        .unwrap_err();

    assert!(matches!(err, StoreError::UnknownField { ref field, .. } if field == "nope"));
    assert_eq!(err.kind(), ErrorKind::InvalidPredicate);
    Ok(())
}

#[test]
fn fixed_objects_cannot_be_queried() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.put("f", int_frame(5)?, PutOptions::default())?;

    let err = store
        .select("f", SelectOptions::matching(Expr::col("index").gt(1)))
        .unwrap_err();
    assert!(matches!(err, StoreError::FixedSelection));

    let rows = store.select("f", SelectOptions::default().range(Some(1), Some(3)))?;
    assert_eq!(rows.nrows(), 2);
    Ok(())
}

// ==================== residual filters ====================

#[test]
fn non_data_column_terms_filter_after_reading() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, PutOptions::default())?;

    let expr = Expr::col("index").lt(8) & Expr::col("b").gt(4.5);
    let rows = store.select("t", SelectOptions::matching(expr))?;

    assert_eq!(rows.index().level(0), &ints([5, 6, 7]));
    Ok(())
}

#[test]
fn columns_axis_terms_restrict_labels() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(4)?, PutOptions::default())?;

    let rows = store.select("t", SelectOptions::matching(Expr::col("columns").eq("b")))?;

    let frame = rows.as_frame().ok_or("not a frame")?;
    assert_eq!(frame.columns().labels()?, vec![Label::from("b")]);
    assert_eq!(frame.nrows(), 4);
    Ok(())
}

#[test]
fn column_subset_keeps_requested_order() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(4)?, promoted(&["a"]))?;

    let rows = store.select("t", SelectOptions::default().columns(["b", "a", "zz"]))?;

    let frame = rows.as_frame().ok_or("not a frame")?;
    assert_eq!(frame.columns().labels()?, vec![Label::from("b"), Label::from("a")]);
    Ok(())
}

// ==================== coordinates and ranges ====================

#[test]
fn coordinates_and_masks_address_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, PutOptions::default())?;

    let coords = store.select_as_coordinates("t", Some(&Expr::col("index").ge(7).into()), None, None)?;
    assert_eq!(coords, vec![7, 8, 9]);

    let rows = store.select("t", SelectOptions::matching(vec![2_i64, -1]))?;
    assert_eq!(rows.index().level(0), &ints([2, 9]));

    let mask: Vec<bool> = (0..4).map(|i| i % 2 == 0).collect();
    let rows = store.select("t", SelectOptions::matching(mask).range(Some(2), Some(6)))?;
    assert_eq!(rows.index().level(0), &ints([2, 4]));

    let err = store
        .select("t", SelectOptions::matching(vec![true; 3]))
        .unwrap_err();
    assert!(matches!(err, StoreError::MaskLength { len: 3, expected: 10 }));
    Ok(())
}

#[test]
fn negative_range_counts_from_the_end() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, PutOptions::default())?;

    let rows = store.select("t", SelectOptions::default().range(Some(-3), None))?;

    assert_eq!(rows.index().level(0), &ints([7, 8, 9]));
    Ok(())
}

#[test]
fn select_column_reads_index_and_data_columns_only() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(6)?, promoted(&["a"]))?;

    let a = store.select_column("t", "a", Some(1), Some(4))?;
    assert_eq!(a.values(), &ints([1, 2, 3]));
    assert_eq!(a.name(), Some("a"));

    let index = store.select_column("t", "index", None, None)?;
    assert_eq!(index.len(), 6);

    let err = store.select_column("t", "b", None, None).unwrap_err();
    assert!(matches!(err, StoreError::NotExtractable { .. }));
    Ok(())
}

// ==================== deletion ====================

#[test]
fn deleting_coordinates_keeps_the_rest_in_order() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(100)?, PutOptions::default())?;
    let doomed = [1_i64, 2, 3, 7, 8, 20];

    let removed = store.remove("t", Some(&Predicate::Coordinates(doomed.to_vec())), None, None)?;

    assert_eq!(removed, Some(6));
    let rows = store.get("t")?;
    assert_eq!(rows.nrows(), 94);
    assert_eq!(rows.index().level(0), &ints((0..100).filter(|i| !doomed.contains(i))));
    Ok(())
}

#[test]
fn deleting_by_predicate_uses_residual_terms() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, PutOptions::default())?;

    let removed = store.remove("t", Some(&Expr::col("b").ge(6.0).into()), None, None)?;

    assert_eq!(removed, Some(4));
    assert_eq!(store.get("t")?.index().level(0), &ints(0..6));
    Ok(())
}

#[test]
fn deleting_a_range_removes_the_tail() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = open_store(tmp.path())?;
    store.append("t", int_frame(10)?, PutOptions::default())?;

    assert_eq!(store.remove("t", None, Some(6), None)?, Some(4));
    assert_eq!(store.get("t")?.nrows(), 6);
    Ok(())
}

// ==================== generic tables ====================

#[test]
fn bare_table_nodes_read_as_generic_tables() -> TestResult {
    let tmp = TempDir::new()?;
    {
        let c = Container::open(tmp.path().join("store"), OpenMode::Append, None)?;
        let mut node = c.create_table(
            &NodePath::parse("/raw")?,
            vec![TableField::new("x", ColumnType::scalar(Atom::Int64))],
            10_000,
            None,
        )?;
        let batch = RecordBatch::try_new(node.schema().clone(), vec![ints([5, 6, 7, 8])])?;
        node.append(&batch)?;
        node.flush()?;
    }
    let store = open_store(tmp.path())?;

    let kinds = store.groups()?;
    assert_eq!(kinds, vec![("/raw".to_string(), StorerKind::Table(TableType::GenericTable))]);

    let rows = store.select("raw", SelectOptions::matching(Expr::col("x").gt(6)))?;
    let frame = rows.as_frame().ok_or("not a frame")?;
    assert_eq!(frame.index().level(0), &ints([2, 3]));
    assert_eq!(frame.column(0), &ints([7, 8]));
    Ok(())
}
