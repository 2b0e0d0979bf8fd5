#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, DictionaryArray, DurationNanosecondArray, FixedSizeListArray,
    Float64Array, Int64Array, StringArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Int8Type};
use framestore_core::Store;
use framestore_core::config::StoreOptions;
use framestore_core::frame::{Frame, Index};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn open_store(dir: &Path) -> TestResult<Store> {
    Ok(Store::open(dir.join("store"), StoreOptions::default())?)
}

pub fn ints(values: impl IntoIterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values))
}

pub fn floats(values: impl IntoIterator<Item = f64>) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(values))
}

pub fn strings(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn categorical(values: &[&str], categories: &[&str]) -> TestResult<ArrayRef> {
    let keys = values
        .iter()
        .map(|v| categories.iter().position(|c| c == v).map(|p| p as i8))
        .collect::<arrow::array::Int8Array>();
    let dict = DictionaryArray::<Int8Type>::try_new(keys, strings(categories))?;
    Ok(Arc::new(dict))
}

pub fn complex(pairs: &[(f64, f64)]) -> TestResult<ArrayRef> {
    let values = floats(pairs.iter().flat_map(|(re, im)| [*re, *im]));
    let field = Arc::new(Field::new("item", DataType::Float64, false));
    Ok(Arc::new(FixedSizeListArray::try_new(field, 2, values, None)?))
}

/// `n`-row frame with an integer column `a` (0..n) and a float column `b`
/// (0.0, 1.0, ...).
pub fn int_frame(n: usize) -> TestResult<Frame> {
    Ok(Frame::from_columns(
        Index::range(n),
        [
            ("a", ints(0..n as i64)),
            ("b", floats((0..n).map(|i| i as f64))),
        ],
    )?)
}

/// Four rows holding one column of every supported kind.
pub fn mixed_frame() -> TestResult<Frame> {
    let stamps: ArrayRef = Arc::new(
        TimestampNanosecondArray::from(vec![
            1_700_000_000_000_000_000,
            1_700_000_060_000_000_000,
            1_700_000_120_000_000_000,
            1_700_000_180_000_000_000,
        ])
        .with_timezone("UTC"),
    );
    let durations: ArrayRef = Arc::new(DurationNanosecondArray::from(vec![0, 1_000, 2_000, 3_000]));
    let flags: ArrayRef = Arc::new(BooleanArray::from(vec![true, false, true, false]));
    Ok(Frame::from_columns(
        Index::range(4),
        [
            ("s", Arc::new(StringArray::from(vec![Some("alpha"), None, Some("gamma"), Some("d")])) as ArrayRef),
            ("i", ints([1, -2, 3, -4])),
            ("f", floats([0.5, 1.5, -2.5, 3.25])),
            ("flag", flags),
            ("when", stamps),
            ("took", durations),
            ("cat", categorical(&["x", "y", "x", "z"], &["x", "y", "z"])?),
            ("z", complex(&[(1.0, -1.0), (0.0, 2.5), (3.0, 0.0), (-1.5, -1.5)])?),
        ],
    )?)
}
