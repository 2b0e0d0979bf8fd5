use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn store_path(tmp: &TempDir, name: &str) -> PathBuf {
    tmp.path().join(name)
}

/// `rows` trades: `ts` one second apart, `symbol` cycling A/B, `price` and `volume`.
pub fn write_parquet_rows(path: &Path, rows: usize) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let base_ts = 1_700_000_000_000_000_000i64;
    let ts = TimestampNanosecondArray::from_iter_values((0..rows).map(|i| base_ts + i as i64 * 1_000_000_000));
    let symbol = StringArray::from_iter_values((0..rows).map(|i| if i % 2 == 0 { "A" } else { "B" }));
    let price = Float64Array::from_iter_values((0..rows).map(|i| 100.0 + i as f64 / 4.0));
    let volume = Int64Array::from_iter_values((0..rows).map(|i| 1_000 + i as i64));

    let schema = Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("price", DataType::Float64, false),
        Field::new("volume", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ts) as ArrayRef,
            Arc::new(symbol),
            Arc::new(price),
            Arc::new(volume),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
