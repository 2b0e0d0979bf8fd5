//! Parquet payload files backing array and table nodes.

use std::fs::File;
use std::path::Path;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use snafu::ResultExt;

use super::error::{ArrowSnafu, ContainerResult, IoSnafu, ParquetSnafu};
use super::fs;

/// Write one batch as a complete parquet file.
pub(crate) fn write_batch(
    path: &Path,
    batch: &RecordBatch,
    props: WriterProperties,
) -> ContainerResult<()> {
    let display = path.display().to_string();
    let file = File::create(path).context(IoSnafu {
        path: display.clone(),
    })?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).context(
        ParquetSnafu {
            path: display.clone(),
        },
    )?;
    writer.write(batch).context(ParquetSnafu {
        path: display.clone(),
    })?;
    writer.close().context(ParquetSnafu { path: display })?;
    Ok(())
}

/// Read a parquet file back into a single batch.
///
/// `schema` defaults to the arrow schema embedded in the file. `projection`
/// selects leaf columns by position; every stored field is a flat leaf so
/// positions match the schema.
pub(crate) fn read_batch(
    path: &Path,
    schema: Option<&SchemaRef>,
    projection: Option<&[usize]>,
) -> ContainerResult<RecordBatch> {
    let display = path.display().to_string();
    let bytes = Bytes::from(fs::read_bytes(path)?);
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetSnafu {
        path: display.clone(),
    })?;

    let schema = match schema {
        Some(s) => s.clone(),
        None => builder.schema().clone(),
    };
    let out_schema = match projection {
        Some(indices) => {
            let mask = ProjectionMask::leaves(builder.parquet_schema(), indices.iter().copied());
            builder = builder.with_projection(mask);
            std::sync::Arc::new(schema.project(indices).context(ArrowSnafu)?)
        }
        None => schema.clone(),
    };

    let reader = builder.build().context(ParquetSnafu {
        path: display.clone(),
    })?;
    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        // Parquet round-trips may drop field metadata; re-stamp the schema.
        batches.push(
            RecordBatch::try_new(out_schema.clone(), batch.columns().to_vec()).context(ArrowSnafu)?,
        );
    }
    concat_batches(&out_schema, &batches).context(ArrowSnafu)
}
