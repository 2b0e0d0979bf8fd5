use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use framestore::{Dataset, Index};
use snafu::ResultExt;

use crate::error::{CliResult, FrameSnafu, RenderSnafu};

fn index_fields(index: &Index) -> Vec<(String, ArrayRef)> {
    index
        .levels()
        .iter()
        .zip(index.names())
        .enumerate()
        .map(|(i, (level, name))| {
            let name = match (name, index.is_multi()) {
                (Some(name), _) => name.clone(),
                (None, false) => "index".to_string(),
                (None, true) => format!("level_{i}"),
            };
            (name, level.clone())
        })
        .collect()
}

/// Row index levels followed by the value columns, as one batch.
pub fn to_batch(data: &Dataset) -> CliResult<RecordBatch> {
    let mut columns = index_fields(data.index());
    match data {
        Dataset::Frame(frame) => {
            let labels = frame.columns().labels().context(FrameSnafu)?;
            for (label, values) in labels.iter().zip(frame.data()) {
                columns.push((label.to_string(), values.clone()));
            }
        }
        Dataset::Series(series) => {
            let name = series.name().unwrap_or("values").to_string();
            columns.push((name, series.values().clone()));
        }
    }
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, values)| Field::new(name, values.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, values)| values).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(RenderSnafu)
}

/// Pretty table of the first `max_rows` rows and a trailing row count.
pub fn render(data: &Dataset, max_rows: usize) -> CliResult<String> {
    let batch = to_batch(data)?;
    let total = batch.num_rows();
    let shown = batch.slice(0, total.min(max_rows));
    let mut out = pretty_format_batches(&[shown]).context(RenderSnafu)?.to_string();
    out.push('\n');
    if total > max_rows {
        out.push_str(&format!("... {} more rows\n", total - max_rows));
    }
    out.push_str(&format!("({total} rows)\n"));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use framestore::{Frame, Series};

    #[test]
    fn renders_index_then_columns() -> Result<(), Box<dyn std::error::Error>> {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![10, 20, 30]));
        let frame = Frame::from_columns(Index::range(3), [("a", a.clone())])?;

        let out = render(&frame.into(), 2)?;
        assert!(out.contains("| index | a  |"));
        assert!(out.contains("... 1 more rows"));
        assert!(out.contains("(3 rows)"));

        let batch = to_batch(&Series::from_array(a).into())?;
        assert_eq!(batch.schema().field(1).name(), "values");
        Ok(())
    }
}
