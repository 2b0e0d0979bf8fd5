//! In-memory labeled data.
//!
//! A [`Series`] is one arrow array with a row [`Index`] and an optional
//! name. A [`Frame`] is a row index, a column index and one array per
//! column. Both are plain containers: the store reads and writes them, it
//! does not compute with them.
//!
//! Dtype conventions:
//!
//! - categorical columns are dictionary arrays;
//! - complex columns are `FixedSizeList<Float64, 2>` (real, imaginary);
//! - datetimes are timestamps, optionally with a timezone;
//! - durations are `Duration(Nanosecond)`.

mod index;
mod label;

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type};
use arrow::error::ArrowError;
use snafu::prelude::*;

pub use index::Index;
pub use label::Label;

pub(crate) use label::display_labels;

/// Result alias for frame construction.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors building labeled objects.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    /// Parts of an object disagree in length.
    #[snafu(display("length mismatch in {what}: expected {expected}, got {actual}"))]
    LengthMismatch {
        /// Which part disagrees.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Labels must be all strings, all integers, or equal-length tuples.
    #[snafu(display("axis labels must be all strings, all integers or equal-length tuples"))]
    MixedLabels,

    /// Labels cannot be missing.
    #[snafu(display("axis labels cannot be missing"))]
    NullLabel,

    /// An array type that cannot serve as axis labels.
    #[snafu(display("cannot use values of type {data_type} as axis labels"))]
    UnsupportedLabel {
        /// Arrow type of the level.
        data_type: String,
    },

    /// Arrow kernel failure.
    #[snafu(display("arrow error: {source}"))]
    Arrow {
        /// Underlying arrow error.
        source: ArrowError,
    },
}

/// One labeled column.
#[derive(Debug, Clone)]
pub struct Series {
    index: Index,
    values: ArrayRef,
    name: Option<String>,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && &self.values == &other.values && self.name == other.name
    }
}

impl Series {
    /// Series over `index`; lengths must agree.
    pub fn new(index: Index, values: ArrayRef) -> FrameResult<Self> {
        ensure!(
            index.len() == values.len(),
            LengthMismatchSnafu {
                what: "series values",
                expected: index.len(),
                actual: values.len(),
            }
        );
        Ok(Self {
            index,
            values,
            name: None,
        })
    }

    /// Series with a positional index.
    pub fn from_array(values: ArrayRef) -> Self {
        Self {
            index: Index::range(values.len()),
            values,
            name: None,
        }
    }

    /// Set the series name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Row index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Values.
    pub fn values(&self) -> &ArrayRef {
        &self.values
    }

    /// Name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One-column frame labeled with the series name, or `label` when unnamed.
    pub fn to_frame(&self, label: &str) -> Frame {
        let name = self.name.clone().unwrap_or_else(|| label.to_string());
        Frame {
            index: self.index.clone(),
            columns: Index::new(Arc::new(arrow::array::StringArray::from(vec![name]))),
            data: vec![self.values.clone()],
        }
    }
}

/// Labeled columns sharing a row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: Index,
    columns: Index,
    data: Vec<ArrayRef>,
}

impl Frame {
    /// Frame from its axes and columns; every column must match the row index.
    pub fn new(index: Index, columns: Index, data: Vec<ArrayRef>) -> FrameResult<Self> {
        ensure!(
            columns.len() == data.len(),
            LengthMismatchSnafu {
                what: "column labels",
                expected: data.len(),
                actual: columns.len(),
            }
        );
        for col in &data {
            ensure!(
                col.len() == index.len(),
                LengthMismatchSnafu {
                    what: "column values",
                    expected: index.len(),
                    actual: col.len(),
                }
            );
        }
        Ok(Self {
            index,
            columns,
            data,
        })
    }

    /// Frame from `(label, values)` pairs.
    pub fn from_columns<L: Into<Label>>(
        index: Index,
        columns: impl IntoIterator<Item = (L, ArrayRef)>,
    ) -> FrameResult<Self> {
        let (labels, data): (Vec<Label>, Vec<ArrayRef>) =
            columns.into_iter().map(|(l, a)| (l.into(), a)).unzip();
        Self::new(index, Index::from_labels(&labels)?, data)
    }

    /// Row index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Column index.
    pub fn columns(&self) -> &Index {
        &self.columns
    }

    /// Column arrays, in column order.
    pub fn data(&self) -> &[ArrayRef] {
        &self.data
    }

    /// Column at position `i`.
    pub fn column(&self, i: usize) -> &ArrayRef {
        &self.data[i]
    }

    /// Column with the given label.
    pub fn column_by_label(&self, label: &Label) -> FrameResult<Option<&ArrayRef>> {
        let labels = self.columns.labels()?;
        Ok(labels.iter().position(|l| l == label).map(|i| &self.data[i]))
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.data.len()
    }

    /// Arrow fields naming each column by its label.
    pub fn fields(&self) -> FrameResult<Vec<Field>> {
        let labels = self.columns.labels()?;
        Ok(labels
            .iter()
            .zip(&self.data)
            .map(|(l, a)| Field::new(l.to_string(), a.data_type().clone(), true))
            .collect())
    }

    /// Rows at the given positions.
    pub fn take(&self, indices: &UInt64Array) -> FrameResult<Self> {
        let mut data = Vec::with_capacity(self.data.len());
        for col in &self.data {
            data.push(take(col.as_ref(), indices, None).context(ArrowSnafu)?);
        }
        Ok(Self {
            index: self.index.take(indices)?,
            columns: self.columns.clone(),
            data,
        })
    }

    /// Columns at the given positions, in that order.
    pub fn select_columns(&self, positions: &[usize]) -> FrameResult<Self> {
        let picks = UInt64Array::from_iter_values(positions.iter().map(|p| *p as u64));
        Ok(Self {
            index: self.index.clone(),
            columns: self.columns.take(&picks)?,
            data: positions.iter().map(|p| self.data[*p].clone()).collect(),
        })
    }

    /// Replace the row index.
    pub fn with_index(self, index: Index) -> FrameResult<Self> {
        Self::new(index, self.columns, self.data)
    }

    /// Replace the column index.
    pub fn with_columns(self, columns: Index) -> FrameResult<Self> {
        Self::new(self.index, columns, self.data)
    }

    /// Split into the row index, column index and column arrays.
    pub fn into_parts(self) -> (Index, Index, Vec<ArrayRef>) {
        (self.index, self.columns, self.data)
    }

    /// Single column as a series carrying the column label as its name.
    pub fn to_series(&self, i: usize) -> FrameResult<Series> {
        let labels = self.columns.labels()?;
        Ok(Series {
            index: self.index.clone(),
            values: self.data[i].clone(),
            name: labels.get(i).map(ToString::to_string),
        })
    }
}

/// An object the store can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// One labeled column.
    Series(Series),
    /// Labeled columns.
    Frame(Frame),
}

impl Dataset {
    /// Row index.
    pub fn index(&self) -> &Index {
        match self {
            Dataset::Series(s) => s.index(),
            Dataset::Frame(f) => f.index(),
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.index().len()
    }

    /// True when the object has no values.
    pub fn is_empty(&self) -> bool {
        match self {
            Dataset::Series(s) => s.is_empty(),
            Dataset::Frame(f) => f.nrows() == 0 || f.ncols() == 0,
        }
    }

    /// The frame, if this is one.
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Dataset::Frame(f) => Some(f),
            Dataset::Series(_) => None,
        }
    }

    /// The series, if this is one.
    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Dataset::Series(s) => Some(s),
            Dataset::Frame(_) => None,
        }
    }

    /// Consume into a frame, if this is one.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Dataset::Frame(f) => Some(f),
            Dataset::Series(_) => None,
        }
    }

    /// Consume into a series, if this is one.
    pub fn into_series(self) -> Option<Series> {
        match self {
            Dataset::Series(s) => Some(s),
            Dataset::Frame(_) => None,
        }
    }
}

impl From<Series> for Dataset {
    fn from(s: Series) -> Self {
        Dataset::Series(s)
    }
}

impl From<Frame> for Dataset {
    fn from(f: Frame) -> Self {
        Dataset::Frame(f)
    }
}

/// True for dictionary-encoded (categorical) arrays.
pub(crate) fn is_categorical(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Dictionary(_, _))
}

/// True when `row` of `array` is null, or NaN in a float array.
pub(crate) fn is_missing(array: &ArrayRef, row: usize) -> bool {
    if array.is_null(row) {
        return true;
    }
    match array.data_type() {
        DataType::Float64 => array.as_primitive::<Float64Type>().value(row).is_nan(),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(row).is_nan(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};

    #[test]
    fn frame_checks_column_lengths() {
        let col: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
        let err = Frame::from_columns(Index::range(3), [("a", col)]).err();
        assert!(matches!(err, Some(FrameError::LengthMismatch { .. })));
    }

    #[test]
    fn take_and_select_columns() -> FrameResult<()> {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let b: ArrayRef = Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5]));
        let f = Frame::from_columns(Index::range(3), [("a", a), ("b", b)])?;

        let rows = f.take(&UInt64Array::from(vec![2, 0]))?;
        assert_eq!(rows.index().labels()?, vec![Label::Int(2), Label::Int(0)]);

        let cols = f.select_columns(&[1])?;
        assert_eq!(cols.columns().labels()?, vec![Label::from("b")]);
        assert_eq!(cols.ncols(), 1);
        Ok(())
    }

    #[test]
    fn series_to_frame_uses_fallback_label() {
        let s = Series::from_array(Arc::new(Int64Array::from(vec![1])));
        let f = s.to_frame("values");
        assert_eq!(f.columns().labels().ok(), Some(vec![Label::from("values")]));
    }
}
