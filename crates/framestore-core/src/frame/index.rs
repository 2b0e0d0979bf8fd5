//! Row and column axes.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Array, StringArray, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type};
use snafu::ResultExt;

use super::label::Label;
use super::{ArrowSnafu, FrameResult, LengthMismatchSnafu, MixedLabelsSnafu, NullLabelSnafu, UnsupportedLabelSnafu};

/// An axis of labels with one or more levels.
///
/// A single-level index holds one array; a multi-level index holds one
/// array per level, all the same length. Level names and an optional
/// frequency string travel with the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    levels: Vec<ArrayRef>,
    names: Vec<Option<String>>,
    freq: Option<String>,
}

impl Index {
    /// Unnamed single-level index.
    pub fn new(values: ArrayRef) -> Self {
        Self {
            levels: vec![values],
            names: vec![None],
            freq: None,
        }
    }

    /// Named single-level index.
    pub fn named(values: ArrayRef, name: impl Into<String>) -> Self {
        Self {
            levels: vec![values],
            names: vec![Some(name.into())],
            freq: None,
        }
    }

    /// Positional `0..n` index.
    pub fn range(n: usize) -> Self {
        Self::new(Arc::new(Int64Array::from_iter_values(0..n as i64)))
    }

    /// Multi-level index from equal-length levels.
    pub fn multi(levels: Vec<ArrayRef>, names: Vec<Option<String>>) -> FrameResult<Self> {
        ensure_len("index names", levels.len(), names.len())?;
        if let Some(first) = levels.first() {
            for level in &levels[1..] {
                ensure_len("index level", first.len(), level.len())?;
            }
        }
        Ok(Self {
            levels,
            names,
            freq: None,
        })
    }

    /// Build a column axis from labels. Tuples become a multi-level index.
    pub fn from_labels(labels: &[Label]) -> FrameResult<Self> {
        match labels.first() {
            Some(Label::Tuple(first)) => {
                let nlevels = first.len();
                let mut levels = Vec::with_capacity(nlevels);
                for lvl in 0..nlevels {
                    let mut parts = Vec::with_capacity(labels.len());
                    for label in labels {
                        match label {
                            Label::Tuple(t) if t.len() == nlevels => parts.push(t[lvl].clone()),
                            _ => return MixedLabelsSnafu.fail(),
                        }
                    }
                    levels.push(flat_labels_array(&parts)?);
                }
                Self::multi(levels, vec![None; nlevels])
            }
            _ => Ok(Self::new(flat_labels_array(labels)?)),
        }
    }

    /// Attach a frequency string.
    pub fn with_freq(mut self, freq: Option<String>) -> Self {
        self.freq = freq;
        self
    }

    /// Replace the level names.
    pub fn with_names(mut self, names: Vec<Option<String>>) -> FrameResult<Self> {
        ensure_len("index names", self.levels.len(), names.len())?;
        self.names = names;
        Ok(self)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    /// True when the axis has no labels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels.
    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    /// True for multi-level indexes.
    pub fn is_multi(&self) -> bool {
        self.levels.len() > 1
    }

    /// Values of level `i`.
    pub fn level(&self, i: usize) -> &ArrayRef {
        &self.levels[i]
    }

    /// Every level.
    pub fn levels(&self) -> &[ArrayRef] {
        &self.levels
    }

    /// Level names.
    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }

    /// Name of the first level.
    pub fn name(&self) -> Option<&str> {
        self.names.first().and_then(|n| n.as_deref())
    }

    /// Frequency string, if any.
    pub fn freq(&self) -> Option<&str> {
        self.freq.as_deref()
    }

    /// Labels of the axis; multi-level indexes yield tuples.
    pub fn labels(&self) -> FrameResult<Vec<Label>> {
        let mut per_level = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            per_level.push(array_labels(level)?);
        }
        if per_level.len() == 1 {
            return Ok(per_level.pop().unwrap_or_default());
        }
        Ok((0..self.len())
            .map(|i| Label::Tuple(per_level.iter().map(|l| l[i].clone()).collect()))
            .collect())
    }

    /// True when no label repeats.
    pub fn is_unique(&self) -> FrameResult<bool> {
        let labels = self.labels()?;
        let mut seen = HashSet::with_capacity(labels.len());
        Ok(labels.iter().all(|l| seen.insert(l)))
    }

    /// Labels at the given positions.
    pub fn take(&self, indices: &UInt64Array) -> FrameResult<Self> {
        let mut levels = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            levels.push(take(level.as_ref(), indices, None).context(ArrowSnafu)?);
        }
        Ok(Self {
            levels,
            names: self.names.clone(),
            freq: self.freq.clone(),
        })
    }
}

fn ensure_len(what: &'static str, expected: usize, actual: usize) -> FrameResult<()> {
    if expected != actual {
        return LengthMismatchSnafu {
            what,
            expected,
            actual,
        }
        .fail();
    }
    Ok(())
}

fn flat_labels_array(labels: &[Label]) -> FrameResult<ArrayRef> {
    if labels.iter().all(|l| matches!(l, Label::Int(_))) && !labels.is_empty() {
        let values = labels.iter().filter_map(|l| match l {
            Label::Int(v) => Some(*v),
            _ => None,
        });
        return Ok(Arc::new(Int64Array::from_iter_values(values)));
    }
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        match label {
            Label::Str(s) => out.push(s.as_str()),
            _ => return MixedLabelsSnafu.fail(),
        }
    }
    Ok(Arc::new(StringArray::from(out)))
}

/// Labels held by a single index level.
pub(crate) fn array_labels(array: &ArrayRef) -> FrameResult<Vec<Label>> {
    if array.null_count() > 0 {
        return NullLabelSnafu.fail();
    }
    macro_rules! ints {
        ($t:ty) => {
            array
                .as_primitive::<$t>()
                .values()
                .iter()
                .map(|v| Label::Int(*v as i64))
                .collect()
        };
    }
    Ok(match array.data_type() {
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| Label::Str(v.unwrap_or_default().to_string()))
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| Label::Str(v.unwrap_or_default().to_string()))
            .collect(),
        DataType::Int8 => ints!(Int8Type),
        DataType::Int16 => ints!(Int16Type),
        DataType::Int32 => ints!(Int32Type),
        DataType::Int64 => ints!(Int64Type),
        DataType::UInt8 => ints!(UInt8Type),
        DataType::UInt16 => ints!(UInt16Type),
        DataType::UInt32 => ints!(UInt32Type),
        DataType::UInt64 => ints!(UInt64Type),
        other => {
            return UnsupportedLabelSnafu {
                data_type: other.to_string(),
            }
            .fail();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_labels_build_a_multi_level_axis() -> FrameResult<()> {
        let labels = vec![
            Label::Tuple(vec![Label::from("a"), Label::from(1)]),
            Label::Tuple(vec![Label::from("b"), Label::from(2)]),
        ];
        let idx = Index::from_labels(&labels)?;
        assert!(idx.is_multi());
        assert_eq!(idx.labels()?, labels);
        Ok(())
    }

    #[test]
    fn mixed_labels_are_rejected() {
        let labels = vec![Label::from("a"), Label::from(1)];
        assert!(Index::from_labels(&labels).is_err());
    }

    #[test]
    fn uniqueness_and_take() -> FrameResult<()> {
        let idx = Index::from_labels(&[Label::from("x"), Label::from("y"), Label::from("x")])?;
        assert!(!idx.is_unique()?);
        let taken = idx.take(&UInt64Array::from(vec![1, 0]))?;
        assert_eq!(taken.labels()?, vec![Label::from("y"), Label::from("x")]);
        Ok(())
    }
}
