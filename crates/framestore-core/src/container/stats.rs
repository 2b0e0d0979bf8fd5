//! Per-segment min/max statistics backing secondary indexes.

use std::cmp::Ordering;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use serde::{Deserialize, Serialize};

use super::condition::{CmpOp, Literal, trim_zeros};

/// Three-valued answer to "can this condition hold inside the segment".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalTruth {
    /// Every row in the segment satisfies the condition.
    AlwaysTrue,
    /// No row in the segment satisfies the condition.
    AlwaysFalse,
    /// Rows must be inspected.
    MaybeTrue,
}

/// One statistics bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatValue {
    /// Integer and boolean fields.
    Int(i64),
    /// Float and unsigned fields.
    Float(f64),
    /// Fixed-width byte fields, trailing zero padding removed.
    Bytes(Vec<u8>),
}

/// Min/max of one field within one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Smallest value.
    pub min: StatValue,
    /// Largest value.
    pub max: StatValue,
}

impl ColumnStats {
    /// Compute statistics for a stored column.
    ///
    /// Returns `None` when the column is empty, has nulls or NaNs, or its
    /// type carries no useful ordering.
    pub fn compute(array: &ArrayRef) -> Option<Self> {
        if array.is_empty() || array.null_count() > 0 {
            return None;
        }
        match array.data_type() {
            DataType::FixedSizeBinary(_) => {
                let values = array.as_fixed_size_binary();
                let mut it = values.iter().flatten().map(trim_zeros);
                let first = it.next()?;
                let (min, max) = it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
                Some(Self {
                    min: StatValue::Bytes(min.to_vec()),
                    max: StatValue::Bytes(max.to_vec()),
                })
            }
            DataType::Float32 | DataType::Float64 | DataType::UInt64 => {
                let values = cast(array, &DataType::Float64).ok()?;
                let values = values.as_primitive::<Float64Type>();
                if values.values().iter().any(|v| v.is_nan()) {
                    return None;
                }
                let min = values.values().iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.values().iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some(Self {
                    min: StatValue::Float(min),
                    max: StatValue::Float(max),
                })
            }
            dt if dt.is_integer() || *dt == DataType::Boolean => {
                let values = cast(array, &DataType::Int64).ok()?;
                let values = values.as_primitive::<Int64Type>();
                let min = values.values().iter().copied().min()?;
                let max = values.values().iter().copied().max()?;
                Some(Self {
                    min: StatValue::Int(min),
                    max: StatValue::Int(max),
                })
            }
            _ => None,
        }
    }

    /// Evaluate `field op value` against the interval `[min, max]`.
    pub fn truth(&self, op: CmpOp, value: &Literal) -> IntervalTruth {
        use IntervalTruth::*;
        let (Some(lo), Some(hi)) = (value.cmp_stat(&self.min), value.cmp_stat(&self.max)) else {
            return MaybeTrue;
        };
        // `lo`/`hi` order the literal relative to min/max.
        match op {
            CmpOp::Lt => {
                if hi == Ordering::Greater {
                    AlwaysTrue
                } else if lo != Ordering::Greater {
                    AlwaysFalse
                } else {
                    MaybeTrue
                }
            }
            CmpOp::Le => {
                if hi != Ordering::Less {
                    AlwaysTrue
                } else if lo == Ordering::Less {
                    AlwaysFalse
                } else {
                    MaybeTrue
                }
            }
            CmpOp::Gt => {
                if lo == Ordering::Less {
                    AlwaysTrue
                } else if hi != Ordering::Less {
                    AlwaysFalse
                } else {
                    MaybeTrue
                }
            }
            CmpOp::Ge => {
                if lo != Ordering::Greater {
                    AlwaysTrue
                } else if hi == Ordering::Greater {
                    AlwaysFalse
                } else {
                    MaybeTrue
                }
            }
            CmpOp::Eq => {
                if lo == Ordering::Less || hi == Ordering::Greater {
                    AlwaysFalse
                } else if lo == Ordering::Equal && hi == Ordering::Equal {
                    AlwaysTrue
                } else {
                    MaybeTrue
                }
            }
            CmpOp::Ne => {
                if lo == Ordering::Equal && hi == Ordering::Equal {
                    AlwaysFalse
                } else if lo == Ordering::Less || hi == Ordering::Greater {
                    AlwaysTrue
                } else {
                    MaybeTrue
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int32Array};
    use std::sync::Arc;

    fn int_stats(min: i64, max: i64) -> ColumnStats {
        ColumnStats {
            min: StatValue::Int(min),
            max: StatValue::Int(max),
        }
    }

    #[test]
    fn computes_integer_bounds() {
        let a: ArrayRef = Arc::new(Int32Array::from(vec![5, -2, 9]));
        assert_eq!(ColumnStats::compute(&a), Some(int_stats(-2, 9)));
    }

    #[test]
    fn nan_disables_stats() {
        let a: ArrayRef = Arc::new(Float64Array::from(vec![1.0, f64::NAN]));
        assert_eq!(ColumnStats::compute(&a), None);
    }

    #[test]
    fn interval_truth_for_ranges() {
        let s = int_stats(10, 20);
        assert_eq!(s.truth(CmpOp::Ge, &Literal::Int(50)), IntervalTruth::AlwaysFalse);
        assert_eq!(s.truth(CmpOp::Ge, &Literal::Int(10)), IntervalTruth::AlwaysTrue);
        assert_eq!(s.truth(CmpOp::Ge, &Literal::Int(15)), IntervalTruth::MaybeTrue);
        assert_eq!(s.truth(CmpOp::Lt, &Literal::Int(10)), IntervalTruth::AlwaysFalse);
        assert_eq!(s.truth(CmpOp::Lt, &Literal::Float(20.5)), IntervalTruth::AlwaysTrue);
        assert_eq!(s.truth(CmpOp::Eq, &Literal::Int(21)), IntervalTruth::AlwaysFalse);
        assert_eq!(int_stats(3, 3).truth(CmpOp::Ne, &Literal::Int(3)), IntervalTruth::AlwaysFalse);
    }

    #[test]
    fn byte_literals_never_prune_numeric_stats() {
        let s = int_stats(0, 1);
        assert_eq!(
            s.truth(CmpOp::Eq, &Literal::Bytes(b"x".to_vec())),
            IntervalTruth::MaybeTrue
        );
    }
}
