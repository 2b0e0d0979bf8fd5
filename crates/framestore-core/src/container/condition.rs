//! Push-down conditions evaluated directly on stored records.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, Scalar, UInt64Array,
};
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::compute::{cast, prep_null_mask_filter};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use snafu::{OptionExt, ResultExt};

use super::error::{ArrowSnafu, ContainerResult, LiteralTypeSnafu, UnknownFieldSnafu};
use super::stats::{ColumnStats, IntervalTruth, StatValue};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    pub(crate) fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A literal already converted to a field's on-disk representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Signed integer, also used for timestamps, durations and dates.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Encoded bytes for fixed-width string fields.
    Bytes(Vec<u8>),
}

impl Literal {
    fn as_f64(&self) -> Option<f64> {
        match *self {
            Literal::Int(v) => Some(v as f64),
            Literal::UInt(v) => Some(v as f64),
            Literal::Float(v) => Some(v),
            Literal::Bool(v) => Some(f64::from(u8::from(v))),
            Literal::Bytes(_) => None,
        }
    }

    /// Order of this literal relative to a statistics bound.
    pub(crate) fn cmp_stat(&self, stat: &StatValue) -> Option<Ordering> {
        match (self, stat) {
            (Literal::Bytes(a), StatValue::Bytes(b)) => Some(trim_zeros(a).cmp(trim_zeros(b))),
            (Literal::Int(a), StatValue::Int(b)) => Some(a.cmp(b)),
            (Literal::Bytes(_), _) | (_, StatValue::Bytes(_)) => None,
            (lit, StatValue::Int(b)) => lit.as_f64()?.partial_cmp(&(*b as f64)),
            (lit, StatValue::Float(b)) => lit.as_f64()?.partial_cmp(b),
        }
    }
}

/// Condition tree handed to the table's filtered reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field op literal`
    Compare {
        /// Field name in the row layout.
        field: String,
        /// Operator.
        op: CmpOp,
        /// Right-hand side in on-disk representation.
        value: Literal,
    },
    /// All children hold.
    And(Vec<Condition>),
    /// Any child holds.
    Or(Vec<Condition>),
    /// The child does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Shorthand for a comparison.
    pub fn compare(field: impl Into<String>, op: CmpOp, value: Literal) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// Evaluate against a batch, producing a null-free row mask.
    pub(crate) fn evaluate(&self, table: &str, batch: &RecordBatch) -> ContainerResult<BooleanArray> {
        let mask = match self {
            Condition::Compare { field, op, value } => {
                let column = batch
                    .column_by_name(field)
                    .context(UnknownFieldSnafu { path: table, field })?;
                compare(field, column, *op, value)?
            }
            Condition::And(children) => {
                let mut acc = BooleanArray::from(vec![true; batch.num_rows()]);
                for child in children {
                    let m = child.evaluate(table, batch)?;
                    acc = boolean_kernels::and(&acc, &m).context(ArrowSnafu)?;
                }
                acc
            }
            Condition::Or(children) => {
                let mut acc = BooleanArray::from(vec![false; batch.num_rows()]);
                for child in children {
                    let m = child.evaluate(table, batch)?;
                    acc = boolean_kernels::or(&acc, &m).context(ArrowSnafu)?;
                }
                acc
            }
            Condition::Not(child) => {
                let m = child.evaluate(table, batch)?;
                boolean_kernels::not(&m).context(ArrowSnafu)?
            }
        };
        Ok(null_free(mask))
    }

    /// Decide from per-segment statistics whether the condition can hold.
    pub(crate) fn truth<'a>(
        &self,
        stats: &impl Fn(&str) -> Option<&'a ColumnStats>,
    ) -> IntervalTruth {
        match self {
            Condition::Compare { field, op, value } => match stats(field) {
                Some(s) => s.truth(*op, value),
                None => IntervalTruth::MaybeTrue,
            },
            Condition::And(children) => {
                let mut all_true = true;
                for c in children {
                    match c.truth(stats) {
                        IntervalTruth::AlwaysFalse => return IntervalTruth::AlwaysFalse,
                        IntervalTruth::MaybeTrue => all_true = false,
                        IntervalTruth::AlwaysTrue => {}
                    }
                }
                if all_true {
                    IntervalTruth::AlwaysTrue
                } else {
                    IntervalTruth::MaybeTrue
                }
            }
            Condition::Or(children) => {
                let mut all_false = true;
                for c in children {
                    match c.truth(stats) {
                        IntervalTruth::AlwaysTrue => return IntervalTruth::AlwaysTrue,
                        IntervalTruth::MaybeTrue => all_false = false,
                        IntervalTruth::AlwaysFalse => {}
                    }
                }
                if all_false {
                    IntervalTruth::AlwaysFalse
                } else {
                    IntervalTruth::MaybeTrue
                }
            }
            Condition::Not(child) => match child.truth(stats) {
                IntervalTruth::AlwaysTrue => IntervalTruth::AlwaysFalse,
                IntervalTruth::AlwaysFalse => IntervalTruth::AlwaysTrue,
                IntervalTruth::MaybeTrue => IntervalTruth::MaybeTrue,
            },
        }
    }

    /// Every field the condition references.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Compare { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Condition::And(children) | Condition::Or(children) => {
                for c in children {
                    c.collect_fields(out);
                }
            }
            Condition::Not(child) => child.collect_fields(out),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { field, op, value } => write!(f, "({field} {op} {value:?})"),
            Condition::And(c) => write_joined(f, c, " & "),
            Condition::Or(c) => write_joined(f, c, " | "),
            Condition::Not(c) => write!(f, "~{c}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, c) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{c}")?;
    }
    f.write_str(")")
}

/// Treat null mask entries as false.
fn null_free(mask: BooleanArray) -> BooleanArray {
    if mask.null_count() > 0 {
        prep_null_mask_filter(&mask)
    } else {
        mask
    }
}

pub(crate) fn trim_zeros(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn compare(field: &str, column: &ArrayRef, op: CmpOp, value: &Literal) -> ContainerResult<BooleanArray> {
    let type_error = || LiteralTypeSnafu {
        field,
        data_type: column.data_type().to_string(),
        literal: format!("{value:?}"),
    };

    if let DataType::FixedSizeBinary(_) = column.data_type() {
        let Literal::Bytes(lit) = value else {
            return type_error().fail();
        };
        let lit = trim_zeros(lit);
        let values = column.as_fixed_size_binary();
        return Ok(values
            .iter()
            .map(|v| v.map(|v| op.holds(trim_zeros(v).cmp(lit))))
            .collect());
    }

    let (lhs, rhs): (ArrayRef, ArrayRef) = match (column.data_type(), value) {
        (DataType::Boolean, Literal::Bool(b)) => {
            (column.clone(), Arc::new(BooleanArray::from(vec![*b])))
        }
        (dt, Literal::Bool(b)) if dt.is_integer() => {
            let rhs: ArrayRef = Arc::new(Int64Array::from(vec![i64::from(*b)]));
            (column.clone(), cast(&rhs, dt).context(ArrowSnafu)?)
        }
        (dt, Literal::Int(v)) if dt.is_integer() || dt.is_floating() => {
            let rhs: ArrayRef = Arc::new(Int64Array::from(vec![*v]));
            numeric_pair(column, rhs)?
        }
        (dt, Literal::UInt(v)) if dt.is_integer() || dt.is_floating() => {
            let rhs: ArrayRef = Arc::new(UInt64Array::from(vec![*v]));
            numeric_pair(column, rhs)?
        }
        (dt, Literal::Float(v)) if dt.is_integer() || dt.is_floating() => {
            let rhs: ArrayRef = Arc::new(Float64Array::from(vec![*v]));
            numeric_pair(column, rhs)?
        }
        _ => return type_error().fail(),
    };

    let rhs = Scalar::new(rhs);
    let out = match op {
        CmpOp::Eq => cmp_kernels::eq(&lhs, &rhs),
        CmpOp::Ne => cmp_kernels::neq(&lhs, &rhs),
        CmpOp::Lt => cmp_kernels::lt(&lhs, &rhs),
        CmpOp::Le => cmp_kernels::lt_eq(&lhs, &rhs),
        CmpOp::Gt => cmp_kernels::gt(&lhs, &rhs),
        CmpOp::Ge => cmp_kernels::gt_eq(&lhs, &rhs),
    };
    out.context(ArrowSnafu)
}

/// Bring a column and a one-element literal array to a common numeric type.
///
/// The literal is cast to the column type when that is lossless; otherwise
/// both sides are compared as `Float64`.
fn numeric_pair(column: &ArrayRef, literal: ArrayRef) -> ContainerResult<(ArrayRef, ArrayRef)> {
    let target = column.data_type();
    if literal.data_type() == target {
        return Ok((column.clone(), literal));
    }
    if let Ok(narrowed) = cast_exact(&literal, target) {
        return Ok((column.clone(), narrowed));
    }
    let lhs = cast(column, &DataType::Float64).context(ArrowSnafu)?;
    let rhs = cast(&literal, &DataType::Float64).context(ArrowSnafu)?;
    Ok((lhs, rhs))
}

/// Cast that fails instead of truncating or overflowing.
fn cast_exact(literal: &ArrayRef, target: &DataType) -> Result<ArrayRef, ()> {
    let out = cast(literal, target).map_err(|_| ())?;
    if out.null_count() > 0 {
        return Err(());
    }
    let back = cast(&out, literal.data_type()).map_err(|_| ())?;
    if back.as_ref() == literal.as_ref() {
        Ok(out)
    } else {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::FixedSizeBinaryArray;
    use arrow::datatypes::{Field, Schema};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn batch() -> Result<RecordBatch, Box<dyn std::error::Error>> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("index", DataType::Int64, false),
            Field::new("f", DataType::Float64, false),
            Field::new("s", DataType::FixedSizeBinary(3), false),
        ]));
        let s = FixedSizeBinaryArray::try_from_iter(vec![b"a\0\0", b"bb\0", b"ccc"].into_iter())?;
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5])),
                Arc::new(s),
            ],
        )?)
    }

    fn mask(cond: &Condition) -> Result<Vec<bool>, Box<dyn std::error::Error>> {
        let b = batch()?;
        Ok(cond.evaluate("/t", &b)?.values().iter().collect())
    }

    #[test]
    fn integer_field_against_float_literal_compares_numerically() -> TestResult {
        let c = Condition::compare("index", CmpOp::Gt, Literal::Float(1.5));
        assert_eq!(mask(&c)?, vec![false, true, true]);
        Ok(())
    }

    #[test]
    fn byte_fields_ignore_zero_padding() -> TestResult {
        let c = Condition::compare("s", CmpOp::Eq, Literal::Bytes(b"bb".to_vec()));
        assert_eq!(mask(&c)?, vec![false, true, false]);
        let c = Condition::compare("s", CmpOp::Lt, Literal::Bytes(b"bb".to_vec()));
        assert_eq!(mask(&c)?, vec![true, false, false]);
        Ok(())
    }

    #[test]
    fn boolean_combinators() -> TestResult {
        let c = Condition::Or(vec![
            Condition::compare("index", CmpOp::Eq, Literal::Int(1)),
            Condition::Not(Box::new(Condition::compare("f", CmpOp::Lt, Literal::Float(2.0)))),
        ]);
        assert_eq!(mask(&c)?, vec![true, false, true]);
        Ok(())
    }

    #[test]
    fn null_free_batch_evaluates_every_row() -> TestResult {
        let b = batch()?;
        let m = Condition::compare("index", CmpOp::Ge, Literal::Int(2)).evaluate("/t", &b)?;
        assert_eq!(m.null_count(), 0);
        assert_eq!(m.values().iter().collect::<Vec<_>>(), vec![false, true, true]);
        Ok(())
    }

    #[test]
    fn null_byte_rows_never_match() -> TestResult {
        let schema = Arc::new(Schema::new(vec![Field::new("s", DataType::FixedSizeBinary(2), true)]));
        let s = FixedSizeBinaryArray::try_from_sparse_iter_with_size(
            vec![Some(b"ab"), None, Some(b"zz"), None].into_iter(),
            2,
        )?;
        let b = RecordBatch::try_new(schema, vec![Arc::new(s)])?;

        let m = Condition::compare("s", CmpOp::Ne, Literal::Bytes(b"ab".to_vec())).evaluate("/t", &b)?;
        assert_eq!(m.null_count(), 0);
        assert_eq!(m.values().iter().collect::<Vec<_>>(), vec![false, false, true, false]);

        let negated = Condition::Not(Box::new(Condition::compare("s", CmpOp::Eq, Literal::Bytes(b"ab".to_vec()))));
        let m = negated.evaluate("/t", &b)?;
        assert_eq!(m.values().iter().collect::<Vec<_>>(), vec![false, true, true, true]);
        Ok(())
    }

    #[test]
    fn mismatched_literal_is_an_error() -> TestResult {
        let b = batch()?;
        let c = Condition::compare("s", CmpOp::Eq, Literal::Int(3));
        assert!(c.evaluate("/t", &b).is_err());
        let c = Condition::compare("nope", CmpOp::Eq, Literal::Int(3));
        assert!(c.evaluate("/t", &b).is_err());
        Ok(())
    }
}
