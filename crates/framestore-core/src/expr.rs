//! Predicate builder and binder.
//!
//! Callers build an [`Expr`] tree with [`Expr::col`] and the comparison
//! methods, then hand it to a selection as a [`Predicate`]. Binding an
//! expression against a table's [`Queryables`] splits it into a condition
//! the container evaluates during the read, and residual [`FilterTerm`]s
//! applied to the materialized rows:
//!
//! - terms over index columns and data columns push down, with operands
//!   converted to the on-disk representation;
//! - terms over the `columns` axis or a non-promoted column label stay
//!   residual and may only be combined with `&` at the top level.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use snafu::prelude::*;

use crate::columns::{Kind, StringCodec};
use crate::container::{CmpOp, ColumnType, Condition, Literal};
use crate::error::{ArrowSnafu, InvalidOperandSnafu, NonConjunctiveFilterSnafu, StoreResult, UnknownFieldSnafu};
use crate::frame::Label;

/// A predicate operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
    /// Instant as nanoseconds since the epoch (UTC).
    Timestamp(i64),
    /// Duration in nanoseconds.
    Timedelta(i64),
    /// Calendar date as days since the epoch.
    Date(i32),
}

impl Value {
    /// Order two values of compatible types; `None` when incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (UInt(a), UInt(b)) => Some(a.cmp(b)),
            (Int(a), UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (UInt(a), Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), UInt(b)) => a.partial_cmp(&(*b as f64)),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (UInt(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) | (Timedelta(a), Timedelta(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn from_label(label: &Label) -> Option<Value> {
        match label {
            Label::Int(v) => Some(Value::Int(*v)),
            Label::Str(s) => Some(Value::Str(s.clone())),
            Label::Tuple(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "'{v}'"),
            Value::Timestamp(v) => {
                write!(f, "Timestamp('{}')", DateTime::<Utc>::from_timestamp_nanos(*v).to_rfc3339())
            }
            Value::Timedelta(v) => write!(f, "Timedelta({v}ns)"),
            Value::Date(v) => write!(f, "Date({v})"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

impl From<TimeDelta> for Value {
    fn from(v: TimeDelta) -> Self {
        Value::Timedelta(v.num_nanoseconds().unwrap_or(i64::MAX))
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        Value::Date((v - epoch).num_days() as i32)
    }
}

/// Predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `field op value`
    Compare {
        /// Field name.
        field: String,
        /// Operator.
        op: CmpOp,
        /// Operand.
        value: Value,
    },
    /// Membership test.
    In {
        /// Field name.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
        /// True for "not in".
        negated: bool,
    },
    /// All children hold.
    And(Vec<Expr>),
    /// Any child holds.
    Or(Vec<Expr>),
    /// The child does not hold.
    Not(Box<Expr>),
}

/// A field reference, the left-hand side of a comparison.
#[derive(Debug, Clone)]
pub struct Col(String);

macro_rules! comparison {
    ($name:ident, $op:expr, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(self, value: impl Into<Value>) -> Expr {
            Expr::Compare {
                field: self.0,
                op: $op,
                value: value.into(),
            }
        }
    };
}

impl Col {
    comparison!(eq, CmpOp::Eq, "`field == value`");
    comparison!(ne, CmpOp::Ne, "`field != value`");
    comparison!(lt, CmpOp::Lt, "`field < value`");
    comparison!(le, CmpOp::Le, "`field <= value`");
    comparison!(gt, CmpOp::Gt, "`field > value`");
    comparison!(ge, CmpOp::Ge, "`field >= value`");

    /// `field` equals one of `values`.
    pub fn isin<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::In {
            field: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `field` equals none of `values`.
    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::In {
            field: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }
}

impl Expr {
    /// Reference a queryable field.
    pub fn col(field: impl Into<String>) -> Col {
        Col(field.into())
    }

    /// Both hold.
    pub fn and(self, other: Expr) -> Expr {
        match self {
            Expr::And(mut children) => {
                children.push(other);
                Expr::And(children)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    /// Either holds.
    pub fn or(self, other: Expr) -> Expr {
        match self {
            Expr::Or(mut children) => {
                children.push(other);
                Expr::Or(children)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    /// Fields referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Expr::Compare { field, .. } | Expr::In { field, .. } => vec![field.as_str()],
            Expr::And(c) | Expr::Or(c) => c.iter().flat_map(Expr::fields).collect(),
            Expr::Not(c) => c.fields(),
        }
    }
}

impl ops::BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl ops::BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            Expr::In {
                field,
                values,
                negated,
            } => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                let op = if *negated { "not in" } else { "in" };
                write!(f, "{field} {op} [{}]", parts.join(", "))
            }
            Expr::And(c) => join(f, c, " & "),
            Expr::Or(c) => join(f, c, " | "),
            Expr::Not(c) => write!(f, "~({c})"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

/// What a selection filters by.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Boolean mask over the addressed row range.
    Mask(Vec<bool>),
    /// Row positions; negative values count from the end of the table.
    Coordinates(Vec<i64>),
    /// Expression over queryable fields.
    Expr(Expr),
}

impl From<Expr> for Predicate {
    fn from(e: Expr) -> Self {
        Predicate::Expr(e)
    }
}

impl From<Vec<bool>> for Predicate {
    fn from(mask: Vec<bool>) -> Self {
        Predicate::Mask(mask)
    }
}

impl From<Vec<i64>> for Predicate {
    fn from(coords: Vec<i64>) -> Self {
        Predicate::Coordinates(coords)
    }
}

/// A field a predicate may reference.
#[derive(Debug, Clone)]
pub enum Queryable {
    /// An on-disk field: an index column or a data column.
    Field {
        /// Coarse type.
        kind: Kind,
        /// On-disk type.
        column_type: ColumnType,
        /// Timezone of timestamp values.
        tz: Option<String>,
        /// Category list of a categorical column.
        categories: Option<ArrayRef>,
    },
    /// A non-index axis (`columns`).
    Axis,
    /// A column label that is not a data column.
    Label,
}

impl Queryable {
    fn is_residual(&self) -> bool {
        !matches!(self, Queryable::Field { .. })
    }
}

/// Queryable fields of a table, by name.
pub type Queryables = BTreeMap<String, Queryable>;

/// Operator of a residual filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Comparison with the single operand.
    Cmp(CmpOp),
    /// Equals any operand.
    IsIn,
    /// Equals no operand.
    NotIn,
}

/// One residual `(field, operator, operand)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    /// Axis name or column label.
    pub field: String,
    /// Operator.
    pub op: FilterOp,
    /// Operand values.
    pub operand: Vec<Value>,
}

impl FilterTerm {
    /// True when `value` passes the term. Missing values only pass `NotIn`.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return self.op == FilterOp::NotIn;
        };
        let equal = |o: &Value| value.compare(o) == Some(Ordering::Equal);
        match self.op {
            FilterOp::Cmp(op) => self
                .operand
                .first()
                .and_then(|o| value.compare(o))
                .is_some_and(|ord| op.holds(ord)),
            FilterOp::IsIn => self.operand.iter().any(equal),
            FilterOp::NotIn => !self.operand.iter().any(equal),
        }
    }

    /// True when `label` passes the term.
    pub fn matches_label(&self, label: &Label) -> bool {
        self.matches(Value::from_label(label).as_ref())
    }
}

/// A predicate bound to a table: push-down condition plus residual terms.
#[derive(Debug, Clone)]
pub struct Expression {
    condition: Option<Condition>,
    filter: Option<Vec<FilterTerm>>,
}

impl Expression {
    /// Validate `expr` against `queryables` and split it.
    pub fn bind(expr: &Expr, queryables: &Queryables, codec: &StringCodec) -> StoreResult<Self> {
        for field in expr.fields() {
            if !queryables.contains_key(field) {
                let names: Vec<&str> = queryables.keys().map(String::as_str).collect();
                return UnknownFieldSnafu {
                    field,
                    queryables: names.join(","),
                }
                .fail();
            }
        }

        let conjuncts: Vec<&Expr> = match expr {
            Expr::And(children) => children.iter().collect(),
            other => vec![other],
        };
        let mut pushed = Vec::new();
        let mut residual = Vec::new();
        for term in conjuncts {
            let residual_field = term
                .fields()
                .into_iter()
                .find(|f| queryables.get(*f).is_some_and(Queryable::is_residual));
            match (term, residual_field) {
                (_, None) => pushed.push(lower(term, queryables, codec)?),
                (Expr::Compare { field, op, value }, Some(_)) => residual.push(FilterTerm {
                    field: field.clone(),
                    op: FilterOp::Cmp(*op),
                    operand: vec![value.clone()],
                }),
                (
                    Expr::In {
                        field,
                        values,
                        negated,
                    },
                    Some(_),
                ) => residual.push(FilterTerm {
                    field: field.clone(),
                    op: if *negated { FilterOp::NotIn } else { FilterOp::IsIn },
                    operand: values.clone(),
                }),
                (_, Some(field)) => return NonConjunctiveFilterSnafu { field }.fail(),
            }
        }

        let condition = match pushed.len() {
            0 => None,
            1 => pushed.pop(),
            _ => Some(Condition::And(pushed)),
        };
        Ok(Self {
            condition,
            filter: (!residual.is_empty()).then_some(residual),
        })
    }

    /// The push-down condition and the residual filter terms.
    pub fn evaluate(&self) -> (Option<Condition>, Option<Vec<FilterTerm>>) {
        (self.condition.clone(), self.filter.clone())
    }
}

fn lower(expr: &Expr, queryables: &Queryables, codec: &StringCodec) -> StoreResult<Condition> {
    Ok(match expr {
        Expr::Compare { field, op, value } => {
            Condition::compare(field, *op, literal(field, &queryables[field.as_str()], value, codec)?)
        }
        Expr::In {
            field,
            values,
            negated,
        } => {
            let q = &queryables[field.as_str()];
            let any = Condition::Or(
                values
                    .iter()
                    .map(|v| Ok(Condition::compare(field, CmpOp::Eq, literal(field, q, v, codec)?)))
                    .collect::<StoreResult<_>>()?,
            );
            if *negated {
                Condition::Not(Box::new(any))
            } else {
                any
            }
        }
        Expr::And(c) => Condition::And(
            c.iter()
                .map(|e| lower(e, queryables, codec))
                .collect::<StoreResult<_>>()?,
        ),
        Expr::Or(c) => Condition::Or(
            c.iter()
                .map(|e| lower(e, queryables, codec))
                .collect::<StoreResult<_>>()?,
        ),
        Expr::Not(c) => Condition::Not(Box::new(lower(c, queryables, codec)?)),
    })
}

/// Convert an operand to the on-disk representation of `field`.
fn literal(field: &str, q: &Queryable, value: &Value, codec: &StringCodec) -> StoreResult<Literal> {
    let Queryable::Field {
        kind, categories, ..
    } = q
    else {
        return invalid(field, value, "not an on-disk field");
    };

    if let Some(categories) = categories {
        let values = array_values(categories)?;
        let code = values
            .iter()
            .position(|c| c.as_ref().and_then(|c| c.compare(value)) == Some(Ordering::Equal))
            .unwrap_or(values.len());
        return Ok(Literal::Int(code as i64));
    }

    match (kind, value) {
        (Kind::String, Value::Str(s)) => Ok(Literal::Bytes(codec.encode(s)?)),
        (Kind::Integer | Kind::Float, Value::Int(v)) => Ok(Literal::Int(*v)),
        (Kind::Integer | Kind::Float, Value::UInt(v)) => Ok(Literal::UInt(*v)),
        (Kind::Integer | Kind::Float, Value::Float(v)) => Ok(Literal::Float(*v)),
        (Kind::Bool, Value::Bool(v)) => Ok(Literal::Bool(*v)),
        (Kind::Datetime64, Value::Timestamp(v) | Value::Int(v)) => Ok(Literal::Int(*v)),
        (Kind::Datetime64, Value::Date(d)) => Ok(Literal::Int(i64::from(*d) * 86_400 * 1_000_000_000)),
        (Kind::Datetime64, Value::Str(s)) => match parse_timestamp(s) {
            Some(ns) => Ok(Literal::Int(ns)),
            None => invalid(field, value, "not a timestamp"),
        },
        (Kind::Timedelta64, Value::Timedelta(v) | Value::Int(v)) => Ok(Literal::Int(*v)),
        (kind, _) => invalid(field, value, &format!("operand does not fit a {kind} column")),
    }
}

fn invalid<T>(field: &str, value: &Value, reason: &str) -> StoreResult<T> {
    InvalidOperandSnafu {
        field,
        operand: value.to_string(),
        reason,
    }
    .fail()
}

/// Parse an RFC 3339 timestamp, a naive date-time, or a date, as UTC nanoseconds.
pub(crate) fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return t.timestamp_nanos_opt();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y%m%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return t.and_utc().timestamp_nanos_opt();
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| t.and_utc().timestamp_nanos_opt())
}

/// Values of an in-memory array as predicate operands; missing entries are `None`.
pub(crate) fn array_values(array: &ArrayRef) -> StoreResult<Vec<Option<Value>>> {
    let cast_to = |t: &DataType| cast(array, t).context(ArrowSnafu);
    let ints = |a: &ArrayRef, wrap: fn(i64) -> Value| -> Vec<Option<Value>> {
        a.as_primitive::<Int64Type>().iter().map(|v| v.map(wrap)).collect()
    };
    Ok(match array.data_type() {
        DataType::Dictionary(_, values) => array_values(&cast_to(values)?)?,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => cast_to(&DataType::Utf8)?
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(|s| Value::Str(s.to_string())))
            .collect(),
        DataType::UInt64 => array
            .as_primitive::<arrow::datatypes::UInt64Type>()
            .iter()
            .map(|v| v.map(Value::UInt))
            .collect(),
        dt if dt.is_integer() => ints(&cast_to(&DataType::Int64)?, Value::Int),
        dt if dt.is_floating() => cast_to(&DataType::Float64)?
            .as_primitive::<arrow::datatypes::Float64Type>()
            .iter()
            .map(|v| v.map(Value::Float))
            .collect(),
        DataType::Boolean => array.as_boolean().iter().map(|v| v.map(Value::Bool)).collect(),
        DataType::Timestamp(_, tz) => {
            let ns = cast_to(&DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()))?;
            let raw = cast(&ns, &DataType::Int64).context(ArrowSnafu)?;
            ints(&raw, Value::Timestamp)
        }
        DataType::Duration(_) => {
            let ns = cast_to(&DataType::Duration(TimeUnit::Nanosecond))?;
            let raw = cast(&ns, &DataType::Int64).context(ArrowSnafu)?;
            ints(&raw, Value::Timedelta)
        }
        DataType::Date32 => array
            .as_primitive::<arrow::datatypes::Date32Type>()
            .iter()
            .map(|v| v.map(Value::Date))
            .collect(),
        _ => vec![None; array.len()],
    })
}
