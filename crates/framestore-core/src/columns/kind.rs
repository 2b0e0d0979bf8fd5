//! Coarse column kinds and dtype names.

use std::fmt;

use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

/// Coarse on-disk type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Text, stored as fixed-width encoded bytes.
    String,
    /// Signed or unsigned integers.
    Integer,
    /// Floating point.
    Float,
    /// Complex numbers.
    Complex,
    /// Booleans.
    Bool,
    /// Timestamps, stored as nanoseconds since the epoch.
    Datetime64,
    /// Durations, stored as nanoseconds.
    Timedelta64,
    /// Calendar dates; fixed layout only.
    Date,
    /// Anything else; not storable in tables.
    Object,
}

impl Kind {
    /// Kind of an in-memory arrow type. Categoricals report the kind of
    /// their codes.
    pub fn of(data_type: &DataType) -> Kind {
        match data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Kind::String,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Kind::Integer,
            DataType::Float32 | DataType::Float64 => Kind::Float,
            DataType::Boolean => Kind::Bool,
            DataType::Timestamp(_, _) => Kind::Datetime64,
            DataType::Duration(_) => Kind::Timedelta64,
            DataType::Date32 | DataType::Date64 => Kind::Date,
            DataType::FixedSizeList(f, 2)
                if matches!(f.data_type(), DataType::Float32 | DataType::Float64) =>
            {
                Kind::Complex
            }
            DataType::Dictionary(key, _) => Kind::of(key),
            _ => Kind::Object,
        }
    }

    /// Kind recorded for a persisted dtype name.
    pub fn from_dtype(dtype: &str) -> Kind {
        if dtype.starts_with("bytes") || dtype.starts_with("str") || dtype == "object" {
            Kind::String
        } else if dtype.starts_with("int") || dtype.starts_with("uint") {
            Kind::Integer
        } else if dtype.starts_with("float") {
            Kind::Float
        } else if dtype.starts_with("complex") {
            Kind::Complex
        } else if dtype == "bool" {
            Kind::Bool
        } else if dtype.starts_with("datetime64") {
            Kind::Datetime64
        } else if dtype.starts_with("timedelta64") {
            Kind::Timedelta64
        } else if dtype == "date" {
            Kind::Date
        } else {
            Kind::Object
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::Complex => "complex",
            Kind::Bool => "bool",
            Kind::Datetime64 => "datetime64",
            Kind::Timedelta64 => "timedelta64",
            Kind::Date => "date",
            Kind::Object => "object",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dtype name of a non-string in-memory type; categoricals report their codes.
pub fn dtype_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Int8 => "int8".into(),
        DataType::Int16 => "int16".into(),
        DataType::Int32 => "int32".into(),
        DataType::Int64 => "int64".into(),
        DataType::UInt8 => "uint8".into(),
        DataType::UInt16 => "uint16".into(),
        DataType::UInt32 => "uint32".into(),
        DataType::UInt64 => "uint64".into(),
        DataType::Float16 => "float16".into(),
        DataType::Float32 => "float32".into(),
        DataType::Float64 => "float64".into(),
        DataType::Boolean => "bool".into(),
        DataType::Timestamp(_, None) => "datetime64[ns]".into(),
        DataType::Timestamp(_, Some(tz)) => format!("datetime64[ns, {tz}]"),
        DataType::Duration(_) => "timedelta64[ns]".into(),
        DataType::Date32 | DataType::Date64 => "date".into(),
        DataType::FixedSizeList(f, 2) if f.data_type() == &DataType::Float32 => "complex64".into(),
        DataType::FixedSizeList(f, 2) if f.data_type() == &DataType::Float64 => "complex128".into(),
        DataType::Dictionary(key, _) => dtype_name(key),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "object".into(),
        other => other.to_string(),
    }
}

/// Dtype name of a fixed-width byte string of `itemsize` bytes.
pub fn bytes_dtype(itemsize: usize) -> String {
    format!("bytes{}", itemsize * 8)
}

/// In-memory arrow type for a persisted dtype name and timezone.
///
/// Strings, complex numbers and categoricals are resolved by the caller.
pub(crate) fn dtype_to_arrow(dtype: &str, tz: Option<&str>) -> Option<DataType> {
    Some(match dtype {
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float32" => DataType::Float32,
        "float64" => DataType::Float64,
        "bool" => DataType::Boolean,
        d if d.starts_with("datetime64") => {
            DataType::Timestamp(TimeUnit::Nanosecond, tz.map(Into::into))
        }
        d if d.starts_with("timedelta64") => DataType::Duration(TimeUnit::Nanosecond),
        _ => return None,
    })
}

/// Timezone carried by a timestamp type.
pub(crate) fn timezone(data_type: &DataType) -> Option<String> {
    match data_type {
        DataType::Timestamp(_, Some(tz)) => Some(tz.to_string()),
        DataType::Dictionary(_, values) => timezone(values),
        _ => None,
    }
}
