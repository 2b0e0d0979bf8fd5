//! On-disk field types.
//!
//! An [`Atom`] is the scalar element type of a table field or array column.
//! A [`ColumnType`] adds an optional shape: shaped fields hold a fixed-width
//! vector of atoms per row and are stored as packed fixed-width byte records.

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

/// Scalar element type of an on-disk field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atom {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Boolean, one byte per value when packed.
    Bool,
    /// Fixed-width byte string of the given item size, zero padded.
    Bytes(usize),
    /// Complex number made of two little-endian floats; item size 8 or 16.
    Complex(usize),
}

impl Atom {
    /// Width in bytes of one element.
    pub fn itemsize(self) -> usize {
        match self {
            Atom::Int8 | Atom::UInt8 | Atom::Bool => 1,
            Atom::Int16 | Atom::UInt16 => 2,
            Atom::Int32 | Atom::UInt32 | Atom::Float32 => 4,
            Atom::Int64 | Atom::UInt64 | Atom::Float64 => 8,
            Atom::Bytes(n) | Atom::Complex(n) => n,
        }
    }

    /// Arrow type of one unpacked element.
    pub fn arrow_type(self) -> DataType {
        match self {
            Atom::Int8 => DataType::Int8,
            Atom::Int16 => DataType::Int16,
            Atom::Int32 => DataType::Int32,
            Atom::Int64 => DataType::Int64,
            Atom::UInt8 => DataType::UInt8,
            Atom::UInt16 => DataType::UInt16,
            Atom::UInt32 => DataType::UInt32,
            Atom::UInt64 => DataType::UInt64,
            Atom::Float32 => DataType::Float32,
            Atom::Float64 => DataType::Float64,
            Atom::Bool => DataType::Boolean,
            Atom::Bytes(n) | Atom::Complex(n) => DataType::FixedSizeBinary(n as i32),
        }
    }

    /// Atom for a native numeric or boolean arrow type.
    pub fn from_numeric(dt: &DataType) -> Option<Atom> {
        Some(match dt {
            DataType::Int8 => Atom::Int8,
            DataType::Int16 => Atom::Int16,
            DataType::Int32 => Atom::Int32,
            DataType::Int64 => Atom::Int64,
            DataType::UInt8 => Atom::UInt8,
            DataType::UInt16 => Atom::UInt16,
            DataType::UInt32 => Atom::UInt32,
            DataType::UInt64 => Atom::UInt64,
            DataType::Float32 => Atom::Float32,
            DataType::Float64 => Atom::Float64,
            DataType::Boolean => Atom::Bool,
            _ => return None,
        })
    }

    /// True for byte-string atoms.
    pub fn is_bytes(self) -> bool {
        matches!(self, Atom::Bytes(_))
    }
}

/// Type of one table field: an atom plus an optional per-row item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// Element type.
    pub atom: Atom,
    /// Number of atoms per row for shaped fields; `None` for scalar fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<usize>,
}

impl ColumnType {
    /// A scalar field.
    pub fn scalar(atom: Atom) -> Self {
        Self { atom, shape: None }
    }

    /// A field holding `items` atoms per row.
    pub fn shaped(atom: Atom, items: usize) -> Self {
        Self {
            atom,
            shape: Some(items),
        }
    }

    /// True when the field holds exactly one atom per row.
    pub fn is_scalar(&self) -> bool {
        self.shape.is_none()
    }

    /// Arrow type used to persist the field.
    pub fn arrow_type(&self) -> DataType {
        match self.shape {
            None => self.atom.arrow_type(),
            Some(n) => DataType::FixedSizeBinary((self.atom.itemsize() * n) as i32),
        }
    }
}
