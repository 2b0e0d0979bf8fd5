//! Conversions between in-memory arrays and on-disk field values.
//!
//! Strings become zero-padded fixed-width bytes in the table's encoding,
//! with missing values written as the `nan_rep` sentinel. Shaped fields
//! pack several atom-typed arrays into one fixed-width byte record per row.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayData, ArrayRef, AsArray, BooleanArray, FixedSizeBinaryArray, FixedSizeListArray,
    Float32Array, Float64Array, Int64Array, StringArray, make_array,
};
use arrow::buffer::{Buffer, MutableBuffer};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Int64Type, TimeUnit};
use snafu::prelude::*;

use crate::container::Atom;
use crate::error::{ArrowSnafu, CodecSnafu, StoreResult, UnknownEncodingSnafu};

/// Text encoding for string columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8.
    Utf8,
    /// ISO-8859-1.
    Latin1,
    /// 7-bit ASCII.
    Ascii,
}

impl Encoding {
    /// Parse an encoding name.
    pub fn parse(name: &str) -> StoreResult<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            _ => UnknownEncodingSnafu {
                what: "encoding",
                value: name,
            }
            .fail(),
        }
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }

    fn max_char(self) -> u32 {
        match self {
            Encoding::Latin1 => 0xFF,
            _ => 0x7F,
        }
    }
}

/// How unencodable or undecodable characters are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Fail.
    Strict,
    /// Substitute a replacement character.
    Replace,
    /// Drop the character.
    Ignore,
}

impl ErrorPolicy {
    /// Parse a policy name.
    pub fn parse(name: &str) -> StoreResult<Self> {
        match name {
            "strict" => Ok(ErrorPolicy::Strict),
            "replace" => Ok(ErrorPolicy::Replace),
            "ignore" => Ok(ErrorPolicy::Ignore),
            _ => UnknownEncodingSnafu {
                what: "errors",
                value: name,
            }
            .fail(),
        }
    }
}

/// String conversion settings of one table.
#[derive(Debug, Clone)]
pub struct StringCodec {
    /// Sentinel standing in for missing strings.
    pub nan_rep: String,
    /// Text encoding.
    pub encoding: Encoding,
    /// Error policy.
    pub errors: ErrorPolicy,
}

impl StringCodec {
    /// Codec from persisted or requested option strings.
    pub fn new(nan_rep: &str, encoding: &str, errors: &str) -> StoreResult<Self> {
        Ok(Self {
            nan_rep: nan_rep.to_string(),
            encoding: Encoding::parse(encoding)?,
            errors: ErrorPolicy::parse(errors)?,
        })
    }

    /// Encode one string.
    pub fn encode(&self, s: &str) -> StoreResult<Vec<u8>> {
        if self.encoding == Encoding::Utf8 {
            return Ok(s.as_bytes().to_vec());
        }
        let max = self.encoding.max_char();
        let mut out = Vec::with_capacity(s.len());
        for c in s.chars() {
            let code = c as u32;
            if code <= max {
                out.push(code as u8);
                continue;
            }
            match self.errors {
                ErrorPolicy::Strict => {
                    return CodecSnafu {
                        encoding: self.encoding.name(),
                        action: "encode",
                        value: s,
                    }
                    .fail();
                }
                ErrorPolicy::Replace => out.push(b'?'),
                ErrorPolicy::Ignore => {}
            }
        }
        Ok(out)
    }

    /// Decode one zero-trimmed byte string.
    pub fn decode(&self, bytes: &[u8]) -> StoreResult<String> {
        match self.encoding {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Ok(s.to_string()),
                Err(_) => match self.errors {
                    ErrorPolicy::Strict => CodecSnafu {
                        encoding: self.encoding.name(),
                        action: "decode",
                        value: String::from_utf8_lossy(bytes),
                    }
                    .fail(),
                    ErrorPolicy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
                    ErrorPolicy::Ignore => Ok(String::from_utf8_lossy(bytes)
                        .chars()
                        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
                        .collect()),
                },
            },
            Encoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            Encoding::Ascii => {
                let mut out = String::with_capacity(bytes.len());
                for b in bytes {
                    if b.is_ascii() {
                        out.push(char::from(*b));
                        continue;
                    }
                    match self.errors {
                        ErrorPolicy::Strict => {
                            return CodecSnafu {
                                encoding: self.encoding.name(),
                                action: "decode",
                                value: String::from_utf8_lossy(bytes),
                            }
                            .fail();
                        }
                        ErrorPolicy::Replace => out.push(char::REPLACEMENT_CHARACTER),
                        ErrorPolicy::Ignore => {}
                    }
                }
                Ok(out)
            }
        }
    }

    /// Encode every value of a string array; missing values become `nan_rep`.
    pub fn encode_all(&self, array: &ArrayRef) -> StoreResult<Vec<Vec<u8>>> {
        let array = utf8(array)?;
        let sentinel = self.encode(&self.nan_rep)?;
        array
            .iter()
            .map(|v| match v {
                Some(s) => self.encode(s),
                None => Ok(sentinel.clone()),
            })
            .collect()
    }

    /// Fixed-width byte array from encoded values.
    pub fn to_fixed(&self, encoded: &[Vec<u8>], itemsize: usize) -> FixedSizeBinaryArray {
        let mut buf = MutableBuffer::new(encoded.len() * itemsize);
        for value in encoded {
            buf.extend_from_slice(value);
            buf.extend_zeros(itemsize - value.len());
        }
        FixedSizeBinaryArray::new(itemsize as i32, buf.into(), None)
    }

    /// Decode a fixed-width byte array; the `nan_rep` sentinel becomes missing.
    pub fn decode_fixed(&self, array: &ArrayRef) -> StoreResult<ArrayRef> {
        let array = array.as_fixed_size_binary();
        let mut out = Vec::with_capacity(array.len());
        for value in array.iter() {
            match value {
                None => out.push(None),
                Some(bytes) => {
                    let s = self.decode(crate::container::condition::trim_zeros(bytes))?;
                    if s == self.nan_rep {
                        out.push(None);
                    } else {
                        out.push(Some(s));
                    }
                }
            }
        }
        Ok(Arc::new(StringArray::from(out)))
    }
}

/// View any string array as `Utf8`.
fn utf8(array: &ArrayRef) -> StoreResult<StringArray> {
    let array = if array.data_type() == &DataType::Utf8 {
        array.clone()
    } else {
        cast(array, &DataType::Utf8).context(ArrowSnafu)?
    };
    Ok(array.as_string::<i32>().clone())
}

/// Width needed for the widest encoded value, at least one byte.
pub(crate) fn max_len(encoded: &[Vec<u8>]) -> usize {
    encoded.iter().map(Vec::len).max().unwrap_or(0).max(1)
}

/// Nanoseconds since the epoch with missing values as `i64::MIN`.
pub(crate) fn nanos_to_storage(array: &ArrayRef) -> StoreResult<ArrayRef> {
    let target = match array.data_type() {
        DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()),
        _ => DataType::Duration(TimeUnit::Nanosecond),
    };
    let ns = cast(array, &target).context(ArrowSnafu)?;
    let ints = cast(&ns, &DataType::Int64).context(ArrowSnafu)?;
    let ints = ints.as_primitive::<Int64Type>();
    Ok(Arc::new(Int64Array::from_iter_values(
        ints.iter().map(|v| v.unwrap_or(i64::MIN)),
    )))
}

/// Reverse of [`nanos_to_storage`] into `target` (a nanosecond timestamp or duration).
pub(crate) fn nanos_from_storage(raw: &ArrayRef, target: &DataType) -> StoreResult<ArrayRef> {
    let ints = raw.as_primitive::<Int64Type>();
    let with_nulls: Int64Array = ints.iter().map(|v| v.filter(|v| *v != i64::MIN)).collect();
    cast(&(Arc::new(with_nulls) as ArrayRef), target).context(ArrowSnafu)
}

/// Floats with missing values as NaN.
pub(crate) fn fill_nan(array: &ArrayRef) -> ArrayRef {
    if array.null_count() == 0 {
        return array.clone();
    }
    match array.data_type() {
        DataType::Float32 => Arc::new(Float32Array::from_iter_values(
            array.as_primitive::<Float32Type>().iter().map(|v| v.unwrap_or(f32::NAN)),
        )),
        _ => Arc::new(Float64Array::from_iter_values(
            array.as_primitive::<Float64Type>().iter().map(|v| v.unwrap_or(f64::NAN)),
        )),
    }
}

/// Complex values as packed little-endian `(re, im)` pairs.
pub(crate) fn complex_to_storage(array: &ArrayRef) -> ArrayRef {
    let list = array.as_fixed_size_list();
    let width = match list.value_type() {
        DataType::Float32 => 4,
        _ => 8,
    };
    let mut buf = MutableBuffer::new(list.len() * width * 2);
    for i in 0..list.len() {
        let pair = list.value(i);
        for j in 0..2 {
            if width == 4 {
                let v = pair.as_primitive::<Float32Type>();
                let x = if list.is_null(i) || v.is_null(j) { f32::NAN } else { v.value(j) };
                buf.extend_from_slice(&x.to_le_bytes());
            } else {
                let v = pair.as_primitive::<Float64Type>();
                let x = if list.is_null(i) || v.is_null(j) { f64::NAN } else { v.value(j) };
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    Arc::new(FixedSizeBinaryArray::new((width * 2) as i32, buf.into(), None))
}

/// Reverse of [`complex_to_storage`].
pub(crate) fn complex_from_storage(raw: &ArrayRef) -> StoreResult<ArrayRef> {
    let bytes = raw.as_fixed_size_binary();
    let width = bytes.value_length() as usize / 2;
    let n = bytes.len();
    let values: ArrayRef = if width == 4 {
        Arc::new(Float32Array::from_iter_values((0..n).flat_map(|i| {
            let v = bytes.value(i);
            [0, 1].map(|j| f32::from_le_bytes([v[j * 4], v[j * 4 + 1], v[j * 4 + 2], v[j * 4 + 3]]))
        })))
    } else {
        Arc::new(Float64Array::from_iter_values((0..n).flat_map(|i| {
            let v = bytes.value(i);
            [0, 1].map(|j| {
                let mut b = [0u8; 8];
                b.copy_from_slice(&v[j * 8..j * 8 + 8]);
                f64::from_le_bytes(b)
            })
        })))
    };
    let field = Arc::new(Field::new("item", values.data_type().clone(), false));
    let list = FixedSizeListArray::try_new(field, 2, values, None).context(ArrowSnafu)?;
    Ok(Arc::new(list))
}

/// Raw bytes of an atom-typed array, one `itemsize` slot per row.
fn raw_bytes(array: &ArrayRef, atom: Atom) -> Vec<u8> {
    if atom == Atom::Bool {
        return array
            .as_boolean()
            .iter()
            .map(|v| u8::from(v.unwrap_or(false)))
            .collect();
    }
    let width = atom.itemsize();
    let data = array.to_data();
    let start = data.offset() * width;
    data.buffers()[0].as_slice()[start..start + data.len() * width].to_vec()
}

/// Pack atom-typed item arrays into one fixed-width record per row.
pub(crate) fn pack(items: &[ArrayRef], atom: Atom) -> ArrayRef {
    let width = atom.itemsize();
    let rows = items.first().map_or(0, |a| a.len());
    let sources: Vec<Vec<u8>> = items.iter().map(|a| raw_bytes(a, atom)).collect();
    let mut buf = MutableBuffer::new(rows * width * items.len());
    for r in 0..rows {
        for src in &sources {
            buf.extend_from_slice(&src[r * width..(r + 1) * width]);
        }
    }
    Arc::new(FixedSizeBinaryArray::new(
        (width * items.len()) as i32,
        buf.into(),
        None,
    ))
}

/// Split packed records back into `items` atom-typed arrays.
pub(crate) fn unpack(packed: &ArrayRef, atom: Atom, items: usize) -> StoreResult<Vec<ArrayRef>> {
    let packed = packed.as_fixed_size_binary();
    let width = atom.itemsize();
    let rows = packed.len();
    let mut out = Vec::with_capacity(items);
    for j in 0..items {
        let mut buf = MutableBuffer::new(rows * width);
        for r in 0..rows {
            buf.extend_from_slice(&packed.value(r)[j * width..(j + 1) * width]);
        }
        out.push(atom_array(buf.into(), atom, rows)?);
    }
    Ok(out)
}

fn atom_array(buffer: Buffer, atom: Atom, rows: usize) -> StoreResult<ArrayRef> {
    if atom == Atom::Bool {
        return Ok(Arc::new(BooleanArray::from_iter(
            buffer.as_slice().iter().map(|b| Some(*b != 0)),
        )));
    }
    let data = ArrayData::builder(atom.arrow_type())
        .len(rows)
        .add_buffer(buffer)
        .build()
        .context(ArrowSnafu)?;
    Ok(make_array(data))
}

/// Categorical codes as plain integers, missing values as `-1`.
pub(crate) fn codes_to_storage(array: &ArrayRef) -> StoreResult<ArrayRef> {
    let DataType::Dictionary(key, _) = array.data_type() else {
        return Ok(array.clone());
    };
    let dict = array.as_any_dictionary();
    let keys = cast(&make_array(dict.keys().to_data()), &DataType::Int64).context(ArrowSnafu)?;
    let filled: Int64Array = keys
        .as_primitive::<Int64Type>()
        .iter()
        .map(|v| Some(v.unwrap_or(-1)))
        .collect();
    cast(&(Arc::new(filled) as ArrayRef), key).context(ArrowSnafu)
}
