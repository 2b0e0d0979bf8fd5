//! Value conversion shared by index and data columns.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, DictionaryArray, Int64Array};
use arrow::compute::{cast, filter};
use arrow::datatypes::{DataType, Int64Type, TimeUnit};
use snafu::prelude::*;

use super::codec::{
    StringCodec, codes_to_storage, complex_from_storage, complex_to_storage,
    fill_nan, max_len, nanos_from_storage, nanos_to_storage,
};
use super::kind::{Kind, dtype_to_arrow};
use crate::container::Atom;
use crate::error::{
    ArrowSnafu, DateColumnSnafu, MissingValuesSnafu, StoreResult, StringTooNarrowSnafu, UnmappableTypeSnafu,
};
use crate::frame::is_categorical;

/// Atom-typed values ready to be written into table fields.
#[derive(Debug)]
pub(crate) struct Encoded {
    pub atom: Atom,
    pub items: Vec<ArrayRef>,
}

/// Width for a string column: the widest value raised to `min_itemsize`,
/// bounded by an existing column's width.
pub(crate) fn string_itemsize(
    cname: &str,
    required: usize,
    min_itemsize: Option<usize>,
    existing: Option<usize>,
) -> StoreResult<usize> {
    let itemsize = required.max(min_itemsize.unwrap_or(0));
    match existing {
        Some(limit) if itemsize > limit => StringTooNarrowSnafu {
            column: cname,
            required: itemsize,
            limit,
        }
        .fail(),
        Some(limit) => Ok(limit),
        None => Ok(itemsize),
    }
}

/// Convert same-typed in-memory arrays to atom-typed on-disk values.
pub(crate) fn encode_arrays(
    cname: &str,
    arrays: &[ArrayRef],
    codec: &StringCodec,
    min_itemsize: Option<usize>,
    existing: Option<Atom>,
) -> StoreResult<Encoded> {
    let Some(first) = arrays.first() else {
        return UnmappableTypeSnafu {
            column: cname,
            data_type: "empty block",
        }
        .fail();
    };
    let data_type = first.data_type();
    let unmappable = || UnmappableTypeSnafu {
        column: cname,
        data_type: data_type.to_string(),
    };
    let no_missing = |kind: Kind| {
        for a in arrays {
            if a.null_count() > 0 {
                return MissingValuesSnafu {
                    column: cname,
                    kind: kind.as_str(),
                }
                .fail();
            }
        }
        Ok(())
    };

    if is_categorical(data_type) {
        let DataType::Dictionary(key, _) = data_type else {
            return unmappable().fail();
        };
        let atom = Atom::from_numeric(key).context(unmappable())?;
        let items = arrays.iter().map(codes_to_storage).collect::<StoreResult<_>>()?;
        return Ok(Encoded { atom, items });
    }

    match Kind::of(data_type) {
        Kind::String => {
            let encoded = arrays
                .iter()
                .map(|a| codec.encode_all(a))
                .collect::<StoreResult<Vec<_>>>()?;
            let required = encoded.iter().map(|e| max_len(e)).max().unwrap_or(1);
            let existing = match existing {
                Some(Atom::Bytes(n)) => Some(n),
                _ => None,
            };
            let itemsize = string_itemsize(cname, required, min_itemsize, existing)?;
            let items = encoded
                .iter()
                .map(|e| Arc::new(codec.to_fixed(e, itemsize)) as ArrayRef)
                .collect();
            Ok(Encoded {
                atom: Atom::Bytes(itemsize),
                items,
            })
        }
        Kind::Integer | Kind::Bool => {
            no_missing(Kind::of(data_type))?;
            let atom = Atom::from_numeric(data_type).context(unmappable())?;
            Ok(Encoded {
                atom,
                items: arrays.to_vec(),
            })
        }
        Kind::Float => {
            let atom = Atom::from_numeric(data_type).context(unmappable())?;
            Ok(Encoded {
                atom,
                items: arrays.iter().map(fill_nan).collect(),
            })
        }
        Kind::Datetime64 | Kind::Timedelta64 => Ok(Encoded {
            atom: Atom::Int64,
            items: arrays.iter().map(nanos_to_storage).collect::<StoreResult<_>>()?,
        }),
        Kind::Complex => {
            let items: Vec<ArrayRef> = arrays.iter().map(complex_to_storage).collect();
            let width = match items.first().map(|a| a.data_type()) {
                Some(DataType::FixedSizeBinary(w)) => *w as usize,
                _ => 16,
            };
            Ok(Encoded {
                atom: Atom::Complex(width),
                items,
            })
        }
        Kind::Date => DateColumnSnafu { column: cname }.fail(),
        Kind::Object => unmappable().fail(),
    }
}

/// How a persisted column maps back to memory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Decode<'a> {
    pub kind: Kind,
    pub dtype: &'a str,
    pub tz: Option<&'a str>,
    pub categories: Option<&'a ArrayRef>,
}

/// Convert atom-typed on-disk values back to their in-memory type.
pub(crate) fn decode_array(raw: &ArrayRef, how: Decode<'_>, codec: &StringCodec) -> StoreResult<ArrayRef> {
    if let Some(categories) = how.categories {
        return categorical(raw, categories);
    }
    match how.kind {
        Kind::String => codec.decode_fixed(raw),
        Kind::Datetime64 => nanos_from_storage(
            raw,
            &DataType::Timestamp(TimeUnit::Nanosecond, how.tz.map(Into::into)),
        ),
        Kind::Timedelta64 => nanos_from_storage(raw, &DataType::Duration(TimeUnit::Nanosecond)),
        Kind::Complex => complex_from_storage(raw),
        _ => match dtype_to_arrow(how.dtype, how.tz) {
            Some(target) if &target != raw.data_type() => {
                cast(raw, &target).context(ArrowSnafu)
            }
            _ => Ok(raw.clone()),
        },
    }
}

/// Rebuild a categorical from codes and its category list.
///
/// Missing categories are dropped and the codes remapped; codes pointing at
/// a dropped category, or `-1`, become missing.
fn categorical(codes: &ArrayRef, categories: &ArrayRef) -> StoreResult<ArrayRef> {
    let key_type = codes.data_type().clone();
    let wide = cast(codes, &DataType::Int64).context(ArrowSnafu)?;
    let wide = wide.as_primitive::<Int64Type>();

    let (values, remap): (ArrayRef, Option<Vec<Option<i64>>>) = if categories.null_count() > 0 {
        let keep = BooleanArray::from_iter((0..categories.len()).map(|i| Some(categories.is_valid(i))));
        let mut next = 0i64;
        let remap = (0..categories.len())
            .map(|i| {
                categories.is_valid(i).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        (filter(categories.as_ref(), &keep).context(ArrowSnafu)?, Some(remap))
    } else {
        (categories.clone(), None)
    };

    let keys: Int64Array = wide
        .iter()
        .map(|c| {
            let c = c.filter(|c| *c >= 0)?;
            match &remap {
                Some(m) => m.get(c as usize).copied().flatten(),
                None => Some(c),
            }
        })
        .collect();
    let dict = DictionaryArray::<Int64Type>::try_new(keys, values.clone()).context(ArrowSnafu)?;
    let target = DataType::Dictionary(Box::new(key_type), Box::new(values.data_type().clone()));
    cast(&dict, &target).context(ArrowSnafu)
}

/// Category list of a categorical array.
pub(crate) fn categories_of(array: &ArrayRef) -> Option<ArrayRef> {
    array.as_any_dictionary_opt().map(|d| d.values().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use arrow::array::{Int8Array, StringArray};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn codec() -> StoreResult<StringCodec> {
        StringCodec::new("nan", "UTF-8", "strict")
    }

    #[test]
    fn strings_never_truncate_against_existing_width() -> TestResult {
        let a: ArrayRef = Arc::new(StringArray::from(vec!["abcdefghij"]));
        let err = encode_arrays("col", &[a.clone()], &codec()?, None, Some(Atom::Bytes(5))).err();
        assert!(matches!(
            err,
            Some(crate::error::StoreError::StringTooNarrow {
                required: 10,
                limit: 5,
                ..
            })
        ));
        let ok = encode_arrays("col", &[a], &codec()?, Some(10), None)?;
        assert_eq!(ok.atom, Atom::Bytes(10));
        Ok(())
    }

    #[test]
    fn shorter_strings_take_the_existing_width() -> StoreResult<()> {
        assert_eq!(string_itemsize("c", 3, None, Some(8))?, 8);
        assert_eq!(string_itemsize("c", 3, Some(6), None)?, 6);
        Ok(())
    }

    #[test]
    fn missing_integers_cannot_be_stored() -> StoreResult<()> {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None]));
        let err = encode_arrays("n", &[a], &codec()?, None, None).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Serialization));
        Ok(())
    }

    #[test]
    fn null_categories_are_removed_on_read() -> TestResult {
        let codes: ArrayRef = Arc::new(Int8Array::from(vec![0, 1, 2, -1]));
        let categories: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None, Some("c")]));
        let decoded = decode_array(
            &codes,
            Decode {
                kind: Kind::Integer,
                dtype: "int8",
                tz: None,
                categories: Some(&categories),
            },
            &codec()?,
        )?;
        let dict = decoded.as_any_dictionary();
        assert_eq!(dict.values().len(), 2);
        assert_eq!(decoded.null_count(), 2);
        assert_eq!(
            decoded.data_type(),
            &DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8))
        );
        Ok(())
    }
}
