//! Index and data column descriptors.

use arrow::array::ArrayRef;
use snafu::prelude::*;

use super::attrs::ColumnAttrs;
use super::codec::{StringCodec, pack, unpack};
use super::convert::{Decode, categories_of, decode_array, encode_arrays};
use super::info::{AxisInfo, InfoKey, InfoMap, update_info};
use super::kind::{Kind, bytes_dtype, dtype_name, timezone};
use super::lifecycle::{Column, Declared};
use crate::container::{Atom, ColumnType, TableField, TableNode};
use crate::error::{
    CategoriesMismatchSnafu, CorruptSnafu, DtypeMismatchSnafu, IncompatibleKindSnafu, ItemsMismatchSnafu,
    StoreResult, UnmappableTypeSnafu,
};
use crate::frame::{Label, is_categorical};

fn persisted_field<'a>(table: &'a TableNode, cname: &str) -> StoreResult<(usize, &'a TableField)> {
    table.field(cname).context(CorruptSnafu {
        key: table.path().to_string(),
        reason: format!("no field for column {cname}"),
    })
}

/// A row-key column: one field holding the labels of an index axis.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCol {
    /// Logical name.
    pub name: String,
    /// On-disk field name.
    pub cname: String,
    /// Axis of the object the labels came from.
    pub axis: usize,
    /// Field position in the row layout.
    pub pos: usize,
    /// Coarse type.
    pub kind: Kind,
    /// On-disk field type.
    pub column_type: ColumnType,
    /// Frequency of a regular index.
    pub freq: Option<String>,
    /// Timezone of timestamp labels.
    pub tz: Option<String>,
    /// Name of the source index.
    pub index_name: Option<String>,
}

impl IndexCol {
    /// Declare the column for one level of incoming labels.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn declare(
        name: &str,
        axis: usize,
        labels: &ArrayRef,
        freq: Option<String>,
        index_name: Option<String>,
        codec: &StringCodec,
        min_itemsize: Option<usize>,
        existing: Option<&IndexCol>,
    ) -> StoreResult<Declared<IndexCol>> {
        if is_categorical(labels.data_type()) {
            return UnmappableTypeSnafu {
                column: name,
                data_type: labels.data_type().to_string(),
            }
            .fail();
        }
        let encoded = encode_arrays(
            name,
            std::slice::from_ref(labels),
            codec,
            min_itemsize,
            existing.map(|c| c.column_type.atom),
        )?;
        let values = encoded.items.into_iter().next().unwrap_or_else(|| labels.clone());
        let column = IndexCol {
            name: name.to_string(),
            cname: name.to_string(),
            axis,
            pos: 0,
            kind: Kind::of(labels.data_type()),
            column_type: ColumnType::scalar(encoded.atom),
            freq,
            tz: timezone(labels.data_type()),
            index_name,
        };
        Ok(Declared::new(column, values))
    }

    /// Rebuild the descriptor of a persisted index column.
    pub(crate) fn infer(
        table: &TableNode,
        name: &str,
        axis: usize,
        attrs: &ColumnAttrs,
        info: &InfoMap,
    ) -> StoreResult<IndexCol> {
        let (pos, field) = persisted_field(table, name)?;
        let AxisInfo {
            freq, tz, index_name, ..
        } = info.get(name).cloned().unwrap_or_default();
        Ok(IndexCol {
            name: name.to_string(),
            cname: name.to_string(),
            axis,
            pos,
            kind: attrs.kind(table.path(), name)?,
            column_type: field.column_type,
            freq,
            tz,
            index_name,
        })
    }

    /// Convert stored labels back to their in-memory type.
    pub fn convert(&self, raw: &ArrayRef, codec: &StringCodec) -> StoreResult<ArrayRef> {
        decode_array(
            raw,
            Decode {
                kind: self.kind,
                dtype: "",
                tz: self.tz.as_deref(),
                categories: None,
            },
            codec,
        )
    }

    /// Item size of a string column.
    pub fn itemsize(&self) -> Option<usize> {
        match self.column_type.atom {
            Atom::Bytes(n) => Some(n),
            _ => None,
        }
    }
}

impl Column for IndexCol {
    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn validate_against(&self, existing: &Self) -> StoreResult<()> {
        ensure!(
            self.kind == existing.kind,
            IncompatibleKindSnafu {
                existing: existing.kind.as_str(),
                new: self.kind.as_str(),
            }
        );
        Ok(())
    }

    fn update_info(&mut self, info: &mut InfoMap) -> StoreResult<()> {
        self.freq = update_info(info, &self.name, InfoKey::Freq, self.freq.take())?;
        self.tz = update_info(info, &self.name, InfoKey::Tz, self.tz.take())?;
        self.index_name = update_info(info, &self.name, InfoKey::IndexName, self.index_name.take())?;
        Ok(())
    }
}

/// A value column: one field holding a block of same-typed columns.
///
/// Blocks of several columns are shaped fields; a promoted data column is
/// a scalar field holding exactly one column.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCol {
    /// Logical name (`values_block_{i}` or the promoted column label).
    pub name: String,
    /// On-disk field name.
    pub cname: String,
    /// Field position in the row layout.
    pub pos: usize,
    /// Coarse type.
    pub kind: Kind,
    /// On-disk field type.
    pub column_type: ColumnType,
    /// In-memory dtype name.
    pub dtype: String,
    /// Column labels held by the block.
    pub items: Vec<Label>,
    /// `category` for categorical blocks.
    pub meta: Option<String>,
    /// Timezone of timestamp values.
    pub tz: Option<String>,
    /// True for promoted, independently queryable columns.
    pub data_indexable: bool,
    /// Category list of a categorical block.
    pub categories: Option<ArrayRef>,
}

/// Meta tag of categorical blocks.
pub const CATEGORY_META: &str = "category";

impl DataCol {
    /// Declare the column for a block of same-typed arrays.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn declare(
        name: &str,
        items: Vec<Label>,
        arrays: &[ArrayRef],
        data_indexable: bool,
        codec: &StringCodec,
        min_itemsize: Option<usize>,
        existing: Option<&DataCol>,
    ) -> StoreResult<Declared<DataCol>> {
        let encoded = encode_arrays(
            name,
            arrays,
            codec,
            min_itemsize,
            existing.map(|c| c.column_type.atom),
        )?;
        let data_type = arrays
            .first()
            .map(|a| a.data_type().clone())
            .unwrap_or(arrow::datatypes::DataType::Null);
        let kind = Kind::of(&data_type);
        let dtype = match encoded.atom {
            Atom::Bytes(n) if kind == Kind::String => bytes_dtype(n),
            _ => dtype_name(&data_type),
        };
        let categorical = is_categorical(&data_type);

        let (column_type, values) = if data_indexable && encoded.items.len() == 1 {
            let values = encoded.items.into_iter().next().unwrap_or_else(|| arrays[0].clone());
            (ColumnType::scalar(encoded.atom), values)
        } else {
            (
                ColumnType::shaped(encoded.atom, encoded.items.len()),
                pack(&encoded.items, encoded.atom),
            )
        };

        let column = DataCol {
            name: name.to_string(),
            cname: name.to_string(),
            pos: 0,
            kind,
            column_type,
            dtype,
            items,
            meta: categorical.then(|| CATEGORY_META.to_string()),
            tz: timezone(&data_type),
            data_indexable,
            categories: if categorical { arrays.first().and_then(categories_of) } else { None },
        };
        Ok(Declared::new(column, values))
    }

    /// Rebuild the descriptor of a persisted value column.
    ///
    /// `categories` is the category list read from the metadata side-table
    /// of a categorical column.
    pub(crate) fn infer(
        table: &TableNode,
        name: &str,
        data_indexable: bool,
        attrs: &ColumnAttrs,
        info: &InfoMap,
        categories: Option<ArrayRef>,
    ) -> StoreResult<DataCol> {
        let (pos, field) = persisted_field(table, name)?;
        let dtype = attrs.dtype(table.path(), name)?;
        Ok(DataCol {
            name: name.to_string(),
            cname: name.to_string(),
            pos,
            kind: Kind::from_dtype(&dtype),
            column_type: field.column_type,
            dtype,
            items: attrs.items(table.path(), name)?,
            meta: attrs.meta(table.path(), name)?,
            tz: info.get(name).and_then(|i| i.tz.clone()),
            data_indexable,
            categories,
        })
    }

    /// True for categorical blocks.
    pub fn is_categorical(&self) -> bool {
        self.meta.as_deref() == Some(CATEGORY_META)
    }

    /// Convert a stored field back into one array per item.
    pub fn convert(&self, raw: &ArrayRef, codec: &StringCodec) -> StoreResult<Vec<ArrayRef>> {
        let parts = match self.column_type.shape {
            Some(n) => unpack(raw, self.column_type.atom, n)?,
            None => vec![raw.clone()],
        };
        let how = Decode {
            kind: self.kind,
            dtype: &self.dtype,
            tz: self.tz.as_deref(),
            categories: self.categories.as_ref(),
        };
        parts.iter().map(|p| decode_array(p, how, codec)).collect()
    }

    /// Item size of a string block.
    pub fn itemsize(&self) -> Option<usize> {
        match self.column_type.atom {
            Atom::Bytes(n) => Some(n),
            _ => None,
        }
    }
}

impl Column for DataCol {
    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn validate_against(&self, existing: &Self) -> StoreResult<()> {
        ensure!(
            self.kind == existing.kind,
            IncompatibleKindSnafu {
                existing: existing.kind.as_str(),
                new: self.kind.as_str(),
            }
        );
        ensure!(
            self.items == existing.items,
            ItemsMismatchSnafu { column: &self.cname }
        );
        ensure!(
            self.dtype == existing.dtype,
            DtypeMismatchSnafu {
                column: &self.cname,
                existing: &existing.dtype,
                new: &self.dtype,
            }
        );
        if let (Some(new), Some(old)) = (&self.categories, &existing.categories) {
            ensure!(new == old, CategoriesMismatchSnafu { column: &self.cname });
        }
        Ok(())
    }

    fn update_info(&mut self, info: &mut InfoMap) -> StoreResult<()> {
        self.tz = update_info(info, &self.name, InfoKey::Tz, self.tz.take())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StoreError};
    use arrow::array::{Array, AsArray, DictionaryArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Int8Type;
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn codec() -> StoreResult<StringCodec> {
        StringCodec::new("nan", "UTF-8", "strict")
    }

    #[test]
    fn value_blocks_round_trip_through_shaped_fields() -> TestResult {
        let a: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 2.0]));
        let b: ArrayRef = Arc::new(Float64Array::from(vec![3.0, 4.0]));
        let declared = DataCol::declare(
            "values_block_0",
            vec![Label::from("a"), Label::from("b")],
            &[a.clone(), b.clone()],
            false,
            &codec()?,
            None,
            None,
        )?;
        let bound = declared.bind(1);
        let mut info = InfoMap::new();
        let (col, raw) = bound.validate(None, &mut info)?.into_parts();
        assert_eq!(col.pos, 1);
        assert_eq!(col.column_type, ColumnType::shaped(Atom::Float64, 2));
        assert_eq!(col.dtype, "float64");
        assert_eq!(col.convert(&raw, &codec()?)?, vec![a, b]);
        Ok(())
    }

    #[test]
    fn appended_dtype_must_match() -> TestResult {
        let floats: ArrayRef = Arc::new(Float64Array::from(vec![1.0]));
        let ints: ArrayRef = Arc::new(Int64Array::from(vec![1]));
        let items = vec![Label::from("a")];
        let existing = DataCol::declare("values_block_0", items.clone(), &[floats], false, &codec()?, None, None)?
            .column()
            .clone();
        let err = DataCol::declare("values_block_0", items, &[ints], false, &codec()?, None, Some(&existing))?
            .bind(1)
            .validate(Some(&existing), &mut InfoMap::new())
            .err();
        assert!(matches!(err, Some(StoreError::IncompatibleKind { .. })));
        Ok(())
    }

    #[test]
    fn categories_must_match_on_append() -> TestResult {
        let make = |cats: Vec<&str>| -> Result<ArrayRef, Box<dyn std::error::Error>> {
            let keys = arrow::array::Int8Array::from(vec![0, 1]);
            let values = Arc::new(StringArray::from(cats));
            Ok(Arc::new(DictionaryArray::<Int8Type>::try_new(keys, values)?))
        };
        let items = vec![Label::from("c")];
        let first = DataCol::declare("c", items.clone(), &[make(vec!["x", "y"])?], true, &codec()?, None, None)?;
        let existing = first.column().clone();
        assert!(existing.is_categorical());

        let err = DataCol::declare("c", items, &[make(vec!["x", "z"])?], true, &codec()?, None, Some(&existing))?
            .bind(1)
            .validate(Some(&existing), &mut InfoMap::new())
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::SchemaConflict));
        Ok(())
    }

    #[test]
    fn string_index_decodes_with_sentinel() -> TestResult {
        let labels: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None]));
        let declared = IndexCol::declare("index", 0, &labels, None, None, &codec()?, None, None)?;
        let (col, raw) = declared.bind(0).validate(None, &mut InfoMap::new())?.into_parts();
        assert_eq!(col.itemsize(), Some(3));
        let back = col.convert(&raw, &codec()?)?;
        assert_eq!(back.as_string::<i32>().value(0), "a");
        assert!(back.is_null(1));
        Ok(())
    }
}
