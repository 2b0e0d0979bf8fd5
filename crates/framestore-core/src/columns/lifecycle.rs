//! Column lifecycle: declared, bound to a layout position, validated.
//!
//! A column built from incoming data starts as [`Declared`]. Binding fixes
//! its position in the row layout; validation checks it against the
//! persisted column of the same name and records its annotations. Only a
//! [`Validated`] column can be written, so skipping a step does not
//! compile.

use arrow::array::ArrayRef;

use super::info::InfoMap;
use crate::error::StoreResult;

/// Behavior shared by index and data column descriptors.
pub(crate) trait Column: Sized {
    /// Record the field position.
    fn set_pos(&mut self, pos: usize);

    /// Check against the persisted column of the same name.
    fn validate_against(&self, existing: &Self) -> StoreResult<()>;

    /// Merge this column's annotations into `info`, adopting any reset.
    fn update_info(&mut self, info: &mut InfoMap) -> StoreResult<()>;
}

/// A column derived from incoming data, not yet placed in a layout.
#[derive(Debug)]
pub(crate) struct Declared<C> {
    column: C,
    values: ArrayRef,
}

/// A column with a fixed layout position.
#[derive(Debug)]
pub(crate) struct Bound<C> {
    column: C,
    values: ArrayRef,
}

/// A column checked against the persisted table and ready to write.
#[derive(Debug)]
pub(crate) struct Validated<C> {
    column: C,
    values: ArrayRef,
}

impl<C: Column> Declared<C> {
    pub(crate) fn new(column: C, values: ArrayRef) -> Self {
        Self { column, values }
    }

    /// The descriptor.
    #[cfg(test)]
    pub(crate) fn column(&self) -> &C {
        &self.column
    }

    /// Place the column at `pos` in the row layout.
    pub(crate) fn bind(mut self, pos: usize) -> Bound<C> {
        self.column.set_pos(pos);
        Bound {
            column: self.column,
            values: self.values,
        }
    }
}

impl<C: Column> Bound<C> {
    /// The descriptor.
    #[cfg(test)]
    pub(crate) fn column(&self) -> &C {
        &self.column
    }

    /// Validate against `existing` and record annotations in `info`.
    pub(crate) fn validate(mut self, existing: Option<&C>, info: &mut InfoMap) -> StoreResult<Validated<C>> {
        if let Some(existing) = existing {
            self.column.validate_against(existing)?;
        }
        self.column.update_info(info)?;
        Ok(Validated {
            column: self.column,
            values: self.values,
        })
    }
}

impl<C> Validated<C> {
    /// The descriptor.
    pub(crate) fn column(&self) -> &C {
        &self.column
    }

    /// Field values in on-disk representation.
    pub(crate) fn values(&self) -> &ArrayRef {
        &self.values
    }

    /// Split into the descriptor and its values.
    pub(crate) fn into_parts(self) -> (C, ArrayRef) {
        (self.column, self.values)
    }
}
