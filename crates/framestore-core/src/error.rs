//! Error types for store operations.
//!
//! [`StoreError`] covers everything above the container layer. Each variant
//! belongs to exactly one [`ErrorKind`] so callers can branch on the
//! category without matching every variant. Container faults are wrapped
//! as [`StoreError::Container`]; a missing node reports `NotFound`.

use snafu::prelude::*;

use crate::config::ParseOptionError;
use crate::container::ContainerError;
use crate::frame::FrameError;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown key, column or node.
    NotFound,
    /// Appended data does not fit the persisted schema.
    SchemaConflict,
    /// The operation is not available for this object or layout.
    UnsupportedOperation,
    /// The predicate references unknown fields or rows.
    InvalidPredicate,
    /// The session is closed or cannot be reopened as requested.
    ResourceState,
    /// The in-memory data cannot be mapped to an on-disk representation.
    Serialization,
    /// Failure in the underlying container.
    Storage,
}

/// Errors from store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Failure in the node container.
    #[snafu(display("container error: {source}"))]
    Container {
        /// Underlying container error.
        #[snafu(source, backtrace)]
        source: ContainerError,
    },

    /// An in-memory object could not be assembled.
    #[snafu(display("frame error: {source}"))]
    Frame {
        /// Underlying frame error.
        source: FrameError,
    },

    /// An option value could not be parsed.
    #[snafu(display("invalid option: {source}"))]
    InvalidOption {
        /// Underlying parse error.
        source: ParseOptionError,
    },

    /// No object is stored under the key.
    #[snafu(display("No object named {key} in the file"))]
    KeyNotFound {
        /// Requested key.
        key: String,
    },

    /// A keyless read found no stored object.
    #[snafu(display("No dataset found in [{path}]"))]
    NoObjects {
        /// Container path.
        path: String,
    },

    /// A keyless read found more than one stored object.
    #[snafu(display("key must be provided when [{path}] contains multiple objects ({count} found)"))]
    KeyRequired {
        /// Container path.
        path: String,
        /// Number of stored objects.
        count: usize,
    },

    /// The column is not part of the stored table.
    #[snafu(display("column [{column}] not found in the table [{key}]"))]
    ColumnNotFound {
        /// Table key.
        key: String,
        /// Requested column.
        column: String,
    },

    /// The persisted metadata of an object is incomplete.
    #[snafu(display("object [{key}] is corrupt: {reason}"))]
    Corrupt {
        /// Object key.
        key: String,
        /// What is missing or inconsistent.
        reason: String,
    },

    /// The store has been closed.
    #[snafu(display("{path} file is not open!"))]
    Closed {
        /// Store path.
        path: String,
    },

    /// Reopening an open store in a truncating mode.
    #[snafu(display(
        "Re-opening the file [{path}] with mode [{mode}] will delete the current file!"
    ))]
    PossibleDataLoss {
        /// Store path.
        path: String,
        /// Requested mode.
        mode: String,
    },

    /// A persisted column and its appended counterpart differ in kind.
    #[snafu(display("incompatible kind in col [{existing} - {new}]"))]
    IncompatibleKind {
        /// Persisted kind.
        existing: String,
        /// Kind derived from the appended data.
        new: String,
    },

    /// A value block's item labels differ from the persisted ones.
    #[snafu(display("appended items do not match existing items in table!"))]
    ItemsMismatch {
        /// Column name.
        column: String,
    },

    /// A value block's dtype differs from the persisted one.
    #[snafu(display("appended items dtype do not match existing items dtype in table!"))]
    DtypeMismatch {
        /// Column name.
        column: String,
        /// Persisted dtype.
        existing: String,
        /// Appended dtype.
        new: String,
    },

    /// A string does not fit the persisted column width.
    #[snafu(display(
        "Trying to store a string with len [{required}] in [{column}] column but\nthis column has a limit of [{limit}]!\nConsider using min_itemsize to preset the sizes on these columns"
    ))]
    StringTooNarrow {
        /// Column name.
        column: String,
        /// Width the appended strings need.
        required: usize,
        /// Persisted width.
        limit: usize,
    },

    /// A categorical's categories differ from the persisted ones.
    #[snafu(display(
        "cannot append a categorical with different categories to the existing [{column}]"
    ))]
    CategoriesMismatch {
        /// Column name.
        column: String,
    },

    /// Table structure (type or axes) differs from the persisted table.
    #[snafu(display(
        "invalid combination of [{what}] on appending data [{new}] vs current table [{existing}]"
    ))]
    InvalidCombination {
        /// Which part of the structure differs.
        what: String,
        /// Appended structure.
        new: String,
        /// Persisted structure.
        existing: String,
    },

    /// An appended value block could not be matched to a persisted block.
    #[snafu(display("cannot match existing table structure for [{items}] on appending data"))]
    StructureMismatch {
        /// Item labels of the unmatched block.
        items: String,
    },

    /// A per-axis annotation conflicts with the persisted one.
    #[snafu(display(
        "invalid info for [{column}] for [{key}], existing_value [{existing}] conflicts with new value [{new}]"
    ))]
    InfoConflict {
        /// Column name.
        column: String,
        /// Annotation key.
        key: String,
        /// Persisted value.
        existing: String,
        /// New value.
        new: String,
    },

    /// Multi-level row labels whose names collide with each other or a column.
    #[snafu(display("duplicate names/columns in the multi-index when storing as a table"))]
    DuplicateLevelNames,

    /// A `min_itemsize` key names neither a queryable field nor `values`.
    #[snafu(display("min_itemsize has the key [{key}] which is not an axis or data_column"))]
    InvalidMinItemsize {
        /// Offending key.
        key: String,
    },

    /// Tables with different row counts combined in one selection.
    #[snafu(display("all tables must have exactly the same nrows!"))]
    RowCountMismatch,

    /// Column selection or predicate against a fixed-layout object.
    #[snafu(display(
        "cannot pass a where or columns specification when reading a fixed format store. this store must be selected in its entirety"
    ))]
    FixedSelection,

    /// Append to an object that is not a table.
    #[snafu(display("Can only append to Tables"))]
    AppendToFixed,

    /// Categorical data written in the fixed layout.
    #[snafu(display(
        "Cannot store a category dtype in a fixed format dataset [{column}]. Use format=table."
    ))]
    CategoricalFixed {
        /// Column or index name.
        column: String,
    },

    /// A column that is neither an index column nor a data column.
    #[snafu(display("column [{column}] can not be extracted individually; it is not data indexable"))]
    NotExtractable {
        /// Column name.
        column: String,
    },

    /// Index requested on a complex-valued column.
    #[snafu(display(
        "Columns containing complex values can be stored but cannot be indexed when using table format. Either use fixed format, set index=False, or do not include the columns containing complex values to data_columns when initializing the table."
    ))]
    ComplexIndex {
        /// Column name.
        column: String,
    },

    /// Data columns requested with multi-level column labels.
    #[snafu(display("cannot use a multi-index on axis [1] with data_columns {columns}"))]
    MultiIndexDataColumns {
        /// Requested data columns.
        columns: String,
    },

    /// A promoted column whose label is not a string.
    #[snafu(display("cannot have non-object label DataIndexableCol [{label}]"))]
    NonStringDataColumn {
        /// Offending label.
        label: String,
    },

    /// Fixed-layout frames need unique column labels.
    #[snafu(display("Columns index has to be unique for fixed format"))]
    NonUniqueColumns,

    /// Any other operation the object or layout does not support.
    #[snafu(display("{message}"))]
    Unsupported {
        /// Description of the rejected operation.
        message: String,
    },

    /// A predicate referenced a field that is not queryable.
    #[snafu(display(
        "The passed where expression contains an invalid variable reference [{field}]; all of the variable references must be a reference to an axis (e.g. 'index' or 'columns'), or a data_column. The currently defined references are: {queryables}"
    ))]
    UnknownField {
        /// Offending field.
        field: String,
        /// Comma-separated queryable fields.
        queryables: String,
    },

    /// A predicate operand cannot be compared with the field.
    #[snafu(display("cannot compare [{field}] with {operand}: {reason}"))]
    InvalidOperand {
        /// Field name.
        field: String,
        /// Operand description.
        operand: String,
        /// Why it cannot be compared.
        reason: String,
    },

    /// A row-level filter term combined with something other than `&`.
    #[snafu(display("filter on [{field}] can only be combined with other terms using '&'"))]
    NonConjunctiveFilter {
        /// Field of the filter term.
        field: String,
    },

    /// Explicit coordinates outside the addressed range.
    #[snafu(display("where must have index locations >= start and < stop ({start}..{stop}), got {coordinate}"))]
    CoordinateOutOfRange {
        /// Offending coordinate.
        coordinate: i64,
        /// Start of the range.
        start: u64,
        /// End of the range.
        stop: u64,
    },

    /// A boolean mask of the wrong length.
    #[snafu(display("boolean mask has length {len}, expected {expected}"))]
    MaskLength {
        /// Mask length.
        len: usize,
        /// Rows in the addressed range.
        expected: usize,
    },

    /// An in-memory type with no on-disk representation.
    #[snafu(display(
        "Cannot serialize the column [{column}] because its data contents are [{data_type}] object dtype"
    ))]
    UnmappableType {
        /// Column name.
        column: String,
        /// Arrow type of the column.
        data_type: String,
    },

    /// Calendar dates cannot be table columns.
    #[snafu(display("[date] is not implemented as a table column"))]
    DateColumn {
        /// Column name.
        column: String,
    },

    /// Missing values in a column kind that cannot represent them.
    #[snafu(display("cannot store missing values in [{column}] of kind {kind}"))]
    MissingValues {
        /// Column name.
        column: String,
        /// Column kind.
        kind: String,
    },

    /// An arrow kernel failed while converting stored or incoming values.
    #[snafu(display("arrow error: {source}"))]
    Arrow {
        /// Underlying arrow error.
        source: arrow::error::ArrowError,
    },

    /// A string could not be encoded or decoded.
    #[snafu(display("'{encoding}' codec can't {action} [{value}]"))]
    Codec {
        /// Encoding name.
        encoding: String,
        /// `encode` or `decode`.
        action: &'static str,
        /// Offending value.
        value: String,
    },

    /// Unknown string encoding or error policy.
    #[snafu(display("unknown {what} [{value}]"))]
    UnknownEncoding {
        /// `encoding` or `errors`.
        what: &'static str,
        /// Rejected value.
        value: String,
    },
}

impl StoreError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        use StoreError::*;
        match self {
            Container { source } => match source {
                ContainerError::NodeNotFound { .. } | ContainerError::MissingContainer { .. } => {
                    ErrorKind::NotFound
                }
                ContainerError::ReadOnly { .. } => ErrorKind::ResourceState,
                _ => ErrorKind::Storage,
            },
            Corrupt { .. } => ErrorKind::Storage,
            KeyNotFound { .. } | ColumnNotFound { .. } | NoObjects { .. } => ErrorKind::NotFound,
            Closed { .. } | PossibleDataLoss { .. } => ErrorKind::ResourceState,
            IncompatibleKind { .. }
            | ItemsMismatch { .. }
            | DtypeMismatch { .. }
            | StringTooNarrow { .. }
            | CategoriesMismatch { .. }
            | InvalidCombination { .. }
            | StructureMismatch { .. }
            | InfoConflict { .. }
            | DuplicateLevelNames
            | InvalidMinItemsize { .. }
            | RowCountMismatch => ErrorKind::SchemaConflict,
            InvalidOption { .. }
            | FixedSelection
            | AppendToFixed
            | CategoricalFixed { .. }
            | NotExtractable { .. }
            | ComplexIndex { .. }
            | MultiIndexDataColumns { .. }
            | NonStringDataColumn { .. }
            | NonUniqueColumns
            | KeyRequired { .. }
            | Unsupported { .. } => ErrorKind::UnsupportedOperation,
            UnknownField { .. }
            | InvalidOperand { .. }
            | NonConjunctiveFilter { .. }
            | CoordinateOutOfRange { .. }
            | MaskLength { .. } => ErrorKind::InvalidPredicate,
            Frame { .. }
            | UnmappableType { .. }
            | DateColumn { .. }
            | MissingValues { .. }
            | Codec { .. }
            | Arrow { .. }
            | UnknownEncoding { .. } => ErrorKind::Serialization,
        }
    }
}

impl From<ContainerError> for StoreError {
    fn from(source: ContainerError) -> Self {
        StoreError::Container { source }
    }
}

impl From<FrameError> for StoreError {
    fn from(source: FrameError) -> Self {
        StoreError::Frame { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_nodes_are_not_found() {
        let err = StoreError::from(ContainerError::NodeNotFound {
            path: "/x".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn narrow_string_message_names_both_sizes() {
        let err = StoreError::StringTooNarrow {
            column: "values_block_0".to_string(),
            required: 10,
            limit: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("len [10]"));
        assert!(msg.contains("limit of [5]"));
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    }

    #[test]
    fn kernel_failures_are_serialization_errors() {
        let failed: Result<(), arrow::error::ArrowError> =
            Err(arrow::error::ArrowError::CastError("Utf8 to Int64".to_string()));
        let err = failed.context(ArrowSnafu).err();
        assert!(err.as_ref().is_some_and(|e| e.to_string().contains("Utf8 to Int64")));
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Serialization));
    }
}
