//! Error types for the container layer.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

/// Result type used throughout the container layer.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors produced by the directory-backed node container.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ContainerError {
    /// A filesystem operation failed.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    Io {
        /// Filesystem path involved in the failing operation.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// A node record or attribute payload could not be (de)serialized.
    #[snafu(display("Invalid node record at {path}: {source}"))]
    Json {
        /// Node path whose record failed to (de)serialize.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Reading or writing a parquet payload failed.
    #[snafu(display("Parquet error at {path}: {source}"))]
    Parquet {
        /// File holding the parquet payload.
        path: String,
        /// Underlying parquet error.
        source: ParquetError,
    },

    /// An arrow compute or construction step failed.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying arrow error.
        source: ArrowError,
    },

    /// The root directory does not hold a container.
    #[snafu(display("No container found at {path}"))]
    MissingContainer {
        /// Root directory that was probed.
        path: String,
    },

    /// The root directory exists, is not empty, and is not a container.
    #[snafu(display("Refusing to use {path}: directory is not empty and is not a container"))]
    NotAContainer {
        /// Root directory that was probed.
        path: String,
    },

    /// A node path is malformed.
    #[snafu(display("Invalid node path '{path}': {reason}"))]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// No node exists at the given path.
    #[snafu(display("No node at {path}"))]
    NodeNotFound {
        /// The missing node path.
        path: String,
    },

    /// A node already exists where a new one was requested.
    #[snafu(display("A node already exists at {path}"))]
    NodeExists {
        /// The occupied node path.
        path: String,
    },

    /// The node exists but is of a different kind than the operation needs.
    #[snafu(display("Node {path} is a {actual}, expected a {expected}"))]
    NodeKindMismatch {
        /// The node path.
        path: String,
        /// The kind the operation required.
        expected: String,
        /// The kind that was found.
        actual: String,
    },

    /// The container was opened read-only.
    #[snafu(display("Container at {path} is read-only"))]
    ReadOnly {
        /// Root directory of the container.
        path: String,
    },

    /// Array nodes cannot hold zero rows or zero columns.
    #[snafu(display("Cannot create an empty array at {path}"))]
    EmptyArray {
        /// Node path of the rejected array.
        path: String,
    },

    /// Columns handed to an array node differ in length.
    #[snafu(display("Array columns at {path} have unequal lengths"))]
    RaggedArray {
        /// Node path of the rejected array.
        path: String,
    },

    /// Records handed to a table do not match its row layout.
    #[snafu(display("Records do not match the layout of table {path}: {reason}"))]
    LayoutMismatch {
        /// Node path of the table.
        path: String,
        /// Description of the first difference found.
        reason: String,
    },

    /// A field named in a read or condition is not part of the table layout.
    #[snafu(display("Table {path} has no field named '{field}'"))]
    UnknownField {
        /// Node path of the table.
        path: String,
        /// The unknown field.
        field: String,
    },

    /// A row coordinate lies outside the table.
    #[snafu(display("Row {row} is out of range for table {path} with {nrows} rows"))]
    RowOutOfRange {
        /// Node path of the table.
        path: String,
        /// Offending row coordinate.
        row: u64,
        /// Row count of the table.
        nrows: u64,
    },

    /// A condition literal cannot be compared against a field's type.
    #[snafu(display("Cannot compare field '{field}' of type {data_type} with {literal}"))]
    LiteralType {
        /// Field the literal is compared against.
        field: String,
        /// The field's on-disk arrow type.
        data_type: String,
        /// Debug rendering of the literal.
        literal: String,
    },

    /// Compression settings could not be mapped to a parquet codec.
    #[snafu(display("Invalid compression filter {complib} at level {complevel}: {source}"))]
    InvalidFilters {
        /// Requested compression library.
        complib: String,
        /// Requested compression level.
        complevel: u8,
        /// Underlying parquet error.
        source: ParquetError,
    },
}
