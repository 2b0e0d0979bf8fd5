use snafu::Snafu;

use framestore::{FrameError, ParseOptionError, StoreError};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to open store at {path}: {source}"))]
    OpenStore {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("{action} failed for key {key}: {source}"))]
    Store {
        action: &'static str,
        key: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Copy into {dest} failed: {source}"))]
    Copy {
        dest: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Invalid --{flag} '{value}': {source}"))]
    InvalidOption {
        flag: &'static str,
        value: String,
        source: ParseOptionError,
    },

    #[snafu(display("Invalid --where '{input}': {message}"))]
    InvalidPredicate { input: String, message: String },

    #[snafu(display("Parquet file not found or not accessible: {path}"))]
    ParquetMissing {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read parquet file {path}: {source}"))]
    ParquetRead {
        path: String,
        source: parquet::errors::ParquetError,
    },

    #[snafu(display("Failed to assemble rows from {path}: {source}"))]
    Arrow {
        path: String,
        source: arrow::error::ArrowError,
    },

    #[snafu(display("Index column {column} is not present in {path}"))]
    IndexColumnMissing { column: String, path: String },

    #[snafu(display("Failed to build a frame: {source}"))]
    Frame { source: FrameError },

    #[snafu(display("Failed to render the result: {source}"))]
    Render { source: arrow::error::ArrowError },
}
