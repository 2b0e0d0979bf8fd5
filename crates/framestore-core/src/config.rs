//! Explicit configuration for stores and the operations run against them.
//!
//! There are no process-wide flags: every default (storage format, missing
//! row suppression, chunk size, string sentinel, encoding) is an explicit
//! field on an options struct and is resolved at the call boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::expr::Predicate;
use crate::frame::Label;

/// Version string written to every new object's attributes.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Rows written per append when the caller does not choose a chunk size.
pub const DEFAULT_CHUNKSIZE: usize = 100_000;

/// Sentinel persisted in place of missing strings.
pub const DEFAULT_NAN_REP: &str = "nan";

/// Text encoding used for string columns unless overridden.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Error handling policy for encoding and decoding strings.
pub const DEFAULT_ERRORS: &str = "strict";

/// Lower bound for the expected-rows hint handed to new tables.
pub const MIN_EXPECTED_ROWS: u64 = 10_000;

/// Default optimization level for secondary indexes.
pub const DEFAULT_OPTLEVEL: u8 = 6;

/// Errors produced while parsing option values from strings.
#[derive(Debug, Snafu)]
pub enum ParseOptionError {
    /// Unknown storage format name.
    #[snafu(display("invalid format '{value}' (expected fixed|f|table|t)"))]
    Format {
        /// The rejected value.
        value: String,
    },

    /// Unknown open mode.
    #[snafu(display("invalid mode '{value}' (expected r|r+|a|w)"))]
    Mode {
        /// The rejected value.
        value: String,
    },

    /// Unknown compression library.
    #[snafu(display(
        "complib only supports zlib, gzip, zstd, snappy, lz4 and brotli; got '{value}'"
    ))]
    Complib {
        /// The rejected value.
        value: String,
    },

    /// Unknown secondary index kind.
    #[snafu(display("invalid index kind '{value}' (expected ultralight|light|medium|full)"))]
    IndexKind {
        /// The rejected value.
        value: String,
    },
}

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// `r`: read-only; the container must exist.
    Read,
    /// `r+`: read-write; the container must exist.
    ReadWrite,
    /// `a`: read-write; the container is created when missing.
    #[default]
    Append,
    /// `w`: a fresh container replaces any existing one.
    Write,
}

impl OpenMode {
    /// True for every mode except `r`.
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    /// Short mode string.
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::Append => "a",
            OpenMode::Write => "w",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::Read),
            "r+" => Ok(OpenMode::ReadWrite),
            "a" => Ok(OpenMode::Append),
            "w" => Ok(OpenMode::Write),
            other => ModeSnafu { value: other }.fail(),
        }
    }
}

/// Storage layout of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Whole-object blob layout; not appendable or queryable.
    Fixed,
    /// Row-structured, appendable and queryable layout.
    Table,
}

impl FromStr for Format {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "fixed" => Ok(Format::Fixed),
            "t" | "table" => Ok(Format::Table),
            _ => FormatSnafu { value: s }.fail(),
        }
    }
}

/// Compression library applied to written payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complib {
    /// Deflate, stored as parquet gzip.
    Zlib,
    /// Gzip.
    Gzip,
    /// Zstandard.
    Zstd,
    /// Snappy.
    Snappy,
    /// LZ4 (raw framing).
    Lz4,
    /// Brotli.
    Brotli,
}

impl Complib {
    /// Lowercase library name.
    pub fn as_str(self) -> &'static str {
        match self {
            Complib::Zlib => "zlib",
            Complib::Gzip => "gzip",
            Complib::Zstd => "zstd",
            Complib::Snappy => "snappy",
            Complib::Lz4 => "lz4",
            Complib::Brotli => "brotli",
        }
    }
}

impl fmt::Display for Complib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complib {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" => Ok(Complib::Zlib),
            "gzip" => Ok(Complib::Gzip),
            "zstd" => Ok(Complib::Zstd),
            "snappy" => Ok(Complib::Snappy),
            "lz4" => Ok(Complib::Lz4),
            "brotli" => Ok(Complib::Brotli),
            _ => ComplibSnafu { value: s }.fail(),
        }
    }
}

/// Kind of a secondary index on a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Smallest index.
    Ultralight,
    /// Light index.
    Light,
    /// Balanced default.
    #[default]
    Medium,
    /// Completely sorted index.
    Full,
}

impl FromStr for IndexKind {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ultralight" => Ok(IndexKind::Ultralight),
            "light" => Ok(IndexKind::Light),
            "medium" => Ok(IndexKind::Medium),
            "full" => Ok(IndexKind::Full),
            _ => IndexKindSnafu { value: s }.fail(),
        }
    }
}

/// Store-wide write defaults applied when a call leaves an option unset.
#[derive(Debug, Clone, Default)]
pub struct WriteDefaults {
    /// Format used by `put` when the call does not pick one (fixed otherwise).
    pub format: Option<Format>,
    /// Drop rows whose values are all missing when appending to tables.
    pub dropna: bool,
}

/// Options for opening a store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Open mode.
    pub mode: OpenMode,
    /// Compression library for all payloads; requires `complevel` > 0 to take effect.
    pub complib: Option<Complib>,
    /// Compression level 0..=9.
    pub complevel: Option<u8>,
    /// Defaults for write calls.
    pub defaults: WriteDefaults,
}

impl StoreOptions {
    /// Options with the given mode and no compression.
    pub fn with_mode(mode: OpenMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Which value columns become independently queryable data columns.
#[derive(Debug, Clone, PartialEq)]
pub enum DataColumns {
    /// Promote every column.
    All,
    /// Promote the named columns.
    Named(Vec<String>),
}

impl<S: Into<String>> FromIterator<S> for DataColumns {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DataColumns::Named(iter.into_iter().map(Into::into).collect())
    }
}

/// Minimum string widths keyed by column name, or `values` for every
/// non-promoted string block.
pub type MinItemsize = BTreeMap<String, usize>;

/// Options for `put` and `append`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Storage format; `None` resolves to the store default.
    pub format: Option<Format>,
    /// Append to an existing table instead of replacing it (`put` only).
    pub append: bool,
    /// Build secondary indexes on queryable fields after writing a table.
    pub index: Option<bool>,
    /// Columns to promote to data columns.
    pub data_columns: Option<DataColumns>,
    /// Minimum string widths.
    pub min_itemsize: Option<MinItemsize>,
    /// Missing string sentinel.
    pub nan_rep: Option<String>,
    /// String encoding.
    pub encoding: Option<String>,
    /// Encoding error policy (`strict`, `replace`, `ignore`).
    pub errors: Option<String>,
    /// Rows per append chunk.
    pub chunksize: Option<usize>,
    /// Expected final row count, used as a layout hint.
    pub expectedrows: Option<u64>,
    /// Drop rows whose values are all missing.
    pub dropna: Option<bool>,
    /// Per-object compression library (table format only).
    pub complib: Option<Complib>,
    /// Per-object compression level (table format only).
    pub complevel: Option<u8>,
}

/// Options for `select`.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Row predicate.
    pub predicate: Option<Predicate>,
    /// First row of the addressed range; negative values count from the end.
    pub start: Option<i64>,
    /// End of the addressed range (exclusive); negative values count from the end.
    pub stop: Option<i64>,
    /// Column subset.
    pub columns: Option<Vec<Label>>,
    /// Rows per chunk for chunked selection.
    pub chunksize: Option<usize>,
    /// Close the store once a chunked selection is exhausted or dropped.
    pub auto_close: bool,
}

impl SelectOptions {
    /// Select rows matching `predicate`.
    pub fn matching(predicate: impl Into<Predicate>) -> Self {
        Self {
            predicate: Some(predicate.into()),
            ..Self::default()
        }
    }

    /// Restrict to the given column labels.
    pub fn columns<L: Into<Label>>(mut self, columns: impl IntoIterator<Item = L>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Read in chunks of `chunksize` rows.
    pub fn chunked(mut self, chunksize: usize) -> Self {
        self.chunksize = Some(chunksize);
        self
    }

    /// Restrict to rows `[start, stop)`.
    pub fn range(mut self, start: Option<i64>, stop: Option<i64>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }
}

/// Options for building secondary indexes.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Fields to index; `None` indexes every queryable field.
    pub columns: Option<Vec<String>>,
    /// Optimization level 0..=9.
    pub optlevel: u8,
    /// Index kind.
    pub kind: IndexKind,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            columns: None,
            optlevel: DEFAULT_OPTLEVEL,
            kind: IndexKind::Medium,
        }
    }
}

/// Options for copying a store into a new container.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Mode used to open the destination.
    pub mode: OpenMode,
    /// Rebuild the source tables' indexes on the copies.
    pub propindexes: bool,
    /// Keys to copy; `None` copies every key.
    pub keys: Option<Vec<String>>,
    /// Destination compression library.
    pub complib: Option<Complib>,
    /// Destination compression level.
    pub complevel: Option<u8>,
    /// Replace keys that already exist in the destination.
    pub overwrite: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::Write,
            propindexes: true,
            keys: None,
            complib: None,
            complevel: None,
            overwrite: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive() {
        assert!(matches!("Table".parse::<Format>(), Ok(Format::Table)));
        assert!(matches!("f".parse::<Format>(), Ok(Format::Fixed)));
        assert!(matches!(
            "blob".parse::<Format>(),
            Err(ParseOptionError::Format { value }) if value == "blob"
        ));
    }

    #[test]
    fn modes_round_trip() {
        for mode in [OpenMode::Read, OpenMode::ReadWrite, OpenMode::Append, OpenMode::Write] {
            assert!(matches!(mode.as_str().parse::<OpenMode>(), Ok(m) if m == mode));
        }
        assert!(!OpenMode::Read.is_writable());
    }

    #[test]
    fn unknown_complib_is_rejected() {
        assert!(matches!("blosc".parse::<Complib>(), Err(ParseOptionError::Complib { .. })));
        assert!(matches!("ZSTD".parse::<Complib>(), Ok(Complib::Zstd)));
    }
}
