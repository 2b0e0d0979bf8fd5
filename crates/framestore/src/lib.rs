//! # framestore
//!
//! Persistent, hierarchical store for labeled series and frames.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! Objects are stored under `/`-separated keys in one of two layouts:
//!
//! - **fixed**: written and read whole; fast, not appendable or queryable;
//! - **table**: append-capable, with predicate push-down on the row index
//!   and on promoted data columns, chunked reads and row deletion.
//!
//! ## Example
//!
//! ```rust,ignore
//! use framestore::prelude::*;
//!
//! let mut store = Store::open("prices.fs", StoreOptions::default())?;
//! store.append("daily", frame, PutOptions::default())?;
//! let recent = store.select("daily", SelectOptions::matching(Expr::col("index").ge(50)))?;
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Predicate builder namespace.
pub mod expr {
    pub use framestore_core::expr::{Col, Expr, FilterOp, FilterTerm, Predicate, Value};
}

pub use framestore_core::columns::{DataCol, IndexCol, Kind};
pub use framestore_core::config::{
    Complib, CopyOptions, DataColumns, Format, IndexKind, IndexOptions, MinItemsize, OpenMode,
    ParseOptionError, PutOptions, SelectOptions, StoreOptions, WriteDefaults,
};
pub use framestore_core::error::{ErrorKind, StoreError, StoreResult};
pub use framestore_core::frame::{Dataset, Frame, FrameError, Index, Label, Series};
pub use framestore_core::container::NodeKind;
pub use framestore_core::store::{ColumnSpec, Store, TableIterator, WalkEntry, read, write};
pub use framestore_core::storer::{Storer, StorerKind};
pub use framestore_core::table::{Table, TableAttrs, TableType};
