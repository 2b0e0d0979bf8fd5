//! Wrapper prelude.
//!
//! The `framestore` crate is the supported public entry point. Downstream
//! code should prefer importing from this prelude instead of depending on
//! internal core module paths.

pub use crate::expr::{Expr, Predicate, Value};
pub use crate::{
    ColumnSpec, CopyOptions, DataColumns, Dataset, ErrorKind, Format, Frame, Index, IndexOptions,
    Label, OpenMode, PutOptions, SelectOptions, Series, Store, StoreError, StoreOptions,
    StoreResult, StorerKind, TableType,
};
