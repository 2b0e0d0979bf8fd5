//! Core engine for a hierarchical store of labeled series and frames.
//!
//! This crate provides the pieces behind `framestore`:
//!
//! - A directory-backed node container with groups, arrays and
//!   append-only table nodes carrying per-segment statistics
//!   (`container` module).
//! - Column descriptors that map in-memory arrow columns to on-disk fields
//!   and back, with an explicit declare → bind → validate lifecycle
//!   (`columns` module).
//! - Two storage layouts: whole-object fixed storers (`fixed` module) and
//!   appendable, queryable tables (`table` module), dispatched from
//!   persisted type tags (`storer` module).
//! - A predicate builder and a selection engine that splits predicates
//!   into push-down conditions and residual filters (`expr` and
//!   `selection` modules).
//! - The [`Store`] facade: keys, put/append, select, chunked iteration,
//!   row deletion, indexing and copying (`store` module), plus the
//!   one-call [`read`] and [`write`].
//!
//! Everything runs synchronously on the calling thread. The crate logs
//! through the `log` facade and never installs a logger.
#![deny(missing_docs)]
pub mod columns;
pub mod config;
pub mod container;
pub mod error;
pub mod expr;
pub mod fixed;
pub mod frame;
pub mod selection;
pub mod store;
pub mod storer;
pub mod table;

pub use store::{Store, read, write};
