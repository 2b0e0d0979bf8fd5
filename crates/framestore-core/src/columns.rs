//! Column descriptors for the table layout.
//!
//! An [`IndexCol`] holds the row keys of an index axis; a [`DataCol`] holds
//! a block of value columns or one promoted data column. Descriptors know
//! how to turn in-memory arrays into on-disk field values and back:
//!
//! - strings become fixed-width encoded bytes, sized to the widest value
//!   and never narrower than the persisted column;
//! - timestamps and durations become nanosecond integers;
//! - categoricals store their codes, with the categories kept in a
//!   metadata side-table;
//! - other numeric kinds map to an atom of the same width.

mod attrs;
pub mod codec;
mod convert;
mod descriptor;
mod info;
pub mod kind;
pub(crate) mod lifecycle;

pub use attrs::ColumnAttrs;
pub use codec::{Encoding, ErrorPolicy, StringCodec};
pub use descriptor::{CATEGORY_META, DataCol, IndexCol};
pub use info::{AxisInfo, AxisType, InfoMap};
pub use kind::Kind;

