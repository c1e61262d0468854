//! graphport-ir: the flat record set that describes a converted object graph.
//!
//! Every converted object is one [`Record`] addressed by an [`ObjectId`].
//! Records reference each other only through ids, so cyclic source graphs
//! stay expressible as flat tables. Each record has two interchangeable
//! wire forms (positional and keyed), both terminated by the record's type
//! name; [`from_wire`] dispatches on that trailing tag alone.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_wire, IrError};
pub use types::*;
