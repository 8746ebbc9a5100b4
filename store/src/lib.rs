//! Generic, collection-oriented persistence engine.
//!
//! A [`Record`] type names its own collection and the subset of its fields
//! that should be queryable without deserializing every row. [`Store`] keeps
//! one SQLite table per collection plus a sparse index table for those
//! fields, so callers get `list(filters)` without hand-writing SQL per
//! domain type.

mod filter;
mod record;
mod store;

pub use filter::{Filter, FilterOp, IndexValue};
pub use record::Record;
pub use store::{Store, StoreError};
