//! SQL compilation for rowferry.
//!
//! Pure string builders: a [`TableDescriptor`](rowferry_types::TableDescriptor)
//! goes in, dialect-correct SQL text comes out. Nothing in this crate talks
//! to a database.

mod error;

pub mod ddl;
pub mod dml;
pub mod literal;
pub mod naming;
pub mod select;

pub use error::CompileError;
