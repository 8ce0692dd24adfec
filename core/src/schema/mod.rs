//! Schema value objects and their wire codec.

pub(crate) mod codec;
mod schema;

pub use schema::{Schema, SchemaMember};
