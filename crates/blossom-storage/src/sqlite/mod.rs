//! SQLite-backed owner index

mod index;
mod schema;

pub use index::{IndexCursor, SqliteIndex};
pub use schema::SCHEMA_VERSION;
