//! PostgreSQL client, COPY framing and schema management.

mod client;
mod copy;
pub mod escape;
mod schema;

pub use client::PgClient;
pub use copy::{CopyBuffer, COPY_BUFFER_CAPACITY};
pub use schema::{create_place_table, prepare_get_classes, TableSpaces};
