//! Banyan - an OSM importer feeding a geocoding `place` table
//!
//! This library classifies OSM objects by their tags and bulk-loads the
//! resulting place rows into PostgreSQL with the streaming COPY protocol.

pub mod classifier;
pub mod db;
pub mod error;
pub mod geometry;
pub mod middle;
pub mod models;
pub mod writer;

pub use classifier::classify;
pub use error::{ImportError, Result};
pub use models::{Classification, OsmType, PlaceRow, PrimitiveKind, TagMap};
pub use writer::{PlaceWriter, WriterConfig};
