//! Core data models for the import pipeline.

mod place;
mod tags;

pub use place::{
    Classification, Member, OsmType, PlaceRow, PrimitiveKind, ADMINLEVEL_NONE,
};
pub use tags::TagMap;
