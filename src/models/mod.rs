//! Core data models for the match cleaner.

mod ids;
mod match_record;
mod player;

pub use ids::*;
pub use match_record::*;
pub use player::*;
