//! Core domain layer: entities, pure scoring logic, and result types.

pub mod entities;
pub mod scoring;
pub mod value_objects;

pub use entities::*;
pub use scoring::{location_score, pick_best_stocked};
pub use value_objects::*;
