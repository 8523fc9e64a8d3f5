//! Work schedule domain models.

mod schedule_model;

pub use schedule_model::*;
