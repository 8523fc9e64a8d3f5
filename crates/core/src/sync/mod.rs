//! Mutation queue model, failure classification and pacing rules.

mod engine_model;
mod queue_model;

pub use engine_model::*;
pub use queue_model::*;
