//! Employee domain models.

mod employee_model;

pub use employee_model::*;
