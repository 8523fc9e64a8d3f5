//! Attendance domain models.

mod attendance_model;

pub use attendance_model::*;
