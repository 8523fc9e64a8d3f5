//! Domain models and sync primitives for the pontual offline attendance core.

pub mod attendance;
pub mod cache;
pub mod employees;
pub mod errors;
pub mod schedule;
pub mod sync;
