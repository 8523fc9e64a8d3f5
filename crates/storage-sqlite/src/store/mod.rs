//! Local cache collections and the durable mutation queue.

mod model;
mod repository;

pub use model::*;
pub use repository::{LocalBackup, LocalStore};
