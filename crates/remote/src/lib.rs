//! HTTP client for the remote attendance store.

mod client;
mod error;
mod store;

pub use client::{RemoteConfig, RestRemoteStore};
pub use error::{RemoteStoreError, Result};
pub use store::{ConnectionDiagnosis, RemoteStore, WireRecord};
