//! Types shared by the remoteplay crates.

pub mod errors;

pub use errors::{RemoteplayError, RemoteplayResult};
