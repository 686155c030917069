//! Runtime configuration.
//!
//! - `options`: tunable behavior with reference defaults
//! - `config`: the small persisted key-value file (last machine, API key)

mod config;
mod options;

pub use config::{StoredConfig, default_config_path};
pub use options::{RemoteplayOptions, ServiceOptions, TransitionOptions, TunnelOptions};
