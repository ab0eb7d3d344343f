//! mirrorwatch core library: configuration types, loader, errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / validate

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{Config, Credentials, FilePair, GroupName, ServiceGroup, VersionRule};
