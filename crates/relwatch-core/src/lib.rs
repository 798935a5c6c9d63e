//! # Relwatch Core
//! Shared types, configuration, errors, and the channel/source traits.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RelwatchConfig;
pub use error::{RelwatchError, Result, SourceError};
