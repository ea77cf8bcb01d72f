//! Error types for configuration and topology builds.

use std::path::PathBuf;

use iovirt_core::{ErrorClass, TopologyError};
use iovirt_dt::DeviceTreeError;
use iovirt_iort::IortError;

use crate::config::SourcePreference;

/// Errors that can occur while loading a platform configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error reading the configuration file.
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A value parsed but is not acceptable.
    #[error("validation error: {detail}")]
    Validation { detail: String },
}

/// Errors that abandon a topology build.
///
/// A failed build produces no table; callers treat the topology as unknown.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no topology source available (prefer = {prefer})")]
    NoSource { prefer: SourcePreference },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IORT decode failed: {0}")]
    Iort(#[from] IortError),

    #[error("device-tree decode failed: {0}")]
    DeviceTree(#[from] DeviceTreeError),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("topology already published")]
    AlreadyPublished,
}

impl BuildError {
    /// Failure class of a decode error; `None` for errors outside the
    /// decoders.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            BuildError::Iort(err) => Some(err.class()),
            BuildError::DeviceTree(err) => Some(err.class()),
            BuildError::Topology(err) => Some(err.class()),
            _ => None,
        }
    }
}
