//! Platform glue: which source to decode, how to build the table, and how
//! to hand it to concurrent readers.
//!
//! A build picks exactly one source (the platform override, an IORT image
//! or a device-tree blob), decodes it into a fresh table, runs the overlap
//! analyzer once and returns the table. [`TopologyCell`] then publishes the
//! result for any number of reader threads.

pub mod config;
pub mod error;
pub mod publish;
pub mod select;

pub use config::{OverrideConfig, PlatformConfig, SourceConfig, SourcePreference};
pub use error::{BuildError, ConfigError};
pub use publish::TopologyCell;
pub use select::{build_topology, override_table, select_source, SourceInputs, TopologySource};
