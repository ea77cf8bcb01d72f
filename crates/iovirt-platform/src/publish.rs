//! One-shot publication of a built table to concurrent readers.

use std::sync::OnceLock;

use log::warn;

use iovirt_core::TopologyTable;

use crate::config::PlatformConfig;
use crate::error::BuildError;
use crate::select::{build_topology, SourceInputs};

/// Holds the outcome of the single topology build.
///
/// The builder writes once; readers on any thread then see either the
/// finished table or "topology unknown" after a failed build. The write
/// happens-before every read that observes it.
#[derive(Debug, Default)]
pub struct TopologyCell {
    slot: OnceLock<Option<TopologyTable>>,
}

impl TopologyCell {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Publish a finished table, or `None` for a failed build.
    ///
    /// Fails if something was already published.
    pub fn publish(&self, table: Option<TopologyTable>) -> Result<(), BuildError> {
        self.slot
            .set(table)
            .map_err(|_| BuildError::AlreadyPublished)
    }

    /// Build from `inputs` and publish the outcome.
    ///
    /// A build error publishes "topology unknown" and is returned to the
    /// caller.
    pub fn build_and_publish(
        &self,
        inputs: &SourceInputs,
        config: &PlatformConfig,
    ) -> Result<&TopologyTable, BuildError> {
        if self.is_published() {
            return Err(BuildError::AlreadyPublished);
        }
        match build_topology(inputs, config) {
            Ok(table) => {
                self.publish(Some(table))?;
                self.get().ok_or(BuildError::AlreadyPublished)
            }
            Err(err) => {
                warn!("topology build failed, topology unknown: {err}");
                self.publish(None)?;
                Err(err)
            }
        }
    }

    /// The published table; `None` before publication or after a failed
    /// build.
    pub fn get(&self) -> Option<&TopologyTable> {
        self.slot.get().and_then(Option::as_ref)
    }

    pub fn is_published(&self) -> bool {
        self.slot.get().is_some()
    }
}
