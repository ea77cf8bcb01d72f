//! Errors raised by the block store.

use thiserror::Error;

use crate::mapping::BlockRef;

/// Errors that can occur while committing or resolving blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("unresolved block reference {0}")]
    UnresolvedReference(BlockRef),

    #[error("dangling reference: block {from} points at {to}, which is not in the table")]
    DanglingReference { from: BlockRef, to: BlockRef },

    #[error("block store is full ({0} blocks)")]
    StoreFull(usize),
}

impl TopologyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TopologyError::UnresolvedReference(_) | TopologyError::DanglingReference { .. } => {
                ErrorClass::UnresolvedReference
            }
            TopologyError::StoreFull(_) => ErrorClass::MalformedSource,
        }
    }
}

/// Failure class shared by every decoder.
///
/// Both classes are fatal: the build is abandoned and no table is produced.
/// Topology warnings are not errors and are recorded as block flags instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The raw source violates its own format: bounds, node types, required
    /// properties, cell sizes.
    MalformedSource,
    /// A reference does not address a valid node or block.
    UnresolvedReference,
}
