//! IORT decode errors.

use thiserror::Error;

use iovirt_core::{ErrorClass, TopologyError};

/// Errors that can occur while decoding an IORT image.
///
/// Every variant is fatal to the build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IortError {
    #[error("IORT image too small: {len} bytes, need at least {need}")]
    TableTooSmall { len: usize, need: usize },

    #[error("invalid table signature {0:?}: expected \"IORT\"")]
    InvalidSignature([u8; 4]),

    #[error("IORT declares {declared} bytes but only {available} are available")]
    Truncated { declared: usize, available: usize },

    #[error("IORT node {index} at offset {offset:#x} extends past table length {table_length:#x}")]
    NodeOutOfBounds {
        index: u32,
        offset: u32,
        table_length: u32,
    },

    #[error("IORT node at offset {offset:#x} has invalid length {length}")]
    InvalidNodeLength { offset: u32, length: u16 },

    #[error("unsupported IORT node type {node_type} at offset {offset:#x}")]
    UnsupportedNodeType { offset: u32, node_type: u8 },

    #[error("field '{field}' of IORT node at offset {offset:#x} lies outside the node")]
    FieldOutOfBounds { offset: u32, field: &'static str },

    #[error("IORT reference {reference:#x} does not address a node")]
    UnresolvedReference { reference: u32 },

    #[error("IORT node at offset {offset:#x} is reachable from its own references")]
    CyclicReference { offset: u32 },

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),
}

impl IortError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IortError::UnresolvedReference { .. } => ErrorClass::UnresolvedReference,
            IortError::Topology(err) => err.class(),
            _ => ErrorClass::MalformedSource,
        }
    }
}
