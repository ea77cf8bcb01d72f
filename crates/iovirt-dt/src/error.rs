//! Device-tree decode errors.

use thiserror::Error;

use iovirt_core::{ErrorClass, TopologyError};

/// Errors that can occur while decoding a device-tree blob.
///
/// Every variant aborts the decode; no partial table is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceTreeError {
    #[error("invalid device-tree blob: {0}")]
    InvalidBlob(String),

    #[error("{path}: invalid {property} value {value:?}")]
    InvalidCells {
        path: String,
        property: &'static str,
        value: Vec<u8>,
    },

    #[error("{path}: missing required property '{property}'")]
    MissingProperty {
        path: String,
        property: &'static str,
    },

    #[error("{path}: property '{property}' is {len} bytes, need at least {need}")]
    PropertyTooShort {
        path: String,
        property: &'static str,
        len: usize,
        need: usize,
    },

    #[error("{path}: phandle {phandle:#x} does not name any node")]
    UnresolvedPhandle { path: String, phandle: u32 },

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),
}

impl DeviceTreeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeviceTreeError::UnresolvedPhandle { .. } => ErrorClass::UnresolvedReference,
            DeviceTreeError::Topology(err) => err.class(),
            _ => ErrorClass::MalformedSource,
        }
    }
}
