//! Device-tree decoding for I/O virtualization topologies.
//!
//! Platforms without an IORT describe their SMMUs and PCI host bridges in a
//! flattened device tree. [`decode_device_tree`] runs three passes over the
//! blob (SMMUv3 nodes, SMMUv1/v2 nodes, PCI host bridges with an
//! `iommu-map`) and commits one block per matching node into a
//! [`TopologyTable`](iovirt_core::TopologyTable).
//!
//! Device trees carry no ID-mapping ranges in this model: a root complex
//! records its upstream SMMU base directly instead of through an edge.

pub mod compat;
mod decode;
mod error;
mod tree;

pub use decode::decode_device_tree;
pub use error::DeviceTreeError;
pub use tree::{CellSizes, DeviceTree, DtNode};
