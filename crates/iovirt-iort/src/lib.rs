//! ACPI IORT decoding for I/O virtualization topologies.
//!
//! Reads an IO Remapping Table image and populates a
//! [`TopologyTable`](iovirt_core::TopologyTable), resolving every node
//! reference recursively before the referring block is committed.
//!
//! ## Table Layout
//!
//! ```text
//! IORT Table Layout:
//! ┌──────────────────────────────┐
//! │ ACPI header ("IORT")         │  36 bytes, length @4, checksum @9
//! │ node_count: u32              │  @36
//! │ node_offset: u32             │  @40
//! │ reserved: u32                │  @44
//! ├──────────────────────────────┤
//! │ Node                         │
//! │   type: u8, length: u16      │
//! │   revision: u8, id: u32      │
//! │   mapping_count: u32         │
//! │   mapping_offset: u32        │
//! │   type-specific data         │
//! │   ID mappings (20 bytes ea.) │
//! ├──────────────────────────────┤
//! │ ... node_count nodes         │
//! └──────────────────────────────┘
//! ```
//!
//! All multi-byte fields are little-endian. References between nodes are
//! byte offsets from the start of the table.

mod decode;
mod error;
pub mod layout;
mod writer;

pub use decode::{decode_table, IortDecoder, IortNode, IortTable};
pub use error::IortError;
pub use layout::RawIdMapping;
pub use writer::{IortWriter, RootComplexNode};
