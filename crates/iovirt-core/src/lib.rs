//! Normalized I/O virtualization topology.
//!
//! A platform's I/O topology (SMMUs, PCI root complexes, ITS groups, named
//! components and PMCGs, linked by ID-remapping ranges) is held in a
//! [`TopologyTable`]: an append-only arena of [`Block`]s addressed by
//! [`BlockRef`] handles. Both the IORT decoder and the device-tree decoder
//! populate the same table, and both go through [`TopologyTable::commit`],
//! which collapses structurally identical blocks so that a node reached via
//! several paths ends up as a single block.
//!
//! ```rust
//! use iovirt_core::{Block, BlockKind, IdMapping, SmmuRevision, TopologyTable};
//!
//! let mut table = TopologyTable::new();
//! let smmu = table
//!     .commit(Block::new(BlockKind::Smmu { base: 0x2b40_0000, revision: SmmuRevision::V3 }))
//!     .unwrap();
//! let rc = Block::new(BlockKind::PciRootComplex {
//!     segment: 0,
//!     coherent: true,
//!     ats_supported: false,
//!     upstream_smmu_base: 0x2b40_0000,
//! })
//! .with_mapping(IdMapping::new(0, 0x100, 0, smmu));
//! let first = table.commit(rc.clone()).unwrap();
//! let second = table.commit(rc).unwrap();
//! assert_eq!(first, second);
//! assert_eq!(table.counts().blocks, 2);
//! ```

pub mod block;
pub mod error;
pub mod flags;
pub mod mapping;
pub mod store;

pub use block::{Block, BlockKind, BlockType, SmmuRevision, NAMED_COMPONENT_NAME_MAX};
pub use error::{ErrorClass, TopologyError};
pub use flags::BlockFlags;
pub use mapping::{BlockRef, IdMapping};
pub use store::{TopologyCounts, TopologyTable};
