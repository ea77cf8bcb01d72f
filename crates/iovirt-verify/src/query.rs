//! Read-only queries over a built topology.
//!
//! Nothing here mutates the table, so every query may run concurrently on a
//! published table.

use std::fmt;

use log::debug;
use serde::Serialize;

use iovirt_core::{
    Block, BlockFlags, BlockKind, BlockRef, SmmuRevision, TopologyError, TopologyTable,
};

/// True unless the block carries the context-interrupt collision flag.
pub fn unique_context_interrupts(smmu: &Block) -> bool {
    !smmu.flags().has(BlockFlags::CONTEXT_INTERRUPT_COLLISION)
}

/// True unless the block carries the stream-ID overlap flag.
pub fn unique_requester_stream_mapping(root_complex: &Block) -> bool {
    !root_complex.flags().has(BlockFlags::STREAM_ID_OVERLAP)
}

/// Where a requester ID's transactions go after its root complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "route", content = "base")]
pub enum SmmuRoute {
    /// Translated by the SMMU at this base address.
    BehindSmmu(u64),
    /// A root complex maps the ID, but not into an SMMU.
    NoSmmu,
    /// No root complex in the segment maps the ID.
    NotFound,
}

impl SmmuRoute {
    /// Legacy encoding of [`SmmuRoute::NotFound`].
    pub const NOT_FOUND: u64 = 0xFFFF_FFFF;

    pub fn base(self) -> Option<u64> {
        match self {
            SmmuRoute::BehindSmmu(base) => Some(base),
            _ => None,
        }
    }

    /// Flat encoding: the SMMU base, 0 for no SMMU, or [`Self::NOT_FOUND`].
    pub fn to_raw(self) -> u64 {
        match self {
            SmmuRoute::BehindSmmu(base) => base,
            SmmuRoute::NoSmmu => 0,
            SmmuRoute::NotFound => Self::NOT_FOUND,
        }
    }
}

impl fmt::Display for SmmuRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmmuRoute::BehindSmmu(base) => write!(f, "SMMU at {base:#x}"),
            SmmuRoute::NoSmmu => write!(f, "no SMMU"),
            SmmuRoute::NotFound => write!(f, "not found"),
        }
    }
}

/// Resolve the SMMU that translates `requester_id` from root complexes in
/// `segment`.
///
/// Within a root complex the first mapping whose input range accepts the ID
/// is used; when several root complexes in the segment accept it, the last
/// one in table order wins. If the mapping targets an SMMU that declares
/// mappings of its own, the remapped ID must also fall in one of them.
pub fn resolve_smmu_base(
    table: &TopologyTable,
    segment: u32,
    requester_id: u32,
) -> Result<SmmuRoute, TopologyError> {
    let mut found = None;
    for (handle, block) in table.blocks() {
        if !matches!(block.kind(), BlockKind::PciRootComplex { segment: s, .. } if *s == segment) {
            continue;
        }
        if let Some(mapping) = block
            .mappings()
            .iter()
            .find(|m| m.accepts_input(requester_id))
        {
            debug!("requester {requester_id:#x} mapped by {handle}: {mapping}");
            found = Some((mapping.translate(requester_id), mapping.output_ref));
        }
    }

    let Some((stream_id, target)) = found else {
        return Ok(SmmuRoute::NotFound);
    };
    let target = table.resolve(target)?;
    let Some((base, _)) = target.as_smmu() else {
        return Ok(SmmuRoute::NoSmmu);
    };
    let mappings = target.mappings();
    if mappings.is_empty() || mappings.iter().any(|m| m.accepts_input(stream_id)) {
        Ok(SmmuRoute::BehindSmmu(base))
    } else {
        Ok(SmmuRoute::NoSmmu)
    }
}

/// Identity of one SMMU in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmmuInfo {
    pub handle: BlockRef,
    pub base: u64,
    pub arch_major_rev: u8,
}

impl SmmuInfo {
    pub fn revision(&self) -> Option<SmmuRevision> {
        SmmuRevision::from_major(self.arch_major_rev)
    }
}

fn smmus(table: &TopologyTable) -> impl Iterator<Item = SmmuInfo> + '_ {
    table.blocks().filter_map(|(handle, block)| {
        block.as_smmu().map(|(base, revision)| SmmuInfo {
            handle,
            base,
            arch_major_rev: revision.major(),
        })
    })
}

pub fn smmu_count(table: &TopologyTable) -> usize {
    table.counts().smmus
}

/// The `index`th SMMU in table order.
pub fn smmu_info(table: &TopologyTable, index: usize) -> Option<SmmuInfo> {
    smmus(table).nth(index)
}

/// Index (as used by [`smmu_info`]) of the SMMU translating `requester_id`.
pub fn rc_smmu_index(
    table: &TopologyTable,
    segment: u32,
    requester_id: u32,
) -> Result<Option<usize>, TopologyError> {
    let Some(base) = resolve_smmu_base(table, segment, requester_id)?.base() else {
        return Ok(None);
    };
    Ok(smmus(table).position(|smmu| smmu.base == base))
}

/// First root complex in `segment`.
pub fn root_complex(table: &TopologyTable, segment: u32) -> Option<BlockRef> {
    table.blocks().find_map(|(handle, block)| match block.kind() {
        BlockKind::PciRootComplex { segment: s, .. } if *s == segment => Some(handle),
        _ => None,
    })
}
