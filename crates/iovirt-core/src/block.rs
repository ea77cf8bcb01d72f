//! Topology blocks.
//!
//! A block is one node of the normalized topology: an ITS group, a named
//! component, a PCI root complex, an SMMU or a PMCG. Every block carries an
//! ordered list of [`IdMapping`]s and a set of warning [`BlockFlags`].

use std::fmt;

use serde::Serialize;

use crate::flags::BlockFlags;
use crate::mapping::{BlockRef, IdMapping};

/// Storage size of a named component's name, including the terminator.
pub const NAMED_COMPONENT_NAME_MAX: usize = 256;

/// SMMU architecture major revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SmmuRevision {
    /// SMMUv1/v2 (IORT node type 3).
    V2,
    /// SMMUv3 (IORT node type 4).
    V3,
}

impl SmmuRevision {
    pub fn major(self) -> u8 {
        match self {
            SmmuRevision::V2 => 2,
            SmmuRevision::V3 => 3,
        }
    }

    pub fn from_major(major: u8) -> Option<Self> {
        match major {
            2 => Some(SmmuRevision::V2),
            3 => Some(SmmuRevision::V3),
            _ => None,
        }
    }
}

/// Block type tag, used for per-type counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockType {
    ItsGroup,
    NamedComponent,
    PciRootComplex,
    Smmu,
    Pmcg,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::ItsGroup => "ITS group",
            BlockType::NamedComponent => "named component",
            BlockType::PciRootComplex => "root complex",
            BlockType::Smmu => "SMMU",
            BlockType::Pmcg => "PMCG",
        };
        f.write_str(name)
    }
}

/// Variant-specific payload of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockKind {
    ItsGroup {
        identifiers: Vec<u32>,
    },
    NamedComponent {
        name: String,
    },
    PciRootComplex {
        segment: u32,
        coherent: bool,
        ats_supported: bool,
        /// Base of the SMMU this root complex sits behind, 0 when none.
        upstream_smmu_base: u64,
    },
    Smmu {
        base: u64,
        revision: SmmuRevision,
    },
    Pmcg {
        base: u64,
        overflow_interrupt: u32,
        reference: BlockRef,
    },
}

impl BlockKind {
    /// Named component payload, truncating `name` to fit
    /// [`NAMED_COMPONENT_NAME_MAX`] with its terminator.
    pub fn named_component(name: &str) -> Self {
        let mut end = name.len().min(NAMED_COMPONENT_NAME_MAX - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        BlockKind::NamedComponent {
            name: name[..end].to_string(),
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::ItsGroup { .. } => BlockType::ItsGroup,
            BlockKind::NamedComponent { .. } => BlockType::NamedComponent,
            BlockKind::PciRootComplex { .. } => BlockType::PciRootComplex,
            BlockKind::Smmu { .. } => BlockType::Smmu,
            BlockKind::Pmcg { .. } => BlockType::Pmcg,
        }
    }
}

/// A topology block: payload, ID mappings and warning flags.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    kind: BlockKind,
    flags: BlockFlags,
    mappings: Vec<IdMapping>,
}

impl Block {
    /// Create a block with no mappings and no flags.
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            flags: BlockFlags::NONE,
            mappings: Vec::new(),
        }
    }

    /// Append an ID mapping.
    pub fn with_mapping(mut self, mapping: IdMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Replace the ID mappings.
    pub fn with_mappings(mut self, mappings: Vec<IdMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn push_mapping(&mut self, mapping: IdMapping) {
        self.mappings.push(mapping);
    }

    /// Raise a warning flag. Flags are never cleared.
    pub fn raise(&mut self, flag: u8) {
        self.flags.set(flag);
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub fn mappings(&self) -> &[IdMapping] {
        &self.mappings
    }

    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    pub fn is_its_group(&self) -> bool {
        matches!(self.kind, BlockKind::ItsGroup { .. })
    }

    /// SMMU base and revision, if this is an SMMU block.
    pub fn as_smmu(&self) -> Option<(u64, SmmuRevision)> {
        match self.kind {
            BlockKind::Smmu { base, revision } => Some((base, revision)),
            _ => None,
        }
    }

    /// Every handle this block holds: the PMCG reference, then each
    /// mapping's output reference.
    pub fn references(&self) -> impl Iterator<Item = BlockRef> + '_ {
        let reference = match self.kind {
            BlockKind::Pmcg { reference, .. } => Some(reference),
            _ => None,
        };
        reference
            .into_iter()
            .chain(self.mappings.iter().map(|m| m.output_ref))
    }

    /// Structural equality used for deduplication.
    ///
    /// Compares the payload (which for an ITS group includes the identifier
    /// array) and the mapping list. Flags are ignored.
    pub fn same_structure(&self, other: &Block) -> bool {
        self.kind == other.kind && self.mappings == other.mappings
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BlockKind::ItsGroup { identifiers } => {
                writeln!(f, "ITS Group:")?;
                writeln!(f, "  Num ITS: {}", identifiers.len())?;
                let ids: Vec<String> = identifiers.iter().map(|id| id.to_string()).collect();
                writeln!(f, "  Identifiers: {}", ids.join(" "))?;
            }
            BlockKind::NamedComponent { name } => {
                writeln!(f, "Named Component:")?;
                writeln!(f, "  Device Name: {name}")?;
            }
            BlockKind::PciRootComplex {
                segment,
                coherent,
                ats_supported,
                upstream_smmu_base,
            } => {
                writeln!(f, "Root Complex:")?;
                writeln!(f, "  PCI segment number: {segment}")?;
                writeln!(f, "  Coherent: {coherent}  ATS: {ats_supported}")?;
                writeln!(f, "  Upstream SMMU base: {upstream_smmu_base:#x}")?;
            }
            BlockKind::Smmu { base, revision } => {
                writeln!(f, "SMMU:")?;
                writeln!(f, "  Major Rev: {}", revision.major())?;
                writeln!(f, "  Base Address: {base:#x}")?;
            }
            BlockKind::Pmcg {
                base,
                overflow_interrupt,
                reference,
            } => {
                writeln!(f, "PMCG:")?;
                writeln!(f, "  Base: {base:#x}")?;
                writeln!(f, "  Overflow GSIV: {overflow_interrupt:#x}")?;
                writeln!(f, "  Node Reference: {reference}")?;
            }
        }
        writeln!(f, "  Flags: {}", self.flags)?;
        writeln!(f, "  Number of ID Mappings: {}", self.mappings.len())?;
        for mapping in &self.mappings {
            writeln!(f, "    {mapping}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smmu(base: u64) -> Block {
        Block::new(BlockKind::Smmu {
            base,
            revision: SmmuRevision::V3,
        })
    }

    #[test]
    fn flags_do_not_affect_structure() {
        let a = smmu(0x1000);
        let mut b = smmu(0x1000);
        b.raise(BlockFlags::STREAM_ID_OVERLAP);
        assert!(a.same_structure(&b));
    }

    #[test]
    fn mappings_affect_structure() {
        let a = smmu(0x1000);
        let b = smmu(0x1000).with_mapping(IdMapping::new(0, 1, 0, BlockRef::new(0)));
        assert!(!a.same_structure(&b));
    }

    #[test]
    fn its_identifiers_affect_structure() {
        let a = Block::new(BlockKind::ItsGroup {
            identifiers: vec![1, 2],
        });
        let b = Block::new(BlockKind::ItsGroup {
            identifiers: vec![1, 3],
        });
        assert!(!a.same_structure(&b));
        assert!(a.same_structure(&a.clone()));
    }

    #[test]
    fn named_component_name_is_bounded() {
        let long = "x".repeat(400);
        match BlockKind::named_component(&long) {
            BlockKind::NamedComponent { name } => {
                assert_eq!(name.len(), NAMED_COMPONENT_NAME_MAX - 1)
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn references_include_pmcg_and_mappings() {
        let pmcg = Block::new(BlockKind::Pmcg {
            base: 0x4000,
            overflow_interrupt: 99,
            reference: BlockRef::new(3),
        })
        .with_mapping(IdMapping::new(0, 1, 0, BlockRef::new(1)));
        let refs: Vec<BlockRef> = pmcg.references().collect();
        assert_eq!(refs, vec![BlockRef::new(3), BlockRef::new(1)]);
    }

    #[test]
    fn revision_round_trips_major() {
        assert_eq!(SmmuRevision::from_major(2), Some(SmmuRevision::V2));
        assert_eq!(SmmuRevision::from_major(3).map(|r| r.major()), Some(3));
        assert_eq!(SmmuRevision::from_major(1), None);
    }
}
