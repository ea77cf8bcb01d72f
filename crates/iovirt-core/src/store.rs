//! The block store: an append-only arena of topology blocks.
//!
//! Blocks are committed once and never move. Committing a block that is
//! structurally identical to one already in the table returns the existing
//! handle instead of appending, which is what turns repeated references in
//! the raw source into a converged graph.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::block::{Block, BlockType};
use crate::error::TopologyError;
use crate::mapping::BlockRef;

/// Aggregate block counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopologyCounts {
    pub blocks: usize,
    pub smmus: usize,
    pub root_complexes: usize,
    pub named_components: usize,
    pub its_groups: usize,
    pub pmcgs: usize,
}

impl TopologyCounts {
    /// Number of blocks of the given type.
    pub fn of(&self, block_type: BlockType) -> usize {
        match block_type {
            BlockType::ItsGroup => self.its_groups,
            BlockType::NamedComponent => self.named_components,
            BlockType::PciRootComplex => self.root_complexes,
            BlockType::Smmu => self.smmus,
            BlockType::Pmcg => self.pmcgs,
        }
    }

    fn record(&mut self, block_type: BlockType) {
        self.blocks += 1;
        match block_type {
            BlockType::ItsGroup => self.its_groups += 1,
            BlockType::NamedComponent => self.named_components += 1,
            BlockType::PciRootComplex => self.root_complexes += 1,
            BlockType::Smmu => self.smmus += 1,
            BlockType::Pmcg => self.pmcgs += 1,
        }
    }
}

impl fmt::Display for TopologyCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks ({} SMMU, {} root complex, {} named component, {} ITS group, {} PMCG)",
            self.blocks,
            self.smmus,
            self.root_complexes,
            self.named_components,
            self.its_groups,
            self.pmcgs
        )
    }
}

/// The topology table: block store plus counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyTable {
    blocks: Vec<Block>,
    counts: TopologyCounts,
}

impl TopologyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a candidate block and return its handle.
    ///
    /// If a structurally identical block is already present, nothing is
    /// appended, the counters are left alone, and the existing handle is
    /// returned. Every handle held by the candidate must resolve in this
    /// table.
    pub fn commit(&mut self, candidate: Block) -> Result<BlockRef, TopologyError> {
        let next = BlockRef::new(
            u32::try_from(self.blocks.len())
                .map_err(|_| TopologyError::StoreFull(self.blocks.len()))?,
        );
        for target in candidate.references() {
            if self.get(target).is_none() {
                return Err(TopologyError::DanglingReference {
                    from: next,
                    to: target,
                });
            }
        }

        if let Some(existing) = self.find(&candidate) {
            debug!(
                "{} block matches existing block {existing}",
                candidate.block_type()
            );
            return Ok(existing);
        }

        debug!("committing {} block at {next}", candidate.block_type());
        self.counts.record(candidate.block_type());
        self.blocks.push(candidate);
        Ok(next)
    }

    /// Handle of a block structurally identical to `candidate`, if any.
    pub fn find(&self, candidate: &Block) -> Option<BlockRef> {
        self.blocks
            .iter()
            .position(|block| block.same_structure(candidate))
            .map(|index| BlockRef::new(index as u32))
    }

    /// Look up a block by handle.
    pub fn get(&self, block: BlockRef) -> Option<&Block> {
        self.blocks.get(block.index())
    }

    /// Look up a block by handle, failing on a handle this table never issued.
    pub fn resolve(&self, block: BlockRef) -> Result<&Block, TopologyError> {
        self.get(block)
            .ok_or(TopologyError::UnresolvedReference(block))
    }

    /// Raise a warning flag on a committed block.
    pub fn raise_flag(&mut self, block: BlockRef, flag: u8) -> Result<(), TopologyError> {
        self.blocks
            .get_mut(block.index())
            .ok_or(TopologyError::UnresolvedReference(block))?
            .raise(flag);
        Ok(())
    }

    /// All blocks with their handles, in commit order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockRef, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockRef::new(index as u32), block))
    }

    pub fn counts(&self) -> &TopologyCounts {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Check that every handle held by every block resolves.
    pub fn validate(&self) -> Result<(), Vec<TopologyError>> {
        let errors: Vec<TopologyError> = self
            .blocks()
            .flat_map(|(from, block)| {
                block
                    .references()
                    .filter(|to| self.get(*to).is_none())
                    .map(move |to| TopologyError::DanglingReference { from, to })
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Display for TopologyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of IOVIRT blocks = {}", self.blocks.len())?;
        for (handle, block) in self.blocks() {
            write!(f, "{handle} {block}")?;
        }
        Ok(())
    }
}
