//! Topology warning report with summary counters.

use std::fmt;

use serde::Serialize;

use iovirt_core::{BlockFlags, BlockRef, BlockType, TopologyCounts, TopologyTable};

/// A non-fatal finding recorded as a block flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyWarning {
    DeviceIdOverlap,
    StreamIdOverlap,
    ContextInterruptCollision,
}

impl TopologyWarning {
    pub const ALL: [TopologyWarning; 3] = [
        TopologyWarning::DeviceIdOverlap,
        TopologyWarning::StreamIdOverlap,
        TopologyWarning::ContextInterruptCollision,
    ];

    /// The flag bit this warning is recorded as.
    pub fn flag(self) -> u8 {
        match self {
            TopologyWarning::DeviceIdOverlap => BlockFlags::DEVICE_ID_OVERLAP,
            TopologyWarning::StreamIdOverlap => BlockFlags::STREAM_ID_OVERLAP,
            TopologyWarning::ContextInterruptCollision => BlockFlags::CONTEXT_INTERRUPT_COLLISION,
        }
    }

    /// Every warning recorded in `flags`.
    pub fn from_flags(flags: BlockFlags) -> impl Iterator<Item = TopologyWarning> {
        Self::ALL
            .into_iter()
            .filter(move |warning| flags.has(warning.flag()))
    }
}

impl fmt::Display for TopologyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyWarning::DeviceIdOverlap => write!(f, "overlapping device ID ranges"),
            TopologyWarning::StreamIdOverlap => write!(f, "overlapping stream ID ranges"),
            TopologyWarning::ContextInterruptCollision => {
                write!(f, "non-unique context bank interrupts")
            }
        }
    }
}

/// A warning attached to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockWarning {
    pub block: BlockRef,
    pub block_type: BlockType,
    pub warning: TopologyWarning,
}

/// Every warning in a table, in block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyReport {
    pub counts: TopologyCounts,
    pub warnings: Vec<BlockWarning>,
}

impl TopologyReport {
    pub fn collect(table: &TopologyTable) -> Self {
        let warnings = table
            .blocks()
            .flat_map(|(block, b)| {
                let block_type = b.block_type();
                TopologyWarning::from_flags(b.flags()).map(move |warning| BlockWarning {
                    block,
                    block_type,
                    warning,
                })
            })
            .collect();
        Self {
            counts: *table.counts(),
            warnings,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of warnings of the given kind.
    pub fn count(&self, warning: TopologyWarning) -> usize {
        self.warnings.iter().filter(|w| w.warning == warning).count()
    }
}

impl fmt::Display for TopologyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Topology Report ===")?;
        writeln!(f, "{}", self.counts)?;
        if self.warnings.is_empty() {
            writeln!(f, "No warnings.")?;
        } else {
            writeln!(f, "--- Warnings ---")?;
            for w in &self.warnings {
                writeln!(f, "[WARN] {} ({}): {}", w.block, w.block_type, w.warning)?;
            }
        }
        Ok(())
    }
}
