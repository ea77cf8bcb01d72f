//! ID-range aliasing analysis.
//!
//! Two mappings alias when they target the same block and their output
//! spans intersect. Both owning blocks are flagged: device-ID overlap when
//! the shared target is an ITS group, stream-ID overlap otherwise.

use std::fmt;

use log::{debug, warn};

use iovirt_core::{BlockFlags, BlockRef, IdMapping, TopologyError, TopologyTable};

/// One pair of aliasing mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    /// Owner of the earlier mapping.
    pub first: BlockRef,
    /// Owner of the later mapping; equal to `first` for two mappings of the
    /// same block.
    pub second: BlockRef,
    /// The block both mappings target.
    pub target: BlockRef,
    /// Flag raised on both owners.
    pub flag: u8,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.flag == BlockFlags::DEVICE_ID_OVERLAP {
            "device ID"
        } else {
            "stream ID"
        };
        write!(
            f,
            "{kind} ranges of {} and {} overlap at {}",
            self.first, self.second, self.target
        )
    }
}

/// Find every aliasing mapping pair and flag the owning blocks.
///
/// Each mapping is compared with the mappings after it in table order, so
/// every unordered pair is visited once and no mapping is compared with
/// itself. ITS groups own no mappings and are skipped.
pub fn analyze(table: &mut TopologyTable) -> Result<Vec<Overlap>, TopologyError> {
    let mappings: Vec<(BlockRef, IdMapping)> = table
        .blocks()
        .filter(|(_, block)| !block.is_its_group())
        .flat_map(|(owner, block)| block.mappings().iter().map(move |m| (owner, *m)))
        .collect();
    debug!("checking {} mappings for overlapping ID ranges", mappings.len());

    let mut overlaps = Vec::new();
    for (i, (first, key)) in mappings.iter().enumerate() {
        for (second, other) in &mappings[i + 1..] {
            if key.output_ref != other.output_ref || !key.output_overlaps(other) {
                continue;
            }
            let flag = if table.resolve(key.output_ref)?.is_its_group() {
                BlockFlags::DEVICE_ID_OVERLAP
            } else {
                BlockFlags::STREAM_ID_OVERLAP
            };
            overlaps.push(Overlap {
                first: *first,
                second: *second,
                target: key.output_ref,
                flag,
            });
        }
    }

    for overlap in &overlaps {
        warn!("{overlap}");
        table.raise_flag(overlap.first, overlap.flag)?;
        table.raise_flag(overlap.second, overlap.flag)?;
    }
    Ok(overlaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iovirt_core::{Block, BlockKind, SmmuRevision};

    fn rc(segment: u32, mapping: IdMapping) -> Block {
        Block::new(BlockKind::PciRootComplex {
            segment,
            coherent: true,
            ats_supported: false,
            upstream_smmu_base: 0,
        })
        .with_mapping(mapping)
    }

    fn smmu(table: &mut TopologyTable, base: u64) -> BlockRef {
        table
            .commit(Block::new(BlockKind::Smmu {
                base,
                revision: SmmuRevision::V3,
            }))
            .unwrap()
    }

    #[test]
    fn intersecting_ranges_flag_both_owners() {
        let mut table = TopologyTable::new();
        let target = smmu(&mut table, 0x1000);
        let a = table.commit(rc(0, IdMapping::new(0, 4, 100, target))).unwrap();
        let b = table.commit(rc(1, IdMapping::new(0, 4, 102, target))).unwrap();

        let overlaps = analyze(&mut table).unwrap();
        assert_eq!(
            overlaps,
            vec![Overlap {
                first: a,
                second: b,
                target,
                flag: BlockFlags::STREAM_ID_OVERLAP
            }]
        );
        for handle in [a, b] {
            let flags = table.get(handle).unwrap().flags();
            assert!(flags.has(BlockFlags::STREAM_ID_OVERLAP));
            assert!(!flags.has(BlockFlags::DEVICE_ID_OVERLAP));
        }
        assert!(table.get(target).unwrap().flags().is_empty());
    }

    #[test]
    fn disjoint_ranges_stay_clear() {
        let mut table = TopologyTable::new();
        let target = smmu(&mut table, 0x1000);
        let a = table.commit(rc(0, IdMapping::new(0, 4, 100, target))).unwrap();
        let b = table.commit(rc(1, IdMapping::new(0, 4, 200, target))).unwrap();

        assert!(analyze(&mut table).unwrap().is_empty());
        assert!(table.get(a).unwrap().flags().is_empty());
        assert!(table.get(b).unwrap().flags().is_empty());
    }

    #[test]
    fn different_targets_never_alias() {
        let mut table = TopologyTable::new();
        let s1 = smmu(&mut table, 0x1000);
        let s2 = smmu(&mut table, 0x2000);
        table.commit(rc(0, IdMapping::new(0, 4, 100, s1))).unwrap();
        table.commit(rc(1, IdMapping::new(0, 4, 100, s2))).unwrap();
        assert!(analyze(&mut table).unwrap().is_empty());
    }

    #[test]
    fn its_target_raises_device_id_overlap() {
        let mut table = TopologyTable::new();
        let its = table
            .commit(Block::new(BlockKind::ItsGroup {
                identifiers: vec![0],
            }))
            .unwrap();
        let a = table.commit(rc(0, IdMapping::new(0, 0x10, 0, its))).unwrap();
        let nc = table
            .commit(
                Block::new(BlockKind::named_component("\\_SB.DMA0"))
                    .with_mapping(IdMapping::new(0, 1, 0x8, its)),
            )
            .unwrap();

        let overlaps = analyze(&mut table).unwrap();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].flag, BlockFlags::DEVICE_ID_OVERLAP);
        assert!(table.get(a).unwrap().flags().has(BlockFlags::DEVICE_ID_OVERLAP));
        assert!(table.get(nc).unwrap().flags().has(BlockFlags::DEVICE_ID_OVERLAP));
        assert!(overlaps[0].to_string().starts_with("device ID ranges"));
    }

    #[test]
    fn mappings_of_one_block_are_compared() {
        let mut table = TopologyTable::new();
        let target = smmu(&mut table, 0x1000);
        let a = table
            .commit(
                rc(0, IdMapping::new(0, 0x10, 0, target))
                    .with_mapping(IdMapping::new(0x10, 0x10, 0x8, target)),
            )
            .unwrap();
        let overlaps = analyze(&mut table).unwrap();
        assert_eq!(overlaps.len(), 1);
        assert_eq!((overlaps[0].first, overlaps[0].second), (a, a));
        assert!(table.get(a).unwrap().flags().has(BlockFlags::STREAM_ID_OVERLAP));
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let mut table = TopologyTable::new();
        let target = smmu(&mut table, 0x1000);
        table.commit(rc(0, IdMapping::new(0, 4, 100, target))).unwrap();
        table.commit(rc(1, IdMapping::new(0, 4, 104, target))).unwrap();
        assert!(analyze(&mut table).unwrap().is_empty());
    }
}
