//! The three device-tree decode passes.

use log::{debug, info};

use iovirt_core::{Block, BlockKind, SmmuRevision, TopologyTable};

use crate::compat;
use crate::error::DeviceTreeError;
use crate::tree::{be_cells, DeviceTree, DtNode};

/// Decode every SMMU and PCI host bridge of `blob` into `table`.
///
/// Each pass tolerates zero matches. On error the table may hold blocks
/// from earlier passes and must be discarded.
pub fn decode_device_tree(blob: &[u8], table: &mut TopologyTable) -> Result<(), DeviceTreeError> {
    let tree = DeviceTree::parse(blob)?;
    decode_smmus(&tree, table, compat::SMMU_V3, SmmuRevision::V3)?;
    decode_smmus(&tree, table, compat::SMMU_V2, SmmuRevision::V2)?;
    decode_root_complexes(&tree, table)?;
    info!("device tree decoded: {}", table.counts());
    Ok(())
}

fn decode_smmus(
    tree: &DeviceTree<'_>,
    table: &mut TopologyTable,
    compatible: &[&str],
    revision: SmmuRevision,
) -> Result<(), DeviceTreeError> {
    for node in tree.nodes().filter(|node| node.is_compatible(compatible)) {
        if node.is_disabled() {
            debug!("{}: disabled, skipping", node.path());
            continue;
        }
        let cells = tree.cell_sizes(node)?;
        let base = reg_address(node, cells.address)?;
        debug!("{}: SMMUv{} at {base:#x}", node.path(), revision.major());
        table.commit(Block::new(BlockKind::Smmu { base, revision }))?;
    }
    Ok(())
}

fn decode_root_complexes(
    tree: &DeviceTree<'_>,
    table: &mut TopologyTable,
) -> Result<(), DeviceTreeError> {
    for node in tree.nodes() {
        if node.string_property(compat::PROP_DEVICE_TYPE) != Some(compat::PCI_DEVICE_TYPE) {
            continue;
        }
        tree.host_bridge_cell_sizes(node)?;
        let Some(iommu_map) = node.property(compat::PROP_IOMMU_MAP) else {
            continue;
        };

        // <rid-base iommu-phandle iommu-base length>
        let entry: Vec<u32> = be_cells(iommu_map).take(4).collect();
        if entry.len() < 4 {
            return Err(DeviceTreeError::PropertyTooShort {
                path: node.path().to_string(),
                property: compat::PROP_IOMMU_MAP,
                len: iommu_map.len(),
                need: 16,
            });
        }
        let phandle = entry[1];
        let smmu = tree
            .node_by_phandle(phandle)
            .ok_or_else(|| DeviceTreeError::UnresolvedPhandle {
                path: node.path().to_string(),
                phandle,
            })?;
        let upstream_smmu_base = reg_address(smmu, compat::SMMU_REG_ADDRESS_CELLS)?;

        // Both flags are set when the property is absent.
        let coherent = !node.has_property(compat::PROP_DMA_COHERENT);
        let ats_supported = !node.has_property(compat::PROP_ATS_SUPPORTED);

        debug!(
            "{}: PCI root complex behind {} ({upstream_smmu_base:#x})",
            node.path(),
            smmu.path()
        );
        table.commit(Block::new(BlockKind::PciRootComplex {
            segment: 0,
            coherent,
            ats_supported,
            upstream_smmu_base,
        }))?;
    }
    Ok(())
}

/// First address of `node`'s `reg`, `address_cells` cells wide.
fn reg_address(node: &DtNode<'_>, address_cells: u32) -> Result<u64, DeviceTreeError> {
    let reg = node
        .property(compat::PROP_REG)
        .ok_or_else(|| DeviceTreeError::MissingProperty {
            path: node.path().to_string(),
            property: compat::PROP_REG,
        })?;
    let need = address_cells as usize * 4;
    if reg.len() < need {
        return Err(DeviceTreeError::PropertyTooShort {
            path: node.path().to_string(),
            property: compat::PROP_REG,
            len: reg.len(),
            need,
        });
    }
    Ok(be_cells(reg)
        .take(address_cells as usize)
        .fold(0u64, |address, cell| (address << 32) | u64::from(cell)))
}
