//! IORT image writer.
//!
//! Produces well-formed images in the layout the decoder reads: node list
//! immediately after the table header, each node followed by its ID mapping
//! array, and a valid ACPI checksum.

use crate::layout::{self, RawIdMapping};

const TABLE_REVISION: u8 = 3;
const NODE_REVISION: u8 = 0;

/// Fixed fields of a root complex node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootComplexNode {
    pub segment: u32,
    pub coherent: bool,
    pub ats_supported: bool,
}

/// Builds an IORT image node by node.
///
/// Each node method returns the offset of the node it appended, which is
/// the value other nodes use to reference it. Use [`IortWriter::next_offset`]
/// to reference a node before it is written.
#[derive(Debug, Clone, Default)]
pub struct IortWriter {
    nodes: Vec<u8>,
    node_count: u32,
}

impl IortWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next appended node will have.
    pub fn next_offset(&self) -> u32 {
        (layout::TABLE_HEADER_LEN + self.nodes.len()) as u32
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn its_group(&mut self, identifiers: &[u32]) -> u32 {
        let mut data = Vec::with_capacity(4 + identifiers.len() * 4);
        data.extend_from_slice(&(identifiers.len() as u32).to_le_bytes());
        for id in identifiers {
            data.extend_from_slice(&id.to_le_bytes());
        }
        self.raw_node(layout::NODE_ITS_GROUP, &data, &[])
    }

    pub fn named_component(&mut self, name: &str, mappings: &[RawIdMapping]) -> u32 {
        let mut data = vec![0u8; layout::NC_DEVICE_NAME - layout::NODE_HEADER_LEN];
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        pad4(&mut data);
        self.raw_node(layout::NODE_NAMED_COMPONENT, &data, mappings)
    }

    pub fn root_complex(&mut self, node: RootComplexNode, mappings: &[RawIdMapping]) -> u32 {
        let mut data = [0u8; layout::RC_NODE_LEN - layout::NODE_HEADER_LEN];
        let memory = if node.coherent { layout::RC_CCA_MASK } else { 0 };
        let ats = if node.ats_supported {
            layout::RC_ATS_SUPPORTED
        } else {
            0
        };
        put(&mut data, layout::RC_MEMORY_PROPERTIES, &memory.to_le_bytes());
        put(&mut data, layout::RC_ATS_ATTRIBUTE, &ats.to_le_bytes());
        put(&mut data, layout::RC_SEGMENT, &node.segment.to_le_bytes());
        self.raw_node(layout::NODE_PCI_ROOT_COMPLEX, &data, mappings)
    }

    /// SMMUv1/v2 node with the given context interrupt ids.
    pub fn smmu_v2(
        &mut self,
        base: u64,
        context_interrupts: &[u32],
        mappings: &[RawIdMapping],
    ) -> u32 {
        // Two global interrupt entries follow the fixed fields.
        let global = layout::SMMU_NODE_LEN;
        let context = global + 2 * layout::SMMU_INTERRUPT_ENTRY_LEN;
        let mut data = vec![
            0u8;
            context + context_interrupts.len() * layout::SMMU_INTERRUPT_ENTRY_LEN
                - layout::NODE_HEADER_LEN
        ];
        put(&mut data, layout::SMMU_BASE, &base.to_le_bytes());
        put(&mut data, layout::SMMU_SPAN, &0x1_0000u64.to_le_bytes());
        put(
            &mut data,
            layout::SMMU_GLOBAL_INTERRUPT_OFFSET,
            &(global as u32).to_le_bytes(),
        );
        put(
            &mut data,
            layout::SMMU_CONTEXT_INTERRUPT_COUNT,
            &(context_interrupts.len() as u32).to_le_bytes(),
        );
        put(
            &mut data,
            layout::SMMU_CONTEXT_INTERRUPT_OFFSET,
            &(context as u32).to_le_bytes(),
        );
        for (i, gsiv) in context_interrupts.iter().enumerate() {
            put(
                &mut data,
                context + i * layout::SMMU_INTERRUPT_ENTRY_LEN,
                &gsiv.to_le_bytes(),
            );
        }
        self.raw_node(layout::NODE_SMMU, &data, mappings)
    }

    pub fn smmu_v3(&mut self, base: u64, mappings: &[RawIdMapping]) -> u32 {
        let mut data = [0u8; layout::SMMU_V3_NODE_LEN - layout::NODE_HEADER_LEN];
        put(&mut data, layout::SMMU_V3_BASE, &base.to_le_bytes());
        self.raw_node(layout::NODE_SMMU_V3, &data, mappings)
    }

    pub fn pmcg(
        &mut self,
        base: u64,
        overflow_interrupt: u32,
        node_reference: u32,
        mappings: &[RawIdMapping],
    ) -> u32 {
        let mut data = [0u8; layout::PMCG_NODE_LEN - layout::NODE_HEADER_LEN];
        put(&mut data, layout::PMCG_BASE, &base.to_le_bytes());
        put(
            &mut data,
            layout::PMCG_OVERFLOW_INTERRUPT,
            &overflow_interrupt.to_le_bytes(),
        );
        put(
            &mut data,
            layout::PMCG_NODE_REFERENCE,
            &node_reference.to_le_bytes(),
        );
        self.raw_node(layout::NODE_PMCG, &data, mappings)
    }

    /// Append a node of any type: `data` follows the node header and the
    /// mapping array follows `data`.
    pub fn raw_node(&mut self, node_type: u8, data: &[u8], mappings: &[RawIdMapping]) -> u32 {
        let mapping_offset = if mappings.is_empty() {
            0
        } else {
            (layout::NODE_HEADER_LEN + data.len()) as u32
        };
        let offset =
            self.raw_node_with_header(node_type, mappings.len() as u32, mapping_offset, data);
        for mapping in mappings {
            self.nodes.extend_from_slice(&mapping.encode());
        }
        self.patch_node_length(offset);
        offset
    }

    /// Append a node whose mapping count and offset are written verbatim,
    /// without a mapping array.
    pub fn raw_node_with_header(
        &mut self,
        node_type: u8,
        mapping_count: u32,
        mapping_offset: u32,
        data: &[u8],
    ) -> u32 {
        let offset = self.next_offset();
        let identifier = self.node_count;
        self.nodes.push(node_type);
        self.nodes.extend_from_slice(&[0, 0]);
        self.nodes.push(NODE_REVISION);
        self.nodes.extend_from_slice(&identifier.to_le_bytes());
        self.nodes.extend_from_slice(&mapping_count.to_le_bytes());
        self.nodes.extend_from_slice(&mapping_offset.to_le_bytes());
        self.nodes.extend_from_slice(data);
        self.node_count += 1;
        self.patch_node_length(offset);
        offset
    }

    fn patch_node_length(&mut self, offset: u32) {
        let start = offset as usize - layout::TABLE_HEADER_LEN;
        let length = (self.nodes.len() - start) as u16;
        self.nodes[start + layout::NODE_LENGTH..start + layout::NODE_LENGTH + 2]
            .copy_from_slice(&length.to_le_bytes());
    }

    /// The finished image, with header, length and checksum filled in.
    pub fn finish(self) -> Vec<u8> {
        let length = (layout::TABLE_HEADER_LEN + self.nodes.len()) as u32;
        let mut bytes = Vec::with_capacity(length as usize);
        bytes.extend_from_slice(&layout::SIGNATURE);
        bytes.extend_from_slice(&length.to_le_bytes());
        bytes.push(TABLE_REVISION);
        bytes.push(0);
        bytes.extend_from_slice(b"IOVIRT");
        bytes.extend_from_slice(b"IOVIRTTB");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(b"IOVT");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&self.node_count.to_le_bytes());
        bytes.extend_from_slice(&(layout::TABLE_HEADER_LEN as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&self.nodes);

        let sum = layout::checksum(&bytes);
        bytes[layout::TABLE_CHECKSUM] = 0u8.wrapping_sub(sum);
        bytes
    }
}

/// Write `value` at node-relative offset `at` into `data`, which starts
/// right after the node header.
fn put(data: &mut [u8], at: usize, value: &[u8]) {
    let start = at - layout::NODE_HEADER_LEN;
    data[start..start + value.len()].copy_from_slice(value);
}

fn pad4(data: &mut Vec<u8>) {
    while (layout::NODE_HEADER_LEN + data.len()) % 4 != 0 {
        data.push(0);
    }
}
