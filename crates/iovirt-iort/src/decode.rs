//! Recursive IORT decoding into a [`TopologyTable`].

use std::collections::HashMap;

use log::{debug, info, warn};

use iovirt_core::{
    Block, BlockFlags, BlockKind, BlockRef, IdMapping, SmmuRevision, TopologyTable,
};

use crate::error::IortError;
use crate::layout::{self, checksum, FieldReader, RawIdMapping};

/// A validated view over an IORT image.
///
/// Parsing checks the table header and walks the node list once, so every
/// node offset recorded here lies inside the declared table length.
#[derive(Debug, Clone)]
pub struct IortTable<'a> {
    bytes: &'a [u8],
    revision: u8,
    nodes: Vec<u32>,
}

impl<'a> IortTable<'a> {
    /// Validate the header and node list of `bytes`.
    ///
    /// Trailing bytes past the declared table length are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, IortError> {
        if bytes.len() < layout::TABLE_HEADER_LEN {
            return Err(IortError::TableTooSmall {
                len: bytes.len(),
                need: layout::TABLE_HEADER_LEN,
            });
        }
        let header = FieldReader::new(bytes, 0);

        let signature: [u8; 4] = [
            header.u8(0, "signature")?,
            header.u8(1, "signature")?,
            header.u8(2, "signature")?,
            header.u8(3, "signature")?,
        ];
        if signature != layout::SIGNATURE {
            return Err(IortError::InvalidSignature(signature));
        }

        let declared = header.u32(layout::TABLE_LENGTH, "length")? as usize;
        if declared < layout::TABLE_HEADER_LEN {
            return Err(IortError::TableTooSmall {
                len: declared,
                need: layout::TABLE_HEADER_LEN,
            });
        }
        let bytes = bytes.get(..declared).ok_or(IortError::Truncated {
            declared,
            available: bytes.len(),
        })?;
        if checksum(bytes) != 0 {
            warn!(
                "IORT checksum mismatch (stored byte {:#04x}), continuing",
                bytes[layout::TABLE_CHECKSUM]
            );
        }

        let revision = header.u8(layout::TABLE_REVISION, "revision")?;
        let node_count = header.u32(layout::TABLE_NODE_COUNT, "node_count")?;
        let mut offset = header.u32(layout::TABLE_NODE_OFFSET, "node_offset")?;
        let table_length = declared as u32;

        let mut nodes = Vec::with_capacity(node_count.min(256) as usize);
        for index in 0..node_count {
            let out_of_bounds = IortError::NodeOutOfBounds {
                index,
                offset,
                table_length,
            };
            let header_end = offset
                .checked_add(layout::NODE_HEADER_LEN as u32)
                .ok_or(out_of_bounds.clone())?;
            if header_end > table_length {
                return Err(out_of_bounds);
            }
            let reader = FieldReader::new(&bytes[offset as usize..], offset);
            let length = reader.u16(layout::NODE_LENGTH, "length")?;
            if (length as usize) < layout::NODE_HEADER_LEN {
                return Err(IortError::InvalidNodeLength { offset, length });
            }
            let end = offset + u32::from(length);
            if end > table_length {
                return Err(out_of_bounds);
            }
            nodes.push(offset);
            offset = end;
        }

        Ok(Self {
            bytes,
            revision,
            nodes,
        })
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Declared table length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Offsets of every node in the node list, in list order.
    pub fn node_offsets(&self) -> &[u32] {
        &self.nodes
    }

    /// The node starting at `offset`.
    ///
    /// Only offsets found while walking the node list resolve; anything else,
    /// including an offset into the middle of a node, is unresolved.
    pub fn node(&self, offset: u32) -> Result<IortNode<'a>, IortError> {
        if self.nodes.binary_search(&offset).is_err() {
            return Err(IortError::UnresolvedReference { reference: offset });
        }
        let start = offset as usize;
        let head = FieldReader::new(&self.bytes[start..], offset);
        let length = head.u16(layout::NODE_LENGTH, "length")? as usize;
        let bytes = &self.bytes[start..start + length];
        let reader = FieldReader::new(bytes, offset);
        Ok(IortNode {
            offset,
            node_type: reader.u8(layout::NODE_TYPE, "type")?,
            revision: reader.u8(layout::NODE_REVISION, "revision")?,
            reader,
        })
    }

    /// Every node in list order.
    pub fn nodes(&self) -> impl Iterator<Item = Result<IortNode<'a>, IortError>> + '_ {
        self.nodes.iter().map(|offset| self.node(*offset))
    }
}

/// One node of an [`IortTable`].
#[derive(Debug, Clone, Copy)]
pub struct IortNode<'a> {
    offset: u32,
    node_type: u8,
    revision: u8,
    reader: FieldReader<'a>,
}

impl<'a> IortNode<'a> {
    /// Byte offset of the node from the start of the table.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn node_type(&self) -> u8 {
        self.node_type
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Human-readable node type.
    pub fn type_name(&self) -> &'static str {
        match self.node_type {
            layout::NODE_ITS_GROUP => "ITS group",
            layout::NODE_NAMED_COMPONENT => "named component",
            layout::NODE_PCI_ROOT_COMPLEX => "root complex",
            layout::NODE_SMMU => "SMMUv1/v2",
            layout::NODE_SMMU_V3 => "SMMUv3",
            layout::NODE_PMCG => "PMCG",
            _ => "unknown",
        }
    }

    /// The node's ID mapping entries.
    pub fn mappings(&self) -> Result<Vec<RawIdMapping>, IortError> {
        let count = self.reader.u32(layout::NODE_MAPPING_COUNT, "mapping_count")?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let base = self.reader.u32(layout::NODE_MAPPING_OFFSET, "mapping_offset")? as usize;
        (0..count as usize)
            .map(|i| {
                let at = base + i * layout::ID_MAPPING_LEN;
                Ok(RawIdMapping {
                    input_base: self.reader.u32(at, "id_mapping.input_base")?,
                    id_count: self.reader.u32(at + 4, "id_mapping.id_count")?,
                    output_base: self.reader.u32(at + 8, "id_mapping.output_base")?,
                    output_reference: self.reader.u32(at + 12, "id_mapping.output_reference")?,
                    flags: self.reader.u32(at + 16, "id_mapping.flags")?,
                })
            })
            .collect()
    }

    /// ITS identifiers of an ITS group node.
    fn its_identifiers(&self) -> Result<Vec<u32>, IortError> {
        let count = self.reader.u32(layout::ITS_COUNT, "its_count")? as usize;
        (0..count)
            .map(|i| self.reader.u32(layout::ITS_IDENTIFIERS + i * 4, "identifiers"))
            .collect()
    }

    /// Low 32 bits of each SMMUv1/v2 context interrupt entry.
    fn context_interrupts(&self) -> Result<Vec<u32>, IortError> {
        let count = self
            .reader
            .u32(layout::SMMU_CONTEXT_INTERRUPT_COUNT, "context_interrupt_count")?
            as usize;
        let base = self
            .reader
            .u32(layout::SMMU_CONTEXT_INTERRUPT_OFFSET, "context_interrupt_offset")?
            as usize;
        (0..count)
            .map(|i| {
                self.reader.u32(
                    base + i * layout::SMMU_INTERRUPT_ENTRY_LEN,
                    "context_interrupts",
                )
            })
            .collect()
    }
}

/// Decodes IORT nodes into blocks, recursing through references.
///
/// A node is committed only after everything it references has been
/// committed, so every handle held by a candidate block already resolves.
/// Each node offset is decoded at most once; later references reuse the
/// committed handle.
pub struct IortDecoder<'d, 'a> {
    iort: &'d IortTable<'a>,
    table: &'d mut TopologyTable,
    in_progress: Vec<u32>,
    decoded: HashMap<u32, BlockRef>,
}

impl<'d, 'a> IortDecoder<'d, 'a> {
    pub fn new(iort: &'d IortTable<'a>, table: &'d mut TopologyTable) -> Self {
        Self {
            iort,
            table,
            in_progress: Vec::new(),
            decoded: HashMap::new(),
        }
    }

    /// Decode the node at `start_node` and everything reachable from it.
    pub fn decode_iort(&mut self, start_node: u32) -> Result<BlockRef, IortError> {
        if let Some(&handle) = self.decoded.get(&start_node) {
            return Ok(handle);
        }
        if self.in_progress.contains(&start_node) {
            return Err(IortError::CyclicReference { offset: start_node });
        }
        let node = self.iort.node(start_node)?;
        debug!("decoding IORT {} node at {:#x}", node.type_name(), start_node);

        self.in_progress.push(start_node);
        let decoded = self.decode_node(&node);
        self.in_progress.pop();
        let candidate = decoded?;

        let handle = self.table.commit(candidate)?;
        self.decoded.insert(start_node, handle);
        Ok(handle)
    }

    fn decode_node(&mut self, node: &IortNode<'a>) -> Result<Block, IortError> {
        let reader = &node.reader;
        match node.node_type {
            layout::NODE_ITS_GROUP => Ok(Block::new(BlockKind::ItsGroup {
                identifiers: node.its_identifiers()?,
            })),
            layout::NODE_NAMED_COMPONENT => {
                let name = reader.c_str(layout::NC_DEVICE_NAME, "device_name")?;
                let (mappings, _) = self.decode_mappings(node)?;
                Ok(Block::new(BlockKind::named_component(&name)).with_mappings(mappings))
            }
            layout::NODE_PCI_ROOT_COMPLEX => {
                let memory = reader.u64(layout::RC_MEMORY_PROPERTIES, "memory_properties")?;
                let ats = reader.u32(layout::RC_ATS_ATTRIBUTE, "ats_attribute")?;
                let segment = reader.u32(layout::RC_SEGMENT, "segment")?;
                let (mappings, upstream_smmu_base) = self.decode_mappings(node)?;
                Ok(Block::new(BlockKind::PciRootComplex {
                    segment,
                    coherent: memory & layout::RC_CCA_MASK != 0,
                    ats_supported: ats & layout::RC_ATS_SUPPORTED != 0,
                    upstream_smmu_base,
                })
                .with_mappings(mappings))
            }
            layout::NODE_SMMU => {
                let base = reader.u64(layout::SMMU_BASE, "base")?;
                let interrupts = node.context_interrupts()?;
                let (mappings, _) = self.decode_mappings(node)?;
                let mut block = Block::new(BlockKind::Smmu {
                    base,
                    revision: SmmuRevision::V2,
                })
                .with_mappings(mappings);
                if has_duplicates(&interrupts) {
                    warn!(
                        "SMMU at {base:#x} (node {:#x}) has non-unique context interrupts",
                        node.offset
                    );
                    block.raise(BlockFlags::CONTEXT_INTERRUPT_COLLISION);
                }
                Ok(block)
            }
            layout::NODE_SMMU_V3 => {
                let base = reader.u64(layout::SMMU_V3_BASE, "base")?;
                let (mappings, _) = self.decode_mappings(node)?;
                Ok(Block::new(BlockKind::Smmu {
                    base,
                    revision: SmmuRevision::V3,
                })
                .with_mappings(mappings))
            }
            layout::NODE_PMCG => {
                let base = reader.u64(layout::PMCG_BASE, "page0_base")?;
                let overflow_interrupt =
                    reader.u32(layout::PMCG_OVERFLOW_INTERRUPT, "overflow_interrupt")?;
                let target = reader.u32(layout::PMCG_NODE_REFERENCE, "node_reference")?;
                let reference = self.decode_iort(target)?;
                let (mappings, _) = self.decode_mappings(node)?;
                Ok(Block::new(BlockKind::Pmcg {
                    base,
                    overflow_interrupt,
                    reference,
                })
                .with_mappings(mappings))
            }
            other => Err(IortError::UnsupportedNodeType {
                offset: node.offset,
                node_type: other,
            }),
        }
    }

    /// Decode every ID mapping of `node`, recursing into each target.
    ///
    /// Also returns the upstream SMMU base implied by the last mapping: the
    /// target's base when it is an SMMU, otherwise 0.
    fn decode_mappings(&mut self, node: &IortNode<'a>) -> Result<(Vec<IdMapping>, u64), IortError> {
        let raw = node.mappings()?;
        let mut mappings = Vec::with_capacity(raw.len());
        let mut upstream_smmu_base = 0;
        for entry in raw {
            let output_ref = self.decode_iort(entry.output_reference)?;
            upstream_smmu_base = self
                .table
                .resolve(output_ref)?
                .as_smmu()
                .map_or(0, |(base, _)| base);
            mappings.push(IdMapping::new(
                entry.input_base,
                entry.id_count,
                entry.output_base,
                output_ref,
            ));
        }
        Ok((mappings, upstream_smmu_base))
    }
}

fn has_duplicates(ids: &[u32]) -> bool {
    ids.iter()
        .enumerate()
        .any(|(i, id)| ids[i + 1..].contains(id))
}

/// Decode every node in the IORT image `bytes` into `table`.
///
/// Returns the handle of each top-level node, in node-list order. Any error
/// abandons the decode; the table must then be treated as unusable.
pub fn decode_table(bytes: &[u8], table: &mut TopologyTable) -> Result<Vec<BlockRef>, IortError> {
    let iort = IortTable::parse(bytes)?;
    debug!(
        "IORT revision {}, {} bytes, {} nodes",
        iort.revision(),
        iort.len(),
        iort.node_offsets().len()
    );
    let mut decoder = IortDecoder::new(&iort, table);
    let handles = iort
        .node_offsets()
        .iter()
        .map(|offset| decoder.decode_iort(*offset))
        .collect::<Result<Vec<_>, _>>()?;
    info!("IORT decoded: {}", table.counts());
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{IortWriter, RootComplexNode};
    use iovirt_core::ErrorClass;

    #[test]
    fn rejects_short_buffer() {
        let err = IortTable::parse(&[0u8; 10]).unwrap_err();
        assert_eq!(err, IortError::TableTooSmall { len: 10, need: 48 });
        assert_eq!(err.class(), ErrorClass::MalformedSource);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut bytes = IortWriter::new().finish();
        bytes[0..4].copy_from_slice(b"DSDT");
        assert_eq!(
            IortTable::parse(&bytes).unwrap_err(),
            IortError::InvalidSignature(*b"DSDT")
        );
    }

    #[test]
    fn rejects_truncated_image() {
        let mut writer = IortWriter::new();
        writer.smmu_v3(0x1000, &[]);
        let bytes = writer.finish();
        let err = IortTable::parse(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, IortError::Truncated { .. }));
    }

    #[test]
    fn checksum_mismatch_is_not_fatal() {
        let mut writer = IortWriter::new();
        writer.smmu_v3(0x1000, &[]);
        let mut bytes = writer.finish();
        bytes[layout::TABLE_CHECKSUM] ^= 0xff;
        let mut table = TopologyTable::new();
        decode_table(&bytes, &mut table).unwrap();
        assert_eq!(table.counts().smmus, 1);
    }

    #[test]
    fn node_lookup_requires_node_start() {
        let mut writer = IortWriter::new();
        let smmu = writer.smmu_v3(0x1000, &[]);
        let bytes = writer.finish();
        let iort = IortTable::parse(&bytes).unwrap();
        assert_eq!(iort.node(smmu).unwrap().node_type(), layout::NODE_SMMU_V3);
        assert_eq!(iort.node(smmu).unwrap().type_name(), "SMMUv3");
        assert_eq!(
            iort.node(smmu + 4).unwrap_err(),
            IortError::UnresolvedReference {
                reference: smmu + 4
            }
        );
    }

    #[test]
    fn decodes_root_complex_fields() {
        let mut writer = IortWriter::new();
        let rc = writer.root_complex(
            RootComplexNode {
                segment: 3,
                coherent: true,
                ats_supported: false,
            },
            &[],
        );
        let bytes = writer.finish();
        let iort = IortTable::parse(&bytes).unwrap();
        let mut table = TopologyTable::new();
        let handle = IortDecoder::new(&iort, &mut table).decode_iort(rc).unwrap();
        assert_eq!(
            *table.get(handle).unwrap().kind(),
            BlockKind::PciRootComplex {
                segment: 3,
                coherent: true,
                ats_supported: false,
                upstream_smmu_base: 0,
            }
        );
    }

    #[test]
    fn upstream_base_follows_last_mapping() {
        let mut writer = IortWriter::new();
        let its = writer.its_group(&[0]);
        let smmu = writer.smmu_v3(0x2b40_0000, &[RawIdMapping::new(0, 0x100, 0, its)]);
        let rc_smmu_last = writer.root_complex(
            RootComplexNode::default(),
            &[
                RawIdMapping::new(0x100, 0x10, 0x100, its),
                RawIdMapping::new(0, 0x100, 0, smmu),
            ],
        );
        let rc_its_last = writer.root_complex(
            RootComplexNode {
                segment: 1,
                ..RootComplexNode::default()
            },
            &[
                RawIdMapping::new(0, 0x100, 0, smmu),
                RawIdMapping::new(0x100, 0x10, 0x100, its),
            ],
        );
        let bytes = writer.finish();
        let iort = IortTable::parse(&bytes).unwrap();
        let mut table = TopologyTable::new();
        let mut decoder = IortDecoder::new(&iort, &mut table);
        let a = decoder.decode_iort(rc_smmu_last).unwrap();
        let b = decoder.decode_iort(rc_its_last).unwrap();

        let upstream = |handle| match table.get(handle).unwrap().kind() {
            BlockKind::PciRootComplex {
                upstream_smmu_base, ..
            } => *upstream_smmu_base,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(upstream(a), 0x2b40_0000);
        assert_eq!(upstream(b), 0);
    }

    #[test]
    fn named_component_name_is_read() {
        let mut writer = IortWriter::new();
        let nc = writer.named_component("\\_SB.ETH0", &[]);
        let bytes = writer.finish();
        let mut table = TopologyTable::new();
        let handles = decode_table(&bytes, &mut table).unwrap();
        assert_eq!(handles, vec![BlockRef::new(0)]);
        assert_eq!(
            *table.get(handles[0]).unwrap().kind(),
            BlockKind::named_component("\\_SB.ETH0")
        );
        assert_eq!(IortTable::parse(&bytes).unwrap().node_offsets(), &[nc]);
    }

    #[test]
    fn mapping_past_node_end_is_malformed() {
        let mut writer = IortWriter::new();
        // Claims two mappings but carries none.
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&0x1000u32.to_le_bytes());
        writer.raw_node_with_header(layout::NODE_SMMU_V3, 2, 16, &data);
        let bytes = writer.finish();
        let mut table = TopologyTable::new();
        let err = decode_table(&bytes, &mut table).unwrap_err();
        assert!(matches!(err, IortError::FieldOutOfBounds { .. }));
        assert_eq!(err.class(), ErrorClass::MalformedSource);
    }

    #[test]
    fn duplicate_detection() {
        assert!(has_duplicates(&[5, 5]));
        assert!(has_duplicates(&[1, 2, 3, 1]));
        assert!(!has_duplicates(&[5, 6]));
        assert!(!has_duplicates(&[]));
    }
}
