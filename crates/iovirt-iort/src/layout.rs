//! IORT binary layout: offsets, sizes and node type codes.
//!
//! Node field offsets are relative to the start of the node.

use std::borrow::Cow;

use crate::error::IortError;

/// Table signature.
pub const SIGNATURE: [u8; 4] = *b"IORT";

/// ACPI header plus node count, node offset and a reserved word.
pub const TABLE_HEADER_LEN: usize = 48;

pub const TABLE_LENGTH: usize = 4;
pub const TABLE_REVISION: usize = 8;
pub const TABLE_CHECKSUM: usize = 9;
pub const TABLE_NODE_COUNT: usize = 36;
pub const TABLE_NODE_OFFSET: usize = 40;

/// Common node header length.
pub const NODE_HEADER_LEN: usize = 16;

pub const NODE_TYPE: usize = 0;
pub const NODE_LENGTH: usize = 1;
pub const NODE_REVISION: usize = 3;
pub const NODE_MAPPING_COUNT: usize = 8;
pub const NODE_MAPPING_OFFSET: usize = 12;

pub const NODE_ITS_GROUP: u8 = 0;
pub const NODE_NAMED_COMPONENT: u8 = 1;
pub const NODE_PCI_ROOT_COMPLEX: u8 = 2;
pub const NODE_SMMU: u8 = 3;
pub const NODE_SMMU_V3: u8 = 4;
pub const NODE_PMCG: u8 = 5;

// ITS group
pub const ITS_COUNT: usize = 16;
pub const ITS_IDENTIFIERS: usize = 20;

// Named component
pub const NC_DEVICE_NAME: usize = 29;

// Root complex
pub const RC_MEMORY_PROPERTIES: usize = 16;
pub const RC_ATS_ATTRIBUTE: usize = 24;
pub const RC_SEGMENT: usize = 28;
pub const RC_NODE_LEN: usize = 36;
/// Coherent-access bit of the memory access properties.
pub const RC_CCA_MASK: u64 = 0x1;
pub const RC_ATS_SUPPORTED: u32 = 0x1;

// SMMUv1/v2
pub const SMMU_BASE: usize = 16;
pub const SMMU_SPAN: usize = 24;
pub const SMMU_GLOBAL_INTERRUPT_OFFSET: usize = 40;
pub const SMMU_CONTEXT_INTERRUPT_COUNT: usize = 44;
pub const SMMU_CONTEXT_INTERRUPT_OFFSET: usize = 48;
pub const SMMU_NODE_LEN: usize = 60;
/// Each interrupt entry is a GSIV followed by a flags word.
pub const SMMU_INTERRUPT_ENTRY_LEN: usize = 8;

// SMMUv3
pub const SMMU_V3_BASE: usize = 16;
pub const SMMU_V3_NODE_LEN: usize = 68;

// PMCG
pub const PMCG_BASE: usize = 16;
pub const PMCG_OVERFLOW_INTERRUPT: usize = 24;
pub const PMCG_NODE_REFERENCE: usize = 28;
pub const PMCG_NODE_LEN: usize = 40;

/// ID mapping entry: input base, count, output base, output reference, flags.
pub const ID_MAPPING_LEN: usize = 20;

/// An ID mapping entry as stored in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawIdMapping {
    pub input_base: u32,
    pub id_count: u32,
    pub output_base: u32,
    /// Byte offset of the target node from the start of the table.
    pub output_reference: u32,
    pub flags: u32,
}

impl RawIdMapping {
    pub fn new(input_base: u32, id_count: u32, output_base: u32, output_reference: u32) -> Self {
        Self {
            input_base,
            id_count,
            output_base,
            output_reference,
            flags: 0,
        }
    }

    pub(crate) fn encode(&self) -> [u8; ID_MAPPING_LEN] {
        let mut out = [0u8; ID_MAPPING_LEN];
        for (i, word) in [
            self.input_base,
            self.id_count,
            self.output_base,
            self.output_reference,
            self.flags,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// Bounds-checked little-endian reads from one node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    /// Offset of `bytes` within the table, for error reports.
    offset: u32,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], offset: u32) -> Self {
        Self { bytes, offset }
    }

    fn array<const N: usize>(&self, at: usize, field: &'static str) -> Result<[u8; N], IortError> {
        at.checked_add(N)
            .and_then(|end| self.bytes.get(at..end))
            .and_then(|slice| slice.try_into().ok())
            .ok_or(IortError::FieldOutOfBounds {
                offset: self.offset,
                field,
            })
    }

    pub(crate) fn u8(&self, at: usize, field: &'static str) -> Result<u8, IortError> {
        Ok(self.array::<1>(at, field)?[0])
    }

    pub(crate) fn u16(&self, at: usize, field: &'static str) -> Result<u16, IortError> {
        Ok(u16::from_le_bytes(self.array(at, field)?))
    }

    pub(crate) fn u32(&self, at: usize, field: &'static str) -> Result<u32, IortError> {
        Ok(u32::from_le_bytes(self.array(at, field)?))
    }

    pub(crate) fn u64(&self, at: usize, field: &'static str) -> Result<u64, IortError> {
        Ok(u64::from_le_bytes(self.array(at, field)?))
    }

    /// NUL-terminated ASCII string starting at `at`, bounded by the node end.
    /// Bytes that are not UTF-8 are replaced, not rejected.
    pub(crate) fn c_str(&self, at: usize, field: &'static str) -> Result<Cow<'a, str>, IortError> {
        let tail = self.bytes.get(at..).ok_or(IortError::FieldOutOfBounds {
            offset: self.offset,
            field,
        })?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]))
    }
}

/// ACPI checksum: all bytes of the table must sum to zero.
pub(crate) fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_rejects_out_of_bounds_fields() {
        let bytes = [1u8, 0, 0, 0, 2, 0];
        let reader = FieldReader::new(&bytes, 0x30);
        assert_eq!(reader.u32(0, "a").unwrap(), 1);
        assert_eq!(reader.u16(4, "b").unwrap(), 2);
        assert_eq!(
            reader.u32(4, "c").unwrap_err(),
            IortError::FieldOutOfBounds {
                offset: 0x30,
                field: "c"
            }
        );
        assert!(reader.u64(usize::MAX - 2, "d").is_err());
    }

    #[test]
    fn c_str_stops_at_terminator() {
        let bytes = b"\\_SB.ETH0\0garbage";
        let reader = FieldReader::new(bytes, 0);
        assert_eq!(reader.c_str(0, "name").unwrap(), "\\_SB.ETH0");
        assert_eq!(reader.c_str(5, "name").unwrap(), "ETH0");
    }

    #[test]
    fn c_str_replaces_invalid_utf8() {
        let bytes = [b'N', b'C', 0xff, b'0', 0];
        let reader = FieldReader::new(&bytes, 0x40);
        assert_eq!(reader.c_str(0, "name").unwrap(), "NC\u{fffd}0");
    }

    #[test]
    fn raw_mapping_encoding_is_little_endian() {
        let raw = RawIdMapping::new(0x10, 0x20, 0x30, 0x1234);
        let bytes = raw.encode();
        assert_eq!(&bytes[0..4], &[0x10, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0x34, 0x12, 0, 0]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
    }
}
