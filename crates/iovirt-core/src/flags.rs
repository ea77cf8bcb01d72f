//! Per-block warning flags.
//!
//! Flags record topology warnings found while building the table. They only
//! ever gain bits: there is no way to clear one once raised.

use std::fmt;

use serde::Serialize;

/// Accumulate-only bitset of topology warnings attached to a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BlockFlags {
    bits: u8,
}

impl BlockFlags {
    /// No flags set.
    pub const NONE: BlockFlags = BlockFlags { bits: 0 };

    /// Two mappings targeting the same ITS group alias device IDs.
    pub const DEVICE_ID_OVERLAP: u8 = 0x01;

    /// Two mappings targeting the same non-ITS block alias stream IDs.
    pub const STREAM_ID_OVERLAP: u8 = 0x02;

    /// An SMMUv2 declares the same interrupt for two context banks.
    pub const CONTEXT_INTERRUPT_COLLISION: u8 = 0x04;

    const NAMES: [(u8, &'static str); 3] = [
        (Self::DEVICE_ID_OVERLAP, "device-id-overlap"),
        (Self::STREAM_ID_OVERLAP, "stream-id-overlap"),
        (Self::CONTEXT_INTERRUPT_COLLISION, "context-interrupt-collision"),
    ];

    pub fn has(&self, flag: u8) -> bool {
        self.bits & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.bits |= flag;
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Names of the set flags, in bit order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for BlockFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.names().collect();
        write!(f, "{}", names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accumulate() {
        let mut flags = BlockFlags::NONE;
        assert!(flags.is_empty());
        flags.set(BlockFlags::STREAM_ID_OVERLAP);
        flags.set(BlockFlags::CONTEXT_INTERRUPT_COLLISION);
        flags.set(BlockFlags::STREAM_ID_OVERLAP);
        assert!(flags.has(BlockFlags::STREAM_ID_OVERLAP));
        assert!(flags.has(BlockFlags::CONTEXT_INTERRUPT_COLLISION));
        assert!(!flags.has(BlockFlags::DEVICE_ID_OVERLAP));
        assert_eq!(flags.bits(), 0x06);
    }

    #[test]
    fn display_lists_names() {
        let mut flags = BlockFlags::NONE;
        assert_eq!(flags.to_string(), "none");
        flags.set(BlockFlags::DEVICE_ID_OVERLAP);
        flags.set(BlockFlags::CONTEXT_INTERRUPT_COLLISION);
        assert_eq!(
            flags.to_string(),
            "device-id-overlap,context-interrupt-collision"
        );
    }
}
