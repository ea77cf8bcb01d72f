//! Block handles and ID-remapping ranges.
//!
//! A [`BlockRef`] is the only way one block refers to another. It names a
//! position in the owning [`TopologyTable`](crate::TopologyTable) and is
//! dereferenced through the table's bounds-checked lookup, never through a
//! raw address.

use std::fmt;

use serde::Serialize;

/// Stable handle to a committed block.
///
/// Handles are assigned in commit order and are never reused or relocated
/// for the lifetime of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockRef(u32);

impl BlockRef {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the referenced block in the table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One ID-remapping range.
///
/// Input IDs `[input_base, input_base + id_count)` are remapped to output IDs
/// `[output_base, output_base + id_count)` at the block named by
/// `output_ref`. Arithmetic on the bounds wraps at 32 bits, like the firmware
/// fields it is decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IdMapping {
    pub input_base: u32,
    pub id_count: u32,
    pub output_base: u32,
    pub output_ref: BlockRef,
}

impl IdMapping {
    pub fn new(input_base: u32, id_count: u32, output_base: u32, output_ref: BlockRef) -> Self {
        Self {
            input_base,
            id_count,
            output_base,
            output_ref,
        }
    }

    /// Output range as `(first, last)`, with `last = output_base + id_count - 1`.
    pub fn output_span(&self) -> (u32, u32) {
        let first = self.output_base;
        (first, first.wrapping_add(self.id_count).wrapping_sub(1))
    }

    /// Whether the output spans of two mappings intersect.
    ///
    /// Both spans are closed intervals as returned by [`output_span`](Self::output_span),
    /// so `[100, 104)` and `[104, 108)` do not intersect.
    pub fn output_overlaps(&self, other: &IdMapping) -> bool {
        let (key_start, key_end) = self.output_span();
        let (start, end) = other.output_span();
        (key_start >= start && key_start <= end)
            || (key_end >= start && key_end <= end)
            || (key_start < start && key_end > end)
    }

    /// Whether a requester/stream ID falls in this mapping's input range.
    ///
    /// The upper bound is inclusive of `input_base + id_count`, one past the
    /// range used by [`output_overlaps`](Self::output_overlaps). Both call
    /// sites keep their own bound.
    pub fn accepts_input(&self, id: u32) -> bool {
        id >= self.input_base && id <= self.input_base.wrapping_add(self.id_count)
    }

    /// Remap an input ID into this mapping's output space.
    pub fn translate(&self, id: u32) -> u32 {
        id.wrapping_sub(self.input_base).wrapping_add(self.output_base)
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input_base:{:#x} id_count:{:#x} output_base:{:#x} output_ref:{}",
            self.input_base, self.id_count, self.output_base, self.output_ref
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(output_base: u32, id_count: u32) -> IdMapping {
        IdMapping::new(0, id_count, output_base, BlockRef::new(0))
    }

    #[test]
    fn intersecting_spans_overlap() {
        let a = mapping(100, 4);
        let b = mapping(102, 4);
        assert!(a.output_overlaps(&b));
        assert!(b.output_overlaps(&a));
    }

    #[test]
    fn enclosing_span_overlaps() {
        let outer = mapping(0, 0x100);
        let inner = mapping(0x10, 0x10);
        assert!(outer.output_overlaps(&inner));
        assert!(inner.output_overlaps(&outer));
    }

    #[test]
    fn disjoint_and_adjacent_spans_do_not_overlap() {
        assert!(!mapping(100, 4).output_overlaps(&mapping(200, 4)));
        assert!(!mapping(100, 4).output_overlaps(&mapping(104, 4)));
    }

    #[test]
    fn input_bound_is_one_past_the_range() {
        let m = IdMapping::new(0x10, 0x10, 0x20, BlockRef::new(1));
        assert!(!m.accepts_input(0x0f));
        assert!(m.accepts_input(0x10));
        assert!(m.accepts_input(0x1f));
        // Inclusive upper bound, unlike the output span used for overlap.
        assert!(m.accepts_input(0x20));
        assert!(!m.accepts_input(0x21));
    }

    #[test]
    fn translate_offsets_into_output_space() {
        let m = IdMapping::new(0x10, 0x10, 0x20, BlockRef::new(1));
        assert_eq!(m.translate(0x15), 0x25);
    }

    #[test]
    fn zero_count_span_wraps() {
        let m = mapping(0, 0);
        assert_eq!(m.output_span(), (0, u32::MAX));
    }
}
