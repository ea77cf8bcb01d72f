//! Whole-graph checks and read-only queries over a built topology.
//!
//! The [`overlap`] analyzer runs once after a decoder has populated the
//! table and records aliasing ID ranges as block flags. After that the table
//! is only read: [`query`] answers the per-block checks and requester-ID
//! lookups, and [`report`] gathers every raised flag for display.

pub mod overlap;
pub mod query;
pub mod report;

pub use overlap::{analyze, Overlap};
pub use query::{
    rc_smmu_index, resolve_smmu_base, root_complex, smmu_count, smmu_info,
    unique_context_interrupts, unique_requester_stream_mapping, SmmuInfo, SmmuRoute,
};
pub use report::{TopologyReport, TopologyWarning};
