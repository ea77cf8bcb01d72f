//! Source selection and the build pipeline.

use std::fmt;

use log::{debug, info, warn};

use iovirt_core::{Block, BlockKind, SmmuRevision, TopologyTable};
use iovirt_dt::decode_device_tree;
use iovirt_iort::decode_table;
use iovirt_verify::analyze;

use crate::config::{PlatformConfig, SourcePreference};
use crate::error::BuildError;

/// Raw firmware inputs available to a build.
#[derive(Debug, Clone, Default)]
pub struct SourceInputs {
    pub iort: Option<Vec<u8>>,
    pub dtb: Option<Vec<u8>>,
}

impl SourceInputs {
    pub fn iort(bytes: Vec<u8>) -> Self {
        Self {
            iort: Some(bytes),
            dtb: None,
        }
    }

    pub fn device_tree(blob: Vec<u8>) -> Self {
        Self {
            iort: None,
            dtb: Some(blob),
        }
    }
}

/// The source a build populated its table from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologySource {
    Override,
    Iort,
    DeviceTree,
}

impl fmt::Display for TopologySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologySource::Override => write!(f, "platform override"),
            TopologySource::Iort => write!(f, "IORT"),
            TopologySource::DeviceTree => write!(f, "device tree"),
        }
    }
}

/// Pick exactly one source for a build.
///
/// An enabled override always wins. Otherwise `auto` takes the IORT image
/// when present and falls back to the device tree; an explicit preference
/// requires its input.
pub fn select_source(
    inputs: &SourceInputs,
    config: &PlatformConfig,
) -> Result<TopologySource, BuildError> {
    if config.smmu_override.is_enabled() {
        return Ok(TopologySource::Override);
    }
    let prefer = config.source.prefer;
    match (prefer, &inputs.iort, &inputs.dtb) {
        (SourcePreference::Auto | SourcePreference::Iort, Some(_), _) => Ok(TopologySource::Iort),
        (SourcePreference::Auto | SourcePreference::DeviceTree, _, Some(_)) => {
            Ok(TopologySource::DeviceTree)
        }
        _ => Err(BuildError::NoSource { prefer }),
    }
}

/// The single-SMMU table used when the platform overrides firmware.
pub fn override_table(base: u64, revision: SmmuRevision) -> Result<TopologyTable, BuildError> {
    let mut table = TopologyTable::new();
    table.commit(Block::new(BlockKind::Smmu { base, revision }))?;
    Ok(table)
}

/// Build a topology table from the selected source.
///
/// Decoding runs into a fresh table, followed by one overlap analysis pass.
/// On any error no table is returned.
pub fn build_topology(
    inputs: &SourceInputs,
    config: &PlatformConfig,
) -> Result<TopologyTable, BuildError> {
    config.validate()?;
    let source = select_source(inputs, config)?;
    info!("building I/O topology from {source}");

    let mut table = TopologyTable::new();
    match source {
        TopologySource::Override => {
            if let Some((base, revision)) = config.smmu_override.smmu()? {
                table = override_table(base, revision)?;
            }
        }
        TopologySource::Iort => {
            let bytes = inputs.iort.as_deref().unwrap_or_default();
            decode_table(bytes, &mut table)?;
        }
        TopologySource::DeviceTree => {
            let blob = inputs.dtb.as_deref().unwrap_or_default();
            decode_device_tree(blob, &mut table)?;
        }
    }

    if source != TopologySource::Override {
        let overlaps = analyze(&mut table)?;
        if !overlaps.is_empty() {
            warn!("{} overlapping ID range pairs", overlaps.len());
        }
    }

    debug!("{table}");
    info!("I/O topology: {}", table.counts());
    Ok(table)
}
