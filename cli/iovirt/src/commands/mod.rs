//! CLI command implementations.

pub mod build;
pub mod check;
pub mod inspect;
pub mod query;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use log::debug;

use iovirt_core::TopologyTable;
use iovirt_platform::{build_topology, PlatformConfig, SourceInputs};

/// Firmware inputs and configuration shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// IORT table image
    #[arg(long)]
    pub iort: Option<PathBuf>,
    /// Flattened device-tree blob
    #[arg(long)]
    pub dtb: Option<PathBuf>,
    /// Platform configuration file (iovirt.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Read the inputs and build the topology.
pub fn build_table(args: &InputArgs) -> Result<TopologyTable> {
    let config = match &args.config {
        Some(path) => {
            PlatformConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => PlatformConfig::default(),
    };
    debug!(
        "inputs: iort={:?} dtb={:?} prefer={}",
        args.iort, args.dtb, config.source.prefer
    );
    let inputs = SourceInputs {
        iort: args.iort.as_deref().map(read).transpose()?,
        dtb: args.dtb.as_deref().map(read).transpose()?,
    };
    build_topology(&inputs, &config).context("building I/O topology")
}

/// Parse a decimal or `0x`-prefixed hexadecimal u32.
pub fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{value}': {e}"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;

    use iovirt_iort::{IortWriter, RawIdMapping, RootComplexNode};
    use tempfile::TempDir;

    use super::InputArgs;

    /// An IORT with one SMMUv3 behind a segment 0 root complex, plus an
    /// SMMUv2 with colliding context interrupts when `collide` is set.
    pub fn iort_inputs(dir: &TempDir, collide: bool) -> InputArgs {
        let mut writer = IortWriter::new();
        let smmu = writer.smmu_v3(0x2b40_0000, &[]);
        writer.root_complex(
            RootComplexNode::default(),
            &[RawIdMapping::new(0x10, 0x10, 0x20, smmu)],
        );
        if collide {
            writer.smmu_v2(0x3000_0000, &[5, 5], &[]);
        }
        let path: PathBuf = dir.path().join("iort.bin");
        std::fs::write(&path, writer.finish()).unwrap();
        InputArgs {
            iort: Some(path),
            ..InputArgs::default()
        }
    }
}
