//! `iovirt check`: per-block uniqueness checks.

use anyhow::{bail, Result};

use iovirt_core::{BlockType, TopologyTable};
use iovirt_verify::{unique_context_interrupts, unique_requester_stream_mapping};

use super::{build_table, InputArgs};

/// Outcome of one check on one block.
#[derive(Debug, PartialEq, Eq)]
struct CheckResult {
    subject: String,
    check: &'static str,
    passed: bool,
}

fn check_table(table: &TopologyTable) -> Vec<CheckResult> {
    table
        .blocks()
        .filter_map(|(handle, block)| match block.block_type() {
            BlockType::Smmu => Some(CheckResult {
                subject: format!("SMMU {handle}"),
                check: "unique context bank interrupts",
                passed: unique_context_interrupts(block),
            }),
            BlockType::PciRootComplex => Some(CheckResult {
                subject: format!("root complex {handle}"),
                check: "unique requester/stream ID mapping",
                passed: unique_requester_stream_mapping(block),
            }),
            _ => None,
        })
        .collect()
}

pub fn run(inputs: &InputArgs) -> Result<()> {
    let table = build_table(inputs)?;
    let results = check_table(&table);
    for result in &results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!("[{status}] {}: {}", result.subject, result.check);
    }
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        bail!("{failed} of {} checks failed", results.len());
    }
    println!("All {} checks passed.", results.len());
    Ok(())
}
