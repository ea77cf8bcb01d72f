//! `iovirt query`: read-only lookups on a built topology.

use anyhow::Result;
use serde::Serialize;

use iovirt_verify::{rc_smmu_index, resolve_smmu_base, SmmuRoute};

use super::{build_table, InputArgs};

#[derive(Debug, Serialize)]
struct SmmuBaseAnswer {
    segment: u32,
    requester_id: u32,
    #[serde(flatten)]
    route: SmmuRoute,
    smmu_index: Option<usize>,
}

pub fn smmu_base(inputs: &InputArgs, segment: u32, rid: u32, json: bool) -> Result<()> {
    let table = build_table(inputs)?;
    let answer = SmmuBaseAnswer {
        segment,
        requester_id: rid,
        route: resolve_smmu_base(&table, segment, rid)?,
        smmu_index: rc_smmu_index(&table, segment, rid)?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", render(&answer));
    }
    Ok(())
}

fn render(answer: &SmmuBaseAnswer) -> String {
    let mut line = format!(
        "segment {} requester {:#x}: {}",
        answer.segment, answer.requester_id, answer.route
    );
    if let Some(index) = answer.smmu_index {
        line.push_str(&format!(" (SMMU index {index})"));
    }
    line
}
