//! `iovirt inspect`: full block dump plus the warning report.

use anyhow::Result;

use iovirt_verify::TopologyReport;

use super::{build_table, InputArgs};

pub fn run(inputs: &InputArgs, json: bool) -> Result<()> {
    let table = build_table(inputs)?;
    let report = TopologyReport::collect(&table);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{table}");
        println!();
        print!("{report}");
    }
    Ok(())
}
