//! `iovirt build`: build the topology and summarize it.

use anyhow::Result;

use iovirt_core::TopologyTable;

use super::{build_table, InputArgs};

pub fn run(inputs: &InputArgs, json: bool) -> Result<()> {
    let table = build_table(inputs)?;
    println!("{}", render(&table, json)?);
    Ok(())
}

fn render(table: &TopologyTable, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(table)?);
    }
    let counts = table.counts();
    Ok([
        "I/O topology built:".to_string(),
        format!("  Blocks:            {}", counts.blocks),
        format!("  SMMUs:             {}", counts.smmus),
        format!("  Root complexes:    {}", counts.root_complexes),
        format!("  Named components:  {}", counts.named_components),
        format!("  ITS groups:        {}", counts.its_groups),
        format!("  PMCGs:             {}", counts.pmcgs),
    ]
    .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;

    #[test]
    fn text_summary_lists_counts() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_table(&fixtures::iort_inputs(&dir, false)).unwrap();
        let text = render(&table, false).unwrap();
        assert!(text.contains("Blocks:            2"));
        assert!(text.contains("SMMUs:             1"));
    }

    #[test]
    fn json_contains_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_table(&fixtures::iort_inputs(&dir, false)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&render(&table, true).unwrap()).unwrap();
        assert_eq!(value["counts"]["blocks"], 2);
        assert_eq!(value["blocks"][1]["kind"]["type"], "pci-root-complex");
    }
}
