use crate::Context;
use crate::cli::OutputFormat;
use anyhow::{Context as _, Result};
use frkl::Leaf;
use serde_json::Value;

/// Print resolved leaves.
pub fn run(ctx: &Context, sources: &[String], raw: bool, format: OutputFormat) -> Result<()> {
    let leaves = super::resolve(&ctx.config, sources)?;
    print!("{}", render(&leaves, raw, format)?);
    Ok(())
}

/// Leaves as a YAML or JSON list, merged or as raw per-level layers.
pub fn render(leaves: &[Leaf], raw: bool, format: OutputFormat) -> Result<String> {
    let list = leaves
        .iter()
        .map(|leaf| {
            if raw {
                serde_json::to_value(&leaf.layers).context("Could not serialize layers")
            } else {
                Ok(leaf.to_value())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let list = Value::Array(list);

    match format {
        OutputFormat::Yaml => serde_yaml::to_string(&list).context("Could not serialize to YAML"),
        OutputFormat::Json => serde_json::to_string_pretty(&list)
            .map(|s| s + "\n")
            .context("Could not serialize to JSON"),
    }
}
