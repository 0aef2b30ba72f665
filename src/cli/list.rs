//! List command.

use std::path::Path;

use anyhow::Context;
use console::style;

use super::renderer_factory;
use crate::config::HarvestConfig;
use crate::lister::list_summaries;

/// List summaries only and write them as a JSON array.
pub async fn cmd_list(config: &HarvestConfig, output: &Path) -> anyhow::Result<()> {
    config.validate()?;
    let start_url = config
        .start_url
        .as_deref()
        .context("no start URL given (pass one or set start_url in the config file)")?;

    let mut renderer = renderer_factory(config).create(0).await?;
    let outcome =
        list_summaries(renderer.as_mut(), start_url, &config.selectors, &config.timing).await;
    renderer.close().await;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&outcome.summaries)?;
    std::fs::write(output, json)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{} Listed {} of {} comments ({}) -> {}",
        style("✓").green(),
        outcome.summaries.len(),
        outcome.advertised_total,
        outcome.end,
        output.display()
    );
    Ok(())
}
