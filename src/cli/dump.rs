//! Markup dump command.

use std::path::Path;

use anyhow::Context;
use console::style;

use super::renderer_factory;
use crate::config::HarvestConfig;

/// Render `url` and write its settled markup to `output`.
pub async fn cmd_dump(
    config: &HarvestConfig,
    url: &str,
    output: &Path,
    wait_for: Option<&str>,
) -> anyhow::Result<()> {
    let mut renderer = renderer_factory(config).create(0).await?;

    let markup = async {
        renderer.render(url).await?;
        if let Some(selector) = wait_for {
            renderer
                .wait_for_element(selector, config.timing.list_wait())
                .await?;
        }
        renderer.current_markup().await
    }
    .await;
    renderer.close().await;

    let markup = markup.with_context(|| format!("failed to render {}", url))?;
    std::fs::write(output, &markup)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{} Saved {} bytes of markup to {}",
        style("✓").green(),
        markup.len(),
        output.display()
    );
    Ok(())
}
