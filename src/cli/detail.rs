//! Single detail page command.

use std::path::Path;

use anyhow::Context;
use console::style;
use url::Url;

use super::renderer_factory;
use crate::config::HarvestConfig;
use crate::fetcher::{DetailFetcher, DetailOutcome};

/// Fetch one detail page and print the extracted record. The checkpoint is not touched.
pub async fn cmd_detail(
    config: &HarvestConfig,
    url: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let page_url = Url::parse(url).with_context(|| format!("not an absolute URL: {}", url))?;
    let fetcher = DetailFetcher::new(
        page_url.clone(),
        config.selectors.clone(),
        config.timing.clone(),
    );

    let mut renderer = renderer_factory(config).create(0).await?;
    let outcome = fetcher
        .fetch_detail(renderer.as_mut(), page_url.as_str(), config.max_retries)
        .await;
    renderer.close().await;

    let detail = match outcome {
        DetailOutcome::Fetched(detail) => detail,
        DetailOutcome::Failed {
            url,
            last_error,
            attempts,
        } => {
            anyhow::bail!("failed to fetch {} after {} attempts: {}", url, attempts, last_error)
        }
    };

    let json = serde_json::to_string_pretty(&detail)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} Saved {} to {}",
                style("✓").green(),
                detail.id,
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
