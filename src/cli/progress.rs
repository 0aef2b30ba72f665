//! Terminal progress for a crawl.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::crawl::{CrawlEvent, ItemResult};

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Render crawl events until the sender side is dropped.
pub async fn track(mut events: mpsc::Receiver<CrawlEvent>, show_bar: bool) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            CrawlEvent::Listed {
                listed,
                advertised_total,
            } => {
                println!(
                    "{} Listed {} of {} advertised comments",
                    style("→").cyan(),
                    listed,
                    advertised_total
                );
            }
            CrawlEvent::FetchStarted {
                pending,
                skipped,
                workers,
            } => {
                if skipped > 0 {
                    println!(
                        "{} {} already persisted, skipping",
                        style("→").cyan(),
                        skipped
                    );
                }
                if pending == 0 {
                    continue;
                }
                println!(
                    "{} Fetching {} detail pages with {} worker(s)",
                    style("→").cyan(),
                    pending,
                    workers
                );
                if show_bar {
                    let progress = ProgressBar::new(pending as u64);
                    progress.set_style(bar_style());
                    progress.set_message("Fetching details...");
                    bar = Some(progress);
                }
            }
            CrawlEvent::ItemFinished { id, result } => {
                let line = match &result {
                    ItemResult::Failed(reason) => Some(format!(
                        "  {} {} failed: {}",
                        style("✗").red(),
                        id,
                        reason
                    )),
                    ItemResult::Inconsistent(reason) => Some(format!(
                        "  {} {} skipped: {}",
                        style("!").yellow(),
                        id,
                        reason
                    )),
                    ItemResult::Persisted | ItemResult::AlreadyPersisted => None,
                };
                match (&bar, line) {
                    (Some(progress), line) => {
                        if let Some(line) = line {
                            progress.println(line);
                        }
                        progress.set_message(id);
                        progress.inc(1);
                    }
                    (None, Some(line)) => println!("{}", line),
                    (None, None) => {}
                }
            }
        }
    }

    if let Some(progress) = bar {
        progress.finish_and_clear();
    }
}
