//! Crawl command.

use std::path::Path;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;
use tracing::info;

use super::progress;
use super::renderer_factory;
use crate::config::HarvestConfig;
use crate::crawl::{stop_channel, CrawlEvent, CrawlReport, Crawler};

/// Run a full crawl, resuming from the output file if it exists.
pub async fn cmd_crawl(config: HarvestConfig, show_progress: bool) -> anyhow::Result<()> {
    let output = config.output.clone();
    let factory = renderer_factory(&config);

    let (stop_handle, stop_signal) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current item");
            eprintln!(
                "{} Stopping; progress so far is saved",
                style("!").yellow()
            );
            stop_handle.stop();
        }
    });

    let (event_tx, event_rx) = mpsc::channel::<CrawlEvent>(100);
    let ui = tokio::spawn(progress::track(event_rx, show_progress));

    let crawler = Crawler::new(config, factory)
        .with_events(event_tx)
        .with_stop_signal(stop_signal);
    let result = crawler.run().await;
    // Closes the event channel so the UI task finishes
    drop(crawler);
    let _ = ui.await;

    let report = result.context("crawl could not start")?;
    print_report(&report, &output);
    Ok(())
}

fn print_report(report: &CrawlReport, output: &Path) {
    let headline = if report.cancelled {
        format!("{} Crawl stopped early", style("!").yellow())
    } else {
        format!("{} Crawl complete", style("✓").green())
    };
    println!("{}", headline);

    println!(
        "  Listed:     {} of {} advertised",
        report.listed, report.advertised_total
    );
    if let Some(end) = &report.listing_end {
        println!("  Listing:    {}", end);
    }
    println!(
        "  Skipped:    {} already persisted (resumed at #{})",
        report.skipped, report.resume_cursor
    );
    println!("  Attempted:  {}", report.attempted);
    println!("  Persisted:  {}", style(report.persisted).green());
    if report.already_persisted > 0 {
        println!("  Refetched:  {} already in output", report.already_persisted);
    }
    if report.duplicates > 0 {
        println!("  Duplicates: {} listed twice", report.duplicates);
    }
    if report.inconsistent > 0 {
        println!(
            "  {}  {} summary/detail id mismatches",
            style("!").yellow(),
            report.inconsistent
        );
    }
    if report.failed > 0 {
        println!(
            "  {}  {} failed; run again to retry them",
            style("✗").red(),
            report.failed
        );
        for failure in &report.failures {
            println!("     {} {}: {}", failure.id, failure.url, failure.reason);
        }
    }
    println!("  Output:     {}", output.display());
}
