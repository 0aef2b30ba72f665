//! Command line interface.

mod crawl;
mod detail;
mod dump;
mod list;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::{HarvestConfig, ResumeStrategy};
use crate::renderer::{BrowserRendererFactory, RendererConfig, RendererFactory};

#[derive(Parser)]
#[command(name = "regharvest")]
#[command(about = "Resumable harvester for public document-comment registries")]
#[command(version)]
pub struct Cli {
    /// Config file path (otherwise discovered in the standard config locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    browser: BrowserArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Renderer options shared by every command.
#[derive(Args, Debug, Default)]
struct BrowserArgs {
    /// Remote Chrome DevTools URL (e.g. http://localhost:9222)
    #[arg(long, global = true)]
    browser_url: Option<String>,

    /// Proxy server for the browser (e.g. socks5://127.0.0.1:9050)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Chrome/Chromium executable
    #[arg(long, global = true)]
    chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,
}

impl BrowserArgs {
    fn apply(&self, renderer: &mut RendererConfig) {
        if let Some(url) = &self.browser_url {
            renderer.remote_url = Some(url.clone());
        }
        if let Some(proxy) = &self.proxy {
            renderer.proxy = Some(proxy.clone());
        }
        if let Some(path) = &self.chrome_path {
            renderer.chrome_path = Some(path.clone());
        }
        if self.headed {
            renderer.headless = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List every comment, fetch each detail page and append merged records
    Crawl {
        /// Comment list page to start from
        start_url: Option<String>,
        /// Output file (also the checkpoint read on resume)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Render attempts per detail page
        #[arg(short = 'r', long)]
        max_retries: Option<u32>,
        /// Number of concurrent detail workers
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// How to pick up after an earlier run
        #[arg(long, value_enum)]
        resume: Option<ResumeStrategy>,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List comment summaries only
    List {
        /// Comment list page to start from
        start_url: Option<String>,
        /// Output file
        #[arg(short, long, default_value = "comments.json")]
        output: PathBuf,
    },

    /// Fetch a single comment's detail page and print it as JSON
    Detail {
        /// Absolute detail page URL
        url: String,
        /// Render attempts
        #[arg(short = 'r', long)]
        max_retries: Option<u32>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a page and save its settled markup (for selector debugging)
    Dump {
        /// Page URL
        url: String,
        /// Output file
        #[arg(short, long, default_value = "result.html")]
        output: PathBuf,
        /// Wait for this selector before saving
        #[arg(long)]
        wait_for: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = HarvestConfig::load(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;
    cli.browser.apply(&mut config.renderer);

    match cli.command {
        Commands::Crawl {
            start_url,
            output,
            max_retries,
            concurrency,
            resume,
            no_progress,
        } => {
            if start_url.is_some() {
                config.start_url = start_url;
            }
            if let Some(output) = output {
                config.output = output;
            }
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            if let Some(strategy) = resume {
                config.resume = strategy;
            }
            crawl::cmd_crawl(config, !no_progress).await
        }
        Commands::List { start_url, output } => {
            if start_url.is_some() {
                config.start_url = start_url;
            }
            list::cmd_list(&config, &output).await
        }
        Commands::Detail {
            url,
            max_retries,
            output,
        } => {
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            detail::cmd_detail(&config, &url, output.as_deref()).await
        }
        Commands::Dump {
            url,
            output,
            wait_for,
        } => dump::cmd_dump(&config, &url, &output, wait_for.as_deref()).await,
    }
}

/// Renderer factory for the configured browser.
fn renderer_factory(config: &HarvestConfig) -> Arc<dyn RendererFactory> {
    Arc::new(BrowserRendererFactory::new(config.renderer.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_crawl() {
        let cli = Cli::try_parse_from([
            "regharvest",
            "crawl",
            "https://www.regulations.gov/document/PHMSA-2011-0023-0118/comment",
            "-o",
            "out.json",
            "-j",
            "3",
            "--resume",
            "set-difference",
            "--browser-url",
            "http://localhost:9222",
        ])
        .unwrap();

        assert_eq!(
            cli.browser.browser_url.as_deref(),
            Some("http://localhost:9222")
        );
        match cli.command {
            Commands::Crawl {
                start_url,
                output,
                concurrency,
                resume,
                max_retries,
                ..
            } => {
                assert!(start_url.is_some());
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(concurrency, Some(3));
                assert_eq!(resume, Some(ResumeStrategy::SetDifference));
                assert_eq!(max_retries, None);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_browser_args_override_renderer_config() {
        let args = BrowserArgs {
            proxy: Some("socks5://127.0.0.1:9050".to_string()),
            headed: true,
            ..Default::default()
        };
        let mut renderer = RendererConfig::default();
        args.apply(&mut renderer);
        assert_eq!(renderer.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
        assert!(!renderer.headless);
        assert_eq!(renderer.remote_url, None);
    }
}
