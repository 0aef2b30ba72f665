//! Chromium-backed renderer over the DevTools protocol.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ElementSnapshot, PageRenderer, RendererConfig, RendererFactory};
use crate::error::{HarvestError, RenderError};

/// Poll interval for element-presence waits.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// Find Chrome executable.
fn find_chrome(configured: Option<&PathBuf>) -> Result<PathBuf, HarvestError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(HarvestError::RendererSetup(format!(
            "configured Chrome path {} does not exist",
            path.display()
        )));
    }

    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    // Check if in PATH via `which`
    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(HarvestError::RendererSetup(
        "Chrome/Chromium not found. Please install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - Or point CHROME_PATH / BROWSER_URL at an existing browser"
            .to_string(),
    ))
}

/// One browser with one long-lived tab.
pub struct BrowserRenderer {
    config: RendererConfig,
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    remote: bool,
}

impl BrowserRenderer {
    /// Launch a local browser, or connect to `remote_url` when configured.
    pub async fn start(config: RendererConfig) -> Result<Self, HarvestError> {
        let remote = config.remote_url.is_some();
        let (browser, mut handler) = match config.remote_url.clone() {
            Some(url) => connect_remote(&url, config.timeout).await?,
            None => launch_local(&config).await?,
        };

        // Spawn handler task
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::RendererSetup(format!("failed to open tab: {}", e)))?;

        Ok(Self {
            config,
            browser,
            page,
            handler,
            remote,
        })
    }

    /// Navigate to a URL with timeout handling.
    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: format!("invalid URL: {}", e),
            })?;

        let nav_timeout = Duration::from_secs(self.config.timeout);
        tokio::time::timeout(nav_timeout, self.page.execute(nav_params))
            .await
            .map_err(|_| RenderError::timeout(format!("navigation to {}", url), nav_timeout))?
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Wait for the page to reach a ready state.
    async fn wait_for_ready(&self) {
        let ready_timeout = Duration::from_secs(self.config.timeout);
        match tokio::time::timeout(
            ready_timeout,
            self.page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
    }
}

async fn launch_local(
    config: &RendererConfig,
) -> Result<(Browser, chromiumoxide::Handler), HarvestError> {
    info!("Launching browser (headless={})", config.headless);

    let chrome_path = find_chrome(config.chrome_path.as_ref())?;
    let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

    // with_head means NOT headless
    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(ref proxy) = config.proxy {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }

    builder = builder
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox") // Often needed for headless in containers
        .arg("--disable-gpu");

    for arg in &config.chrome_args {
        builder = builder.arg(arg.as_str());
    }

    let browser_config = builder
        .build()
        .map_err(|e| HarvestError::RendererSetup(format!("bad browser config: {}", e)))?;

    Browser::launch(browser_config)
        .await
        .map_err(|e| HarvestError::RendererSetup(format!("failed to launch browser: {}", e)))
}

/// Connect to a remote Chrome instance via its `/json/version` endpoint.
async fn connect_remote(
    url: &str,
    timeout_secs: u64,
) -> Result<(Browser, chromiumoxide::Handler), HarvestError> {
    info!(
        "Connecting to remote browser at {} (timeout: {}s)",
        url, timeout_secs
    );

    let http_url = url
        .replace("ws://", "http://")
        .replace("wss://", "https://");
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let resp: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .map_err(|e| HarvestError::RendererSetup(format!("remote browser unreachable: {}", e)))?
        .json()
        .await
        .map_err(|e| HarvestError::RendererSetup(format!("bad browser version info: {}", e)))?;

    let ws_url = resp
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            HarvestError::RendererSetup("no webSocketDebuggerUrl in response".to_string())
        })?;

    debug!("Connecting to WebSocket: {}", ws_url);

    let handler_config = chromiumoxide::handler::HandlerConfig {
        request_timeout: Duration::from_secs(timeout_secs),
        ..Default::default()
    };

    Browser::connect_with_config(ws_url, handler_config)
        .await
        .map_err(|e| HarvestError::RendererSetup(format!("failed to connect: {}", e)))
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render(&mut self, url: &str) -> Result<String, RenderError> {
        self.navigate(url).await?;
        self.wait_for_ready().await;
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        self.current_markup().await
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementSnapshot, RenderError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(Ok(element)) =
                tokio::time::timeout(remaining, self.page.find_element(selector)).await
            {
                let text = element.inner_text().await.ok().flatten().unwrap_or_default();
                let outer_html = element.outer_html().await.ok().flatten().unwrap_or_default();
                return Ok(ElementSnapshot { text, outer_html });
            }

            if Instant::now() + ELEMENT_POLL_INTERVAL >= deadline {
                return Err(RenderError::timeout(selector, timeout));
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<(), RenderError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| RenderError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, RenderError> {
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Failed to close tab: {}", e);
        }
        // A remote browser is shared infrastructure; only our tab goes away.
        if !self.remote {
            if let Err(e) = self.browser.close().await {
                debug!("Failed to close browser: {}", e);
            }
        }
        self.handler.abort();
    }
}

/// Starts one [`BrowserRenderer`] per worker.
pub struct BrowserRendererFactory {
    config: RendererConfig,
}

impl BrowserRendererFactory {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RendererFactory for BrowserRendererFactory {
    async fn create(&self, worker: usize) -> Result<Box<dyn PageRenderer>, HarvestError> {
        debug!("Starting renderer for worker {}", worker);
        let renderer = BrowserRenderer::start(self.config.clone()).await?;
        Ok(Box::new(renderer))
    }
}
