//! Page rendering seam.
//!
//! The registry is a JavaScript application, so every page goes through a
//! renderer that returns settled markup. A renderer is a single stateful tab:
//! it is owned by exactly one component at a time and never shared between
//! workers.

mod config;

#[cfg(feature = "browser")]
mod browser;

pub use config::RendererConfig;

#[cfg(feature = "browser")]
pub use browser::{BrowserRenderer, BrowserRendererFactory};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HarvestError, RenderError};

/// Snapshot of an element found by [`PageRenderer::wait_for_element`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub text: String,
    pub outer_html: String,
}

/// A single rendering session (one logical browser tab).
#[async_trait]
pub trait PageRenderer: Send {
    /// Navigate to `url` and return the markup once the page has settled.
    async fn render(&mut self, url: &str) -> Result<String, RenderError>;

    /// Wait until an element matching `selector` is present.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementSnapshot, RenderError>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), RenderError>;

    /// Markup of the current page as it is now.
    async fn current_markup(&mut self) -> Result<String, RenderError>;

    /// Release the session.
    async fn close(&mut self) {}
}

/// Creates independent renderer sessions, one per worker.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn create(&self, worker: usize) -> Result<Box<dyn PageRenderer>, HarvestError>;
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserRendererFactory {
    config: RendererConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserRendererFactory {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RendererFactory for BrowserRendererFactory {
    async fn create(&self, _worker: usize) -> Result<Box<dyn PageRenderer>, HarvestError> {
        let _ = &self.config;
        Err(HarvestError::RendererSetup(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }
}
