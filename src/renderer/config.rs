//! Renderer configuration.
//!
//! Always compiled (not behind the `browser` feature) so config files parse
//! the same way in every build.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Browser renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Explicit Chrome/Chromium executable. Searched for when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Navigation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Settle time after the document reports ready, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            chrome_path: None,
            chrome_args: Vec::new(),
            remote_url: None,
            timeout: default_timeout(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl RendererConfig {
    /// Apply environment variable overrides.
    ///
    /// - `BROWSER_URL` - Remote Chrome DevTools URL
    /// - `SOCKS_PROXY` - Proxy for browser traffic (e.g., "socks5://127.0.0.1:9050")
    /// - `CHROME_PATH` - Chrome/Chromium executable
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("BROWSER_URL") {
            if !val.is_empty() {
                self.remote_url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("SOCKS_PROXY") {
            if !val.is_empty() {
                self.proxy = Some(val);
            }
        }
        if let Ok(val) = std::env::var("CHROME_PATH") {
            if !val.is_empty() {
                self.chrome_path = Some(PathBuf::from(val));
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: RendererConfig = toml::from_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert!(config.headless);
        assert_eq!(config.timeout, 30);
    }

    #[test]
    fn test_partial_toml() {
        let config: RendererConfig =
            toml::from_str("headless = false\nremote_url = \"ws://localhost:9222\"").unwrap();
        assert!(!config.headless);
        assert_eq!(config.remote_url.as_deref(), Some("ws://localhost:9222"));
        assert_eq!(config.settle_ms, 1000);
    }
}
