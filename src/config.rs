//! Configuration for a harvest run.
//!
//! Layers, lowest priority first: built-in defaults, a TOML file, environment
//! variables, then CLI flags (applied by the CLI).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::HarvestError;
use crate::extract::LabelLayout;
use crate::pacing::DelayRange;
use crate::renderer::RendererConfig;

/// Name `prefer` discovers config files under when `--config` is not given.
pub const CONFIG_NAME: &str = "regharvest";

/// Default output (and checkpoint) file.
pub const DEFAULT_OUTPUT: &str = "output/full_comments_data.json";

/// How the resume point is chosen from the persisted ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeStrategy {
    /// Skip the persisted prefix of the listing and attempt everything after
    /// it. A persisted id past the cursor is fetched again but never stored twice.
    #[default]
    Prefix,
    /// Ignore list order; attempt every listed id not yet persisted.
    SetDifference,
}

/// Waits and delays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Bound on waiting for list cards, the results count and the next-page control.
    pub list_wait_secs: u64,
    /// Pause after activating the next-page control.
    pub page_settle_ms: u64,
    /// Bound on waiting for the detail page's main content.
    pub detail_wait_secs: u64,
    /// Extra pause after the main content appears, for late widgets.
    pub detail_settle_ms: u64,
    /// Sleep between failed detail attempts.
    pub retry_backoff: DelayRange,
    /// Gap between successive detail fetches of one worker.
    pub pacing: DelayRange,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            list_wait_secs: 20,
            page_settle_ms: 2000,
            detail_wait_secs: 20,
            detail_settle_ms: 2000,
            retry_backoff: DelayRange::new(1000, 3000),
            pacing: DelayRange::new(500, 1500),
        }
    }
}

impl TimingConfig {
    pub fn list_wait(&self) -> Duration {
        Duration::from_secs(self.list_wait_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn detail_wait(&self) -> Duration {
        Duration::from_secs(self.detail_wait_secs)
    }

    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    /// No waiting anywhere. For tests against in-memory renderers.
    pub fn immediate() -> Self {
        Self {
            list_wait_secs: 0,
            page_settle_ms: 0,
            detail_wait_secs: 0,
            detail_settle_ms: 0,
            retry_backoff: DelayRange::zero(),
            pacing: DelayRange::zero(),
        }
    }
}

/// Label texts of the registry's metadata fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLabels {
    pub agency: String,
    pub posted: String,
    pub id: String,
    pub tracking_number: String,
    pub document_subtype: String,
    pub received_date: String,
    pub submitter_name: String,
    pub organization: String,
    pub representative: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl Default for FieldLabels {
    fn default() -> Self {
        Self {
            agency: "Agency".to_string(),
            posted: "Posted".to_string(),
            id: "ID".to_string(),
            tracking_number: "Tracking Number".to_string(),
            document_subtype: "Document Subtype".to_string(),
            received_date: "Received Date".to_string(),
            submitter_name: "Submitter Name".to_string(),
            organization: "Organization Name".to_string(),
            representative: "Submitter's Representative".to_string(),
            address_line1: "Mailing Address".to_string(),
            address_line2: "Mailing Address 2".to_string(),
            city: "City".to_string(),
            state: "State or Province".to_string(),
            zip: "ZIP/Postal Code".to_string(),
            country: "Country".to_string(),
        }
    }
}

/// CSS selectors for the registry's markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Pagination status text ("1 - 25 of 312 results").
    pub total_count: String,
    /// Regex with one capture group for the advertised total.
    pub total_pattern: String,
    pub card: String,
    pub card_title: String,
    /// Card metadata items carrying "Agency", "Posted" and "ID".
    pub card_meta: String,
    pub next_page: String,
    pub main_content: String,
    pub tracking_block: String,
    pub tracking_value: String,
    pub details_region: String,
    pub submitter_region: String,
    pub content: String,
    pub attachment_block: String,
    pub attachment_title: String,
    pub label_layout: LabelLayout,
    pub labels: FieldLabels,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            total_count: ".pagination-container p".to_string(),
            total_pattern: r"of ([\d,]+) results".to_string(),
            card: ".card.card-type-comment".to_string(),
            card_title: "h3.card-title a".to_string(),
            card_meta: "li".to_string(),
            next_page: "button[aria-label='Go to next page']".to_string(),
            main_content: "#mainContent".to_string(),
            tracking_block: "div.card-block".to_string(),
            tracking_value: "p.mb-0".to_string(),
            details_region: "#tab-document-details".to_string(),
            submitter_region: "#tab-submitter-info".to_string(),
            content: "div.px-2".to_string(),
            attachment_block: "div.card-block".to_string(),
            attachment_title: "h3.h5".to_string(),
            label_layout: LabelLayout::default(),
            labels: FieldLabels::default(),
        }
    }
}

/// Complete configuration for one harvest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Comment list page to start from.
    #[serde(default)]
    pub start_url: Option<String>,

    /// Origin for relative detail paths. Derived from `start_url` when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Output file; doubles as the checkpoint.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Total render attempts per detail page.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Number of detail workers, each with its own renderer.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub resume: ResumeStrategy,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,

    #[serde(default)]
    pub renderer: RendererConfig,
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_max_retries() -> u32 {
    3
}

fn default_concurrency() -> usize {
    1
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            base_url: None,
            output: default_output(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            resume: ResumeStrategy::default(),
            timing: TimingConfig::default(),
            selectors: SelectorConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Load defaults, then the config file, then environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `prefer` discovers a
    /// `regharvest` config file in the standard locations.
    pub async fn load(path: Option<&Path>) -> Result<Self, HarvestError> {
        let discovered = match path {
            Some(_) => None,
            None => discover().await,
        };
        Self::load_with(path, discovered.as_deref())
    }

    /// Load from the explicit path if given, else from the discovered one.
    pub fn load_with(
        path: Option<&Path>,
        discovered: Option<&Path>,
    ) -> Result<Self, HarvestError> {
        let config = match path.or(discovered) {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Parse a config file. `.json` files are read as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, HarvestError> {
        debug!("Loading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| e.to_string()),
            _ => toml::from_str(&text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| HarvestError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Apply environment variable overrides.
    ///
    /// - `REGHARVEST_OUTPUT` - output/checkpoint file
    /// - `REGHARVEST_MAX_RETRIES` - attempts per detail page
    /// - `REGHARVEST_CONCURRENCY` - detail workers
    /// - renderer variables, see [`RendererConfig::with_env_overrides`]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("REGHARVEST_OUTPUT") {
            if !val.is_empty() {
                self.output = PathBuf::from(val);
            }
        }
        if let Some(n) = env_number("REGHARVEST_MAX_RETRIES") {
            self.max_retries = n;
        }
        if let Some(n) = env_number("REGHARVEST_CONCURRENCY") {
            self.concurrency = n;
        }
        self.renderer = self.renderer.with_env_overrides();
        self
    }

    /// Check the settings a run cannot proceed without.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.max_retries == 0 {
            return Err(HarvestError::Config("max_retries must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(HarvestError::Config("concurrency must be at least 1".into()));
        }
        if let Err(e) = regex::Regex::new(&self.selectors.total_pattern) {
            return Err(HarvestError::Config(format!("bad total_pattern: {}", e)));
        }
        self.resolved_base_url().map(|_| ())
    }

    /// Base URL for absolutizing detail paths.
    pub fn resolved_base_url(&self) -> Result<Url, HarvestError> {
        let raw = match (&self.base_url, &self.start_url) {
            (Some(base), _) => base.as_str(),
            (None, Some(start)) => start.as_str(),
            (None, None) => return Err(HarvestError::Config("no start URL given".into())),
        };
        let url = Url::parse(raw)
            .map_err(|e| HarvestError::Config(format!("invalid URL {}: {}", raw, e)))?;
        if self.base_url.is_some() {
            return Ok(url);
        }
        // Origin only; detail paths are absolute paths on the same host
        let origin = url.origin().ascii_serialization();
        Url::parse(&origin).map_err(|e| HarvestError::Config(format!("bad origin {}: {}", origin, e)))
    }
}

/// Find a config file through `prefer`, if any exists.
async fn discover() -> Option<PathBuf> {
    match prefer::load(CONFIG_NAME).await {
        Ok(found) => found.source_path().map(|p| p.to_path_buf()),
        Err(e) => {
            debug!("No {} config file discovered: {}", CONFIG_NAME, e);
            None
        }
    }
}

fn env_number<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let val = std::env::var(name).ok().filter(|v| !v.is_empty())?;
    match val.parse::<T>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, val, e);
            None
        }
    }
}
