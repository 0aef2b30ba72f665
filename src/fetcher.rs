//! Detail page fetching and extraction.

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{SelectorConfig, TimingConfig};
use crate::error::RenderError;
use crate::extract::{
    extract_by_label, extract_download_links, extract_text, find_containing, select_all,
    select_region,
};
use crate::models::{Address, Attachment, CommentDetail, Submitter};
use crate::renderer::PageRenderer;

/// Result of fetching one detail page.
#[derive(Debug, Clone)]
pub enum DetailOutcome {
    Fetched(CommentDetail),
    /// Every attempt failed. Only this item is affected.
    Failed {
        url: String,
        last_error: RenderError,
        attempts: u32,
    },
}

/// Item id from the last path segment of a detail URL.
///
/// Query strings, fragments and trailing slashes are ignored, so
/// `/comment/ABC-1/?tab=x` yields `ABC-1`. Percent escapes are decoded, so a
/// raw href and its parsed URL path give the same id.
pub fn id_from_detail_url(detail_url: &str) -> Option<String> {
    let path = detail_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('/');
    let segment = path
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))?;
    match urlencoding::decode(segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(e) => {
            debug!("Keeping undecodable id segment {:?}: {}", segment, e);
            Some(segment.to_string())
        }
    }
}

/// Resolve an href found on `page_url` to an absolute URL.
fn resolve_href(page_url: &Url, href: &str) -> String {
    page_url
        .join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Fetches and parses detail pages with bounded retry.
#[derive(Debug, Clone)]
pub struct DetailFetcher {
    base_url: Url,
    selectors: SelectorConfig,
    timing: TimingConfig,
}

impl DetailFetcher {
    pub fn new(base_url: Url, selectors: SelectorConfig, timing: TimingConfig) -> Self {
        Self {
            base_url,
            selectors,
            timing,
        }
    }

    /// Absolute URL of a (usually relative) detail path.
    pub fn absolute_url(&self, detail_url: &str) -> Url {
        match self.base_url.join(detail_url.trim()) {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not join {} onto base: {}", detail_url, e);
                self.base_url.clone()
            }
        }
    }

    /// Fetch one detail page, making at most `max_retries` render attempts.
    ///
    /// Render faults are retried after a randomized backoff. Missing markup
    /// is never a fault: it just leaves fields absent.
    pub async fn fetch_detail(
        &self,
        renderer: &mut dyn PageRenderer,
        detail_url: &str,
        max_retries: u32,
    ) -> DetailOutcome {
        let attempts = max_retries.max(1);
        let page_url = self.absolute_url(detail_url);

        let Some(id) = id_from_detail_url(page_url.path()) else {
            return DetailOutcome::Failed {
                url: page_url.to_string(),
                last_error: RenderError::Navigation {
                    url: page_url.to_string(),
                    reason: "detail URL has no id segment".to_string(),
                },
                attempts: 0,
            };
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.render_detail(renderer, page_url.as_str()).await {
                Ok(markup) => {
                    info!("Fetched detail page for {}", id);
                    return DetailOutcome::Fetched(parse_detail(
                        &id,
                        &markup,
                        &page_url,
                        &self.selectors,
                    ));
                }
                Err(e) => {
                    warn!(
                        "Error scraping {} (attempt {}/{}): {}",
                        page_url, attempt, attempts, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        self.timing.retry_backoff.sleep().await;
                    }
                }
            }
        }

        warn!("Failed to scrape {} after {} attempts", page_url, attempts);
        DetailOutcome::Failed {
            url: page_url.to_string(),
            last_error: last_error
                .unwrap_or_else(|| RenderError::Protocol("no attempt made".to_string())),
            attempts,
        }
    }

    /// One render attempt: navigate, wait for the main content, settle, read.
    async fn render_detail(
        &self,
        renderer: &mut dyn PageRenderer,
        url: &str,
    ) -> Result<String, RenderError> {
        renderer.render(url).await?;
        renderer
            .wait_for_element(&self.selectors.main_content, self.timing.detail_wait())
            .await?;
        let settle = self.timing.detail_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        renderer.current_markup().await
    }
}

/// Extract a [`CommentDetail`] from a rendered detail page.
pub fn parse_detail(id: &str, markup: &str, page_url: &Url, selectors: &SelectorConfig) -> CommentDetail {
    let doc = Html::parse_document(markup);
    let root = doc.root_element();
    let labels = &selectors.labels;
    let layout = &selectors.label_layout;

    let tracking_number = find_containing(root, &selectors.tracking_block, &labels.tracking_number)
        .and_then(|block| extract_text(block, &selectors.tracking_value));

    let details = select_region(&doc, &selectors.details_region);
    let detail_field = |label: &str| details.and_then(|region| extract_by_label(region, label, layout));

    let submitter_region = select_region(&doc, &selectors.submitter_region);
    let submitter_field =
        |label: &str| submitter_region.and_then(|region| extract_by_label(region, label, layout));

    let submitter = Submitter {
        name: submitter_field(&labels.submitter_name),
        organization: submitter_field(&labels.organization),
        representative: submitter_field(&labels.representative),
        address: Address {
            line1: submitter_field(&labels.address_line1),
            line2: submitter_field(&labels.address_line2),
            city: submitter_field(&labels.city),
            state: submitter_field(&labels.state),
            zip: submitter_field(&labels.zip),
            country: submitter_field(&labels.country),
        },
    };

    let attachments = select_all(root, &selectors.attachment_block)
        .into_iter()
        .filter_map(|block| {
            let title = extract_text(block, &selectors.attachment_title)?;
            let download_url = extract_download_links(block)
                .first()
                .map(|href| resolve_href(page_url, href));
            Some(Attachment { title, download_url })
        })
        .collect();

    CommentDetail {
        id: id.to_string(),
        tracking_number,
        document_subtype: detail_field(&labels.document_subtype),
        received_date: detail_field(&labels.received_date),
        submitter,
        content: extract_text(root, &selectors.content),
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::renderer::ElementSnapshot;

    const DETAIL_HTML: &str = r#"
        <html><body><main id="mainContent">
          <div class="card-block">
            <h4>Tracking Number</h4><p class="mb-0">kxy-2abc-1234</p>
          </div>
          <div id="tab-document-details">
            <ul>
              <li><h4>Document Subtype</h4><p class="mb-0">Public Comment</p></li>
              <li><h4>Received Date</h4><p class="mb-0">May 3, 2011</p></li>
            </ul>
          </div>
          <div id="tab-submitter-info">
            <ul>
              <li><h4>Submitter Name</h4><p class="mb-0">Jane Doe</p></li>
              <li><h4>Mailing Address</h4><p class="mb-0">12 Main St</p></li>
              <li><h4>City</h4><p class="mb-0">Denver</p></li>
              <li><h4>State or Province</h4><p class="mb-0">CO</p></li>
              <li><h4>ZIP/Postal Code</h4><p class="mb-0">80202</p></li>
              <li><h4>Country</h4><p class="mb-0">United States</p></li>
            </ul>
          </div>
          <div class="px-2">Please extend the comment period.</div>
          <div class="card-block">
            <h3 class="h5">Attachment 1</h3>
            <a class="btn download" href="/files/PHMSA-2011-0023-0407/attachment_1.pdf">PDF</a>
          </div>
          <div class="card-block">
            <h3 class="h5">Attachment 2</h3>
          </div>
        </main></body></html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://www.regulations.gov/comment/PHMSA-2011-0023-0407").unwrap()
    }

    #[test]
    fn test_id_from_detail_url() {
        assert_eq!(
            id_from_detail_url("/comment/PHMSA-2011-0023-0407"),
            Some("PHMSA-2011-0023-0407".to_string())
        );
        assert_eq!(
            id_from_detail_url("https://www.regulations.gov/comment/ABC-1/?tab=x#top"),
            Some("ABC-1".to_string())
        );
        assert_eq!(id_from_detail_url(""), None);
        assert_eq!(id_from_detail_url("/"), None);
    }

    #[test]
    fn test_id_same_for_raw_href_and_parsed_path() {
        let href = "/comment/café-1";
        let parsed = Url::parse("https://www.regulations.gov/").unwrap().join(href).unwrap();
        assert_eq!(parsed.path(), "/comment/caf%C3%A9-1");

        assert_eq!(id_from_detail_url(href), Some("café-1".to_string()));
        assert_eq!(id_from_detail_url(parsed.path()), id_from_detail_url(href));
    }

    #[test]
    fn test_parse_detail_full_page() {
        let detail = parse_detail(
            "PHMSA-2011-0023-0407",
            DETAIL_HTML,
            &page_url(),
            &SelectorConfig::default(),
        );

        assert_eq!(detail.id, "PHMSA-2011-0023-0407");
        assert_eq!(detail.tracking_number.as_deref(), Some("kxy-2abc-1234"));
        assert_eq!(detail.document_subtype.as_deref(), Some("Public Comment"));
        assert_eq!(detail.received_date.as_deref(), Some("May 3, 2011"));
        assert_eq!(detail.submitter.name.as_deref(), Some("Jane Doe"));
        assert_eq!(detail.submitter.organization, None);
        assert_eq!(detail.submitter.address.line1.as_deref(), Some("12 Main St"));
        assert_eq!(detail.submitter.address.line2, None);
        assert_eq!(detail.submitter.address.zip.as_deref(), Some("80202"));
        assert_eq!(
            detail.content.as_deref(),
            Some("Please extend the comment period.")
        );
        assert_eq!(detail.attachments.len(), 2);
        assert_eq!(
            detail.attachments[0].download_url.as_deref(),
            Some("https://www.regulations.gov/files/PHMSA-2011-0023-0407/attachment_1.pdf")
        );
        assert_eq!(detail.attachments[1].title, "Attachment 2");
        assert_eq!(detail.attachments[1].download_url, None);
    }

    #[test]
    fn test_parse_detail_without_submitter_region() {
        let detail = parse_detail(
            "X-1",
            r#"<main id="mainContent"><div class="px-2">Short.</div></main>"#,
            &page_url(),
            &SelectorConfig::default(),
        );
        assert_eq!(detail.id, "X-1");
        assert!(detail.submitter.address.is_empty());
        assert_eq!(detail.submitter.name, None);
        assert_eq!(detail.tracking_number, None);
        assert!(detail.attachments.is_empty());
        assert_eq!(detail.content.as_deref(), Some("Short."));
    }

    /// Times out on the first `failures` renders, then serves `markup`.
    struct FlakyRenderer {
        failures: usize,
        renders: usize,
        markup: String,
    }

    #[async_trait]
    impl PageRenderer for FlakyRenderer {
        async fn render(&mut self, url: &str) -> Result<String, RenderError> {
            self.renders += 1;
            if self.renders <= self.failures {
                return Err(RenderError::timeout(url, Duration::from_secs(1)));
            }
            Ok(self.markup.clone())
        }

        async fn wait_for_element(
            &mut self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<ElementSnapshot, RenderError> {
            Ok(ElementSnapshot::default())
        }

        async fn click(&mut self, selector: &str) -> Result<(), RenderError> {
            Err(RenderError::ElementNotFound(selector.to_string()))
        }

        async fn current_markup(&mut self) -> Result<String, RenderError> {
            Ok(self.markup.clone())
        }
    }

    fn fetcher() -> DetailFetcher {
        DetailFetcher::new(
            Url::parse("https://www.regulations.gov/").unwrap(),
            SelectorConfig::default(),
            TimingConfig::immediate(),
        )
    }

    #[tokio::test]
    async fn test_fetch_detail_exhausts_exactly_max_retries() {
        let mut renderer = FlakyRenderer {
            failures: usize::MAX,
            renders: 0,
            markup: String::new(),
        };

        let outcome = fetcher()
            .fetch_detail(&mut renderer, "/comment/B", 3)
            .await;

        assert_eq!(renderer.renders, 3);
        match outcome {
            DetailOutcome::Failed {
                url,
                last_error,
                attempts,
            } => {
                assert_eq!(url, "https://www.regulations.gov/comment/B");
                assert!(last_error.is_timeout());
                assert_eq!(attempts, 3);
            }
            DetailOutcome::Fetched(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_fetch_detail_recovers_after_transient_fault() {
        let mut renderer = FlakyRenderer {
            failures: 2,
            renders: 0,
            markup: DETAIL_HTML.to_string(),
        };

        let outcome = fetcher()
            .fetch_detail(&mut renderer, "/comment/PHMSA-2011-0023-0407", 3)
            .await;

        assert_eq!(renderer.renders, 3);
        match outcome {
            DetailOutcome::Fetched(detail) => {
                assert_eq!(detail.id, "PHMSA-2011-0023-0407");
                assert_eq!(detail.submitter.address.city.as_deref(), Some("Denver"));
            }
            DetailOutcome::Failed { last_error, .. } => panic!("unexpected failure: {last_error}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_detail_id_ignores_markup() {
        let mut renderer = FlakyRenderer {
            failures: 0,
            renders: 0,
            markup: "<html><body></body></html>".to_string(),
        };

        let outcome = fetcher().fetch_detail(&mut renderer, "/comment/EMPTY-7", 1).await;
        match outcome {
            DetailOutcome::Fetched(detail) => assert_eq!(detail, CommentDetail::empty("EMPTY-7")),
            DetailOutcome::Failed { .. } => panic!("expected success"),
        }
    }
}
