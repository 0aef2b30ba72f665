//! Paginated listing of comment summaries.
//!
//! [`Listing`] is a pull-based sequence over the result pages. It is consumed
//! once per run and owns the renderer for as long as it is alive.

use std::collections::VecDeque;
use std::fmt;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::config::{SelectorConfig, TimingConfig};
use crate::extract::{extract_labeled_text, normalize_whitespace, select_all, select_first, text_of};
use crate::fetcher::id_from_detail_url;
use crate::models::CommentSummary;
use crate::renderer::PageRenderer;

/// Why the listing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEnd {
    /// Extracted as many summaries as the registry advertised.
    TotalReached,
    /// Ran out of pages (or cards) before the advertised total.
    Exhausted,
    /// A page failed to render in time. Summaries so far are kept.
    Interrupted(String),
    /// The advertised total could not be read, so nothing was listed.
    NoTotal,
}

impl fmt::Display for ListingEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalReached => write!(f, "advertised total reached"),
            Self::Exhausted => write!(f, "pagination exhausted"),
            Self::Interrupted(reason) => write!(f, "interrupted: {}", reason),
            Self::NoTotal => write!(f, "no advertised total"),
        }
    }
}

/// Everything a finished listing produced.
#[derive(Debug, Clone)]
pub struct ListingOutcome {
    pub summaries: Vec<CommentSummary>,
    pub advertised_total: usize,
    pub end: ListingEnd,
}

/// Lazy, finite sequence of summaries across result pages.
pub struct Listing<'a> {
    renderer: &'a mut dyn PageRenderer,
    selectors: &'a SelectorConfig,
    timing: &'a TimingConfig,
    advertised_total: usize,
    extracted: usize,
    pages_loaded: usize,
    buffered: VecDeque<CommentSummary>,
    end: Option<ListingEnd>,
}

impl<'a> Listing<'a> {
    /// Render the first result page and read the advertised total.
    ///
    /// Never fails: an unreadable start page yields an already-finished listing.
    pub async fn start(
        renderer: &'a mut dyn PageRenderer,
        start_url: &str,
        selectors: &'a SelectorConfig,
        timing: &'a TimingConfig,
    ) -> Listing<'a> {
        let mut listing = Listing {
            renderer,
            selectors,
            timing,
            advertised_total: 0,
            extracted: 0,
            pages_loaded: 0,
            buffered: VecDeque::new(),
            end: None,
        };

        info!("Loading result list: {}", start_url);
        if let Err(e) = listing.renderer.render(start_url).await {
            warn!("Could not render result list {}: {}", start_url, e);
            listing.end = Some(ListingEnd::Interrupted(e.to_string()));
            return listing;
        }

        match listing.read_total().await {
            Some(total) => {
                info!("Registry advertises {} results", total);
                listing.advertised_total = total;
            }
            None => {
                warn!("Could not read total result count; listing nothing");
                listing.end = Some(ListingEnd::NoTotal);
            }
        }
        listing
    }

    pub fn advertised_total(&self) -> usize {
        self.advertised_total
    }

    /// Why the listing ended, once it has.
    pub fn end(&self) -> Option<&ListingEnd> {
        self.end.as_ref()
    }

    /// Next summary, loading further pages as needed.
    pub async fn next(&mut self) -> Option<CommentSummary> {
        loop {
            if self.end.is_some() {
                return None;
            }
            if self.extracted >= self.advertised_total {
                self.buffered.clear();
                self.end = Some(ListingEnd::TotalReached);
                return None;
            }
            if let Some(summary) = self.buffered.pop_front() {
                self.extracted += 1;
                return Some(summary);
            }
            self.load_page().await;
        }
    }

    /// Drain the rest of the sequence.
    pub async fn collect(mut self) -> ListingOutcome {
        let mut summaries = Vec::new();
        while let Some(summary) = self.next().await {
            summaries.push(summary);
        }
        ListingOutcome {
            summaries,
            advertised_total: self.advertised_total,
            end: self.end.unwrap_or(ListingEnd::Exhausted),
        }
    }

    async fn read_total(&mut self) -> Option<usize> {
        let pattern = match Regex::new(&self.selectors.total_pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!("Invalid total pattern {:?}: {}", self.selectors.total_pattern, e);
                return None;
            }
        };

        let snapshot = match self
            .renderer
            .wait_for_element(&self.selectors.total_count, self.timing.list_wait())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Pagination status not found: {}", e);
                return None;
            }
        };

        parse_total(&pattern, &snapshot.text)
    }

    async fn load_page(&mut self) {
        if self.pages_loaded > 0 {
            if let Some(end) = self.advance().await {
                self.end = Some(end);
                return;
            }
        }
        self.pages_loaded += 1;
        let page = self.pages_loaded;

        if let Err(e) = self
            .renderer
            .wait_for_element(&self.selectors.card, self.timing.list_wait())
            .await
        {
            warn!(
                "Result cards did not render on page {}: {}; keeping {} summaries",
                page, e, self.extracted
            );
            self.end = Some(ListingEnd::Interrupted(e.to_string()));
            return;
        }

        let markup = match self.renderer.current_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Could not read page {}: {}", page, e);
                self.end = Some(ListingEnd::Interrupted(e.to_string()));
                return;
            }
        };

        let cards = parse_cards(&markup, self.selectors);
        info!("Page {}: {} cards", page, cards.len());
        if cards.is_empty() {
            self.end = Some(ListingEnd::Exhausted);
            return;
        }
        self.buffered.extend(cards);
    }

    /// Move to the next result page. Returns the end reason if there is none.
    async fn advance(&mut self) -> Option<ListingEnd> {
        let next = &self.selectors.next_page;
        if let Err(e) = self
            .renderer
            .wait_for_element(next, self.timing.list_wait())
            .await
        {
            info!("No next page control ({}); pagination exhausted", e);
            return Some(ListingEnd::Exhausted);
        }
        if let Err(e) = self.renderer.click(next).await {
            warn!("Could not activate next page: {}", e);
            return Some(ListingEnd::Interrupted(e.to_string()));
        }
        let settle = self.timing.page_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        None
    }
}

/// List every summary reachable from `start_url`.
pub async fn list_summaries(
    renderer: &mut dyn PageRenderer,
    start_url: &str,
    selectors: &SelectorConfig,
    timing: &TimingConfig,
) -> ListingOutcome {
    let outcome = Listing::start(renderer, start_url, selectors, timing)
        .await
        .collect()
        .await;
    info!(
        "Listed {} of {} advertised summaries ({})",
        outcome.summaries.len(),
        outcome.advertised_total,
        outcome.end
    );
    outcome
}

/// Advertised total from pagination text such as "1 - 25 of 1,234 results".
pub fn parse_total(pattern: &Regex, text: &str) -> Option<usize> {
    let caps = pattern.captures(text)?;
    let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != ',').collect();
    digits.parse().ok()
}

/// Every summary card on a rendered result page, in document order.
pub fn parse_cards(markup: &str, selectors: &SelectorConfig) -> Vec<CommentSummary> {
    let doc = Html::parse_document(markup);
    select_all(doc.root_element(), &selectors.card)
        .into_iter()
        .enumerate()
        .filter_map(|(index, card)| {
            let summary = parse_card(card, selectors);
            if summary.is_none() {
                warn!("Skipping result card {}: no detail link or id", index + 1);
            }
            summary
        })
        .collect()
}

fn parse_card(card: ElementRef<'_>, selectors: &SelectorConfig) -> Option<CommentSummary> {
    let labels = &selectors.labels;
    let link = select_first(card, &selectors.card_title)?;
    let detail_url = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())?
        .to_string();

    let meta = |label: &str| extract_labeled_text(card, &selectors.card_meta, label);
    let id = meta(&labels.id).or_else(|| id_from_detail_url(&detail_url))?;

    Some(CommentSummary {
        id,
        title: normalize_whitespace(&text_of(link)),
        detail_url,
        agency: meta(&labels.agency).unwrap_or_default(),
        posted_date: meta(&labels.posted).unwrap_or_default(),
    })
}
