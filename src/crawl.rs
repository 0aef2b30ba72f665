//! Crawl orchestration.
//!
//! A run moves through INIT, LISTING, RESUMING, FETCHING and DONE. Only a
//! fault at INIT (bad configuration, corrupt checkpoint, renderer that will
//! not start) ends a run with an error. Every per-item fault is logged,
//! counted and left for the next run to retry.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::checkpoint::{plan_resume, AppendOutcome, CheckpointStore};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::fetcher::{DetailFetcher, DetailOutcome};
use crate::lister::{list_summaries, ListingEnd};
use crate::merge::merge;
use crate::models::CommentSummary;
use crate::pacing::Pacer;
use crate::renderer::{PageRenderer, RendererFactory};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Init,
    Listing,
    Resuming,
    /// Fetching the item at this position of the pending queue.
    Fetching(usize),
    Done,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Listing => write!(f, "LISTING"),
            Self::Resuming => write!(f, "RESUMING"),
            Self::Fetching(i) => write!(f, "FETCHING({})", i),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Triggers a cooperative stop.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by workers between items and during waits.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop was requested. Never resolves if the handle is
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.0.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Linked stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(Arc::new(tx)), StopSignal(rx))
}

/// How a single item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Persisted,
    /// Fetched again, but the checkpoint already held it.
    AlreadyPersisted,
    Failed(String),
    /// Summary and detail disagreed on the id.
    Inconsistent(String),
}

/// Progress events for a UI.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Listed {
        listed: usize,
        advertised_total: usize,
    },
    FetchStarted {
        pending: usize,
        skipped: usize,
        workers: usize,
    },
    ItemFinished {
        id: String,
        result: ItemResult,
    },
}

/// An item that produced no output this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub url: String,
    pub reason: String,
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub advertised_total: usize,
    pub listed: usize,
    pub listing_end: Option<ListingEnd>,
    pub resume_cursor: usize,
    /// Listed items skipped as already persisted.
    pub skipped: usize,
    /// Listed items dropped because their id was listed twice.
    pub duplicates: usize,
    pub attempted: usize,
    pub persisted: usize,
    pub already_persisted: usize,
    pub failed: usize,
    pub inconsistent: usize,
    pub cancelled: bool,
    pub failures: Vec<ItemFailure>,
}

impl CrawlReport {
    fn absorb(&mut self, stats: WorkerStats) {
        self.attempted += stats.attempted;
        self.persisted += stats.persisted;
        self.already_persisted += stats.already_persisted;
        self.failed += stats.failed;
        self.inconsistent += stats.inconsistent;
        self.cancelled |= stats.cancelled;
        self.failures.extend(stats.failures);
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    attempted: usize,
    persisted: usize,
    already_persisted: usize,
    failed: usize,
    inconsistent: usize,
    cancelled: bool,
    failures: Vec<ItemFailure>,
}

/// Shared state of the FETCHING phase.
struct FetchShared {
    queue: Mutex<VecDeque<(usize, CommentSummary)>>,
    store: Mutex<CheckpointStore>,
    fetcher: DetailFetcher,
}

/// Runs one end-to-end crawl.
pub struct Crawler {
    config: HarvestConfig,
    factory: Arc<dyn RendererFactory>,
    events: Option<mpsc::Sender<CrawlEvent>>,
    stop: StopSignal,
    _stop_handle: StopHandle,
}

impl Crawler {
    pub fn new(config: HarvestConfig, factory: Arc<dyn RendererFactory>) -> Self {
        let (handle, signal) = stop_channel();
        Self {
            config,
            factory,
            events: None,
            stop: signal,
            _stop_handle: handle,
        }
    }

    /// Report progress on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Stop cooperatively when `signal` fires.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    fn enter(&self, phase: CrawlPhase) {
        info!("Crawl phase: {}", phase);
    }

    /// Run the crawl to DONE.
    pub async fn run(&self) -> Result<CrawlReport, HarvestError> {
        let config = &self.config;
        let mut report = CrawlReport::default();

        self.enter(CrawlPhase::Init);
        config.validate()?;
        let start_url = config
            .start_url
            .clone()
            .ok_or_else(|| HarvestError::Config("no start URL given".to_string()))?;
        let base_url = config.resolved_base_url()?;
        let store = CheckpointStore::open(&config.output)?;

        let mut primary = match self.factory.create(0).await {
            Ok(renderer) => renderer,
            Err(e) => {
                error!("Renderer setup failed: {}", e);
                return Err(e);
            }
        };

        self.enter(CrawlPhase::Listing);
        let mut stop = self.stop.clone();
        let listed = tokio::select! {
            biased;
            _ = stop.stopped() => None,
            outcome = list_summaries(primary.as_mut(), &start_url, &config.selectors, &config.timing) => Some(outcome),
        };
        let Some(outcome) = listed else {
            info!("Stop requested during listing");
            primary.close().await;
            report.cancelled = true;
            self.enter(CrawlPhase::Done);
            return Ok(report);
        };
        report.advertised_total = outcome.advertised_total;
        report.listed = outcome.summaries.len();
        report.listing_end = Some(outcome.end.clone());
        self.emit(CrawlEvent::Listed {
            listed: report.listed,
            advertised_total: report.advertised_total,
        })
        .await;

        self.enter(CrawlPhase::Resuming);
        let plan = plan_resume(outcome.summaries, store.persisted_ids(), config.resume);
        report.resume_cursor = plan.cursor;
        report.skipped = plan.skipped;
        report.duplicates = plan.duplicates;
        info!(
            "Resuming at index {}: {} pending, {} already persisted",
            plan.cursor,
            plan.pending.len(),
            plan.skipped
        );

        if plan.pending.is_empty() {
            primary.close().await;
            self.emit(CrawlEvent::FetchStarted {
                pending: 0,
                skipped: report.skipped,
                workers: 0,
            })
            .await;
            self.enter(CrawlPhase::Done);
            return Ok(report);
        }

        let wanted = config.concurrency.max(1).min(plan.pending.len());
        let mut renderers = vec![primary];
        for worker in 1..wanted {
            match self.factory.create(worker).await {
                Ok(renderer) => renderers.push(renderer),
                Err(e) => warn!(
                    "Worker {} could not start a renderer ({}); continuing with {}",
                    worker,
                    e,
                    renderers.len()
                ),
            }
        }

        self.emit(CrawlEvent::FetchStarted {
            pending: plan.pending.len(),
            skipped: report.skipped,
            workers: renderers.len(),
        })
        .await;

        let queue = plan.pending.into_iter().enumerate().collect();
        let shared = FetchShared {
            queue: Mutex::new(queue),
            store: Mutex::new(store),
            fetcher: DetailFetcher::new(
                base_url,
                config.selectors.clone(),
                config.timing.clone(),
            ),
        };

        let workers = renderers
            .into_iter()
            .enumerate()
            .map(|(worker, renderer)| self.worker(worker, renderer, &shared));
        for stats in futures::future::join_all(workers).await {
            report.absorb(stats);
        }

        self.enter(CrawlPhase::Done);
        info!(
            "Crawl done: {} persisted, {} failed, {} inconsistent{}",
            report.persisted,
            report.failed,
            report.inconsistent,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    async fn worker(
        &self,
        worker: usize,
        mut renderer: Box<dyn PageRenderer>,
        shared: &FetchShared,
    ) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut pacer = Pacer::new(self.config.timing.pacing);
        let mut stop = self.stop.clone();

        loop {
            if stop.is_stopped() {
                stats.cancelled = true;
                break;
            }
            let Some((index, summary)) = shared.queue.lock().await.pop_front() else {
                break;
            };

            let paced = tokio::select! {
                biased;
                _ = stop.stopped() => false,
                _ = pacer.acquire() => true,
            };
            if !paced {
                stats.cancelled = true;
                break;
            }

            debug!("Worker {}: {}", worker, CrawlPhase::Fetching(index));
            stats.attempted += 1;
            let fetched = tokio::select! {
                biased;
                _ = stop.stopped() => None,
                outcome = shared.fetcher.fetch_detail(renderer.as_mut(), &summary.detail_url, self.config.max_retries) => Some(outcome),
            };
            pacer.finish();
            let Some(outcome) = fetched else {
                info!("Abandoned in-flight fetch of {}", summary.id);
                stats.cancelled = true;
                break;
            };

            let result = self.settle(&summary, outcome, shared, &mut stats).await;
            self.emit(CrawlEvent::ItemFinished {
                id: summary.id,
                result,
            })
            .await;
        }

        renderer.close().await;
        stats
    }

    /// Merge and persist one fetched item, recording how it ended.
    async fn settle(
        &self,
        summary: &CommentSummary,
        outcome: DetailOutcome,
        shared: &FetchShared,
        stats: &mut WorkerStats,
    ) -> ItemResult {
        let detail = match outcome {
            DetailOutcome::Fetched(detail) => detail,
            DetailOutcome::Failed {
                url, last_error, ..
            } => {
                let reason = last_error.to_string();
                stats.failed += 1;
                stats.failures.push(ItemFailure {
                    id: summary.id.clone(),
                    url,
                    reason: reason.clone(),
                });
                return ItemResult::Failed(reason);
            }
        };

        let record = match merge(summary, &detail) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping {}: {}", summary.id, e);
                stats.inconsistent += 1;
                return ItemResult::Inconsistent(e.to_string());
            }
        };

        match shared.store.lock().await.append(record).await {
            Ok(AppendOutcome::Appended) => {
                info!("Persisted {}", summary.id);
                stats.persisted += 1;
                ItemResult::Persisted
            }
            Ok(AppendOutcome::Duplicate) => {
                stats.already_persisted += 1;
                ItemResult::AlreadyPersisted
            }
            Err(e) => {
                error!("Could not persist {}: {}", summary.id, e);
                let reason = e.to_string();
                stats.failed += 1;
                stats.failures.push(ItemFailure {
                    id: summary.id.clone(),
                    url: summary.detail_url.clone(),
                    reason: reason.clone(),
                });
                ItemResult::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(CrawlPhase::Init.to_string(), "INIT");
        assert_eq!(CrawlPhase::Fetching(4).to_string(), "FETCHING(4)");
        assert_eq!(CrawlPhase::Done.to_string(), "DONE");
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let (handle, mut signal) = stop_channel();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
        // Resolves immediately once stopped
        signal.stopped().await;
    }

    #[test]
    fn test_report_absorbs_worker_stats() {
        let mut report = CrawlReport::default();
        report.absorb(WorkerStats {
            attempted: 2,
            persisted: 1,
            failed: 1,
            failures: vec![ItemFailure {
                id: "B".to_string(),
                url: "/comment/B".to_string(),
                reason: "timed out".to_string(),
            }],
            ..Default::default()
        });
        report.absorb(WorkerStats {
            attempted: 1,
            cancelled: true,
            ..Default::default()
        });
        assert_eq!(report.attempted, 3);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.cancelled);
    }
}
