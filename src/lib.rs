//! regharvest - resumable harvester for public document-comment registries.
//!
//! Lists every comment on a JavaScript-rendered registry, fetches each
//! comment's detail page, and appends merged records to an output file that
//! doubles as the checkpoint for the next run.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod lister;
pub mod merge;
pub mod models;
pub mod pacing;
pub mod renderer;

pub use checkpoint::{load_persisted, plan_resume, resume_cursor, CheckpointStore};
pub use config::HarvestConfig;
pub use crawl::{stop_channel, CrawlReport, Crawler};
pub use error::{CheckpointError, HarvestError, MergeError, RenderError};
pub use merge::merge;
pub use models::{CommentDetail, CommentSummary, MergedRecord};
