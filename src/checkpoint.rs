//! Checkpoint store and resume planning.
//!
//! The output file doubles as the checkpoint: it is a JSON array of
//! [`MergedRecord`]s, and the ids in it are the persisted set. Every append
//! writes the whole array to a temporary file and renames it into place, so a
//! reader never observes a partial record.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::ResumeStrategy;
use crate::error::CheckpointError;
use crate::models::{CommentSummary, MergedRecord};

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError {
    let path = path.to_path_buf();
    move |source| CheckpointError::Io { path, source }
}

/// Records persisted at `path`. A missing or empty file is an empty collection.
fn read_records(path: &Path) -> Result<Vec<MergedRecord>, CheckpointError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No checkpoint at {}; starting fresh", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&data).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Ids already completed in a previous run.
pub fn load_persisted(path: &Path) -> Result<HashSet<String>, CheckpointError> {
    Ok(read_records(path)?.into_iter().map(|r| r.id).collect())
}

/// Result of [`CheckpointStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The id was already persisted; nothing was written.
    Duplicate,
}

/// Append-only record collection backed by the output file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    records: Vec<MergedRecord>,
    ids: HashSet<String>,
}

impl CheckpointStore {
    /// Open the store, loading whatever an earlier run persisted.
    ///
    /// A corrupt file is an error: it is never silently replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let mut records = read_records(&path)?;

        let mut ids = HashSet::with_capacity(records.len());
        let before = records.len();
        records.retain(|r| ids.insert(r.id.clone()));
        if records.len() != before {
            warn!(
                "Checkpoint {} held {} duplicate records; they will be dropped on the next write",
                path.display(),
                before - records.len()
            );
        }

        info!(
            "Checkpoint {}: {} records persisted",
            path.display(),
            records.len()
        );
        Ok(Self { path, records, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persisted_ids(&self) -> &HashSet<String> {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Durably add one record.
    ///
    /// On failure the store is left exactly as it was, on disk and in memory.
    pub async fn append(&mut self, record: MergedRecord) -> Result<AppendOutcome, CheckpointError> {
        if self.ids.contains(&record.id) {
            debug!("Record {} already persisted", record.id);
            return Ok(AppendOutcome::Duplicate);
        }

        let id = record.id.clone();
        self.records.push(record);
        if let Err(e) = self.flush().await {
            self.records.pop();
            return Err(e);
        }
        self.ids.insert(id);
        Ok(AppendOutcome::Appended)
    }

    /// Write the full collection to a temporary file, then rename it over the output.
    async fn flush(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_err(parent))?;
        }

        let encoded = serde_json::to_vec_pretty(&self.records).map_err(CheckpointError::Encode)?;
        let tmp_path = tmp_path(&self.path);
        tokio::fs::write(&tmp_path, encoded)
            .await
            .map_err(io_err(&tmp_path))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_err(&self.path))?;
        Ok(())
    }
}

/// `<output>.tmp`, next to the output file.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Index of the first listed summary that is not yet persisted.
pub fn resume_cursor(summaries: &[CommentSummary], persisted: &HashSet<String>) -> usize {
    summaries
        .iter()
        .position(|s| !persisted.contains(&s.id))
        .unwrap_or(summaries.len())
}

/// Which listed summaries this run still has to fetch.
#[derive(Debug, Clone, Default)]
pub struct ResumePlan {
    pub cursor: usize,
    pub pending: Vec<CommentSummary>,
    /// Listed summaries skipped because they are already persisted.
    pub skipped: usize,
    /// Listed summaries dropped because their id was listed earlier.
    pub duplicates: usize,
}

/// Split the listing into work already done and work still pending.
///
/// The listing may repeat an id across pages; only its first occurrence is kept.
pub fn plan_resume(
    summaries: Vec<CommentSummary>,
    persisted: &HashSet<String>,
    strategy: ResumeStrategy,
) -> ResumePlan {
    let cursor = resume_cursor(&summaries, persisted);
    let mut plan = ResumePlan {
        cursor,
        skipped: cursor,
        ..Default::default()
    };

    let mut seen: HashSet<String> = summaries[..cursor].iter().map(|s| s.id.clone()).collect();
    for summary in summaries.into_iter().skip(cursor) {
        if !seen.insert(summary.id.clone()) {
            plan.duplicates += 1;
            continue;
        }
        if strategy == ResumeStrategy::SetDifference && persisted.contains(&summary.id) {
            plan.skipped += 1;
            continue;
        }
        plan.pending.push(summary);
    }

    debug!(
        "Resume plan: cursor {}, {} pending, {} skipped, {} duplicates",
        plan.cursor,
        plan.pending.len(),
        plan.skipped,
        plan.duplicates
    );
    plan
}
