// Sequential batch driver with cooperative cancellation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use super::atlas::AtlasIndex;
use super::crop::{CropOptions, CropResult, crop_icon};
use super::names::{IconKey, canonical_requests};
use super::rect::CropPolicy;
use super::synth::ImageSynthesizer;

/// Shared flag polled between requests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Conditions that stop a batch before any request is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("source folder {} cannot be read: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source folder {} is not a directory", .0.display())]
    SourceNotDirectory(PathBuf),
    #[error("no icon names given")]
    NoRequests,
    #[error("failed to index atlases: {0:#}")]
    Index(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { total: usize, atlases: usize },
    ItemFinished {
        index: usize,
        total: usize,
        key: IconKey,
        result: CropResult,
    },
    Log(LogLevel, String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.not_found + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub state: BatchState,
    pub requested: usize,
    pub results: Vec<(IconKey, CropResult)>,
}

impl BatchReport {
    pub fn is_cancelled(&self) -> bool {
        self.state == BatchState::Cancelled
    }

    pub fn summary(&self) -> Summary {
        self.results
            .iter()
            .fold(Summary::default(), |mut acc, (_, result)| {
                match result {
                    CropResult::Success(_) => acc.succeeded += 1,
                    CropResult::Skipped => acc.skipped += 1,
                    CropResult::NotFound => acc.not_found += 1,
                    CropResult::Failed(_) => acc.failed += 1,
                }
                acc
            })
    }

    pub fn result_for(&self, key: &IconKey) -> Option<&CropResult> {
        self.results.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }
}

/// One crop run over a source folder and a list of raw icon names.
pub struct CropBatch<'a> {
    source_dir: PathBuf,
    options: CropOptions,
    raw_names: Vec<String>,
    synthesizer: Option<&'a dyn ImageSynthesizer>,
    state: BatchState,
}

impl<'a> CropBatch<'a> {
    pub fn new<I, S>(
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        raw_names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_dir: source_dir.into(),
            options: CropOptions::new(output_dir),
            raw_names: raw_names.into_iter().map(Into::into).collect(),
            synthesizer: None,
            state: BatchState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: CropPolicy) -> Self {
        self.options = self.options.with_policy(policy);
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.options = self.options.with_skip_existing(skip);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: &'a dyn ImageSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn options(&self) -> &CropOptions {
        &self.options
    }

    /// Processes every distinct request in input order.
    ///
    /// Per-request failures become [`CropResult::Failed`]; only the
    /// preconditions in [`BatchError`] abort the run, and they do so before
    /// any result is produced.
    pub fn run<F>(
        &mut self,
        cancel: &CancelToken,
        mut on_event: F,
    ) -> Result<BatchReport, BatchError>
    where
        F: FnMut(BatchEvent),
    {
        let keys = canonical_requests(&self.raw_names);
        if keys.is_empty() {
            return Err(BatchError::NoRequests);
        }
        check_source_dir(&self.source_dir)?;

        let mut index = AtlasIndex::scan(&self.source_dir).map_err(BatchError::Index)?;
        if let Some(synth) = self.synthesizer {
            index = index.with_synthesizer(synth);
        }

        self.state = BatchState::Running;
        let total = keys.len();
        on_event(BatchEvent::Started {
            total,
            atlases: index.len(),
        });
        if index.is_empty() {
            on_event(BatchEvent::Log(
                LogLevel::Warn,
                format!("No XML files found in {}", self.source_dir.display()),
            ));
        }

        let mut results = Vec::with_capacity(total);
        for (idx, key) in keys.into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.state = BatchState::Cancelled;
                on_event(BatchEvent::Log(
                    LogLevel::Warn,
                    format!("Cropping cancelled after {}/{} icons", idx, total),
                ));
                break;
            }

            let result = crop_icon(&mut index, &key, &self.options);
            if let CropResult::Failed(reason) = &result {
                tracing::warn!("{}: {}", key, reason);
            }
            for warning in index.take_warnings() {
                on_event(BatchEvent::Log(LogLevel::Warn, warning));
            }

            on_event(BatchEvent::ItemFinished {
                index: idx,
                total,
                key: key.clone(),
                result: result.clone(),
            });
            results.push((key, result));
        }

        if self.state == BatchState::Running {
            self.state = BatchState::Completed;
        }

        let report = BatchReport {
            state: self.state,
            requested: total,
            results,
        };

        let skipped = report.summary().skipped;
        if skipped > 0 {
            on_event(BatchEvent::Log(
                LogLevel::Info,
                format!("Skipped {} file(s) because already exists.", skipped),
            ));
        }

        Ok(report)
    }
}

fn check_source_dir(path: &Path) -> Result<(), BatchError> {
    let meta = fs::metadata(path).map_err(|source| BatchError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(BatchError::SourceNotDirectory(path.to_path_buf()));
    }
    fs::read_dir(path).map_err(|source| BatchError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
