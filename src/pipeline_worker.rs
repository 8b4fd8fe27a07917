// Pipeline worker for running crop batches in a separate thread

use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::event::AppMsg;
use crate::pipeline::{
    BatchEvent, CancelToken, CropBatch, CropPolicy, ImageSynthesizer, KtechSynthesizer, LogLevel,
};

#[derive(Debug, Clone)]
pub struct CropJob {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub names: Vec<String>,
    pub policy: CropPolicy,
    pub skip_existing: bool,
    pub ktech: Option<KtechSynthesizer>,
}

impl CropJob {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        names: Vec<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            names,
            policy: CropPolicy::default(),
            skip_existing: false,
            ktech: None,
        }
    }

    pub fn with_policy(mut self, policy: CropPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_ktech(mut self, ktech: KtechSynthesizer) -> Self {
        self.ktech = Some(ktech);
        self
    }
}

/// Handle to a running batch.
pub struct CropHandle {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl CropHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

pub struct PipelineWorker {
    tx: Sender<AppMsg>,
}

impl PipelineWorker {
    pub fn new(tx: Sender<AppMsg>) -> Self {
        Self { tx }
    }

    /// Runs `job` on a new thread. `cancel` may already be wired to a signal
    /// handler; a token cancelled before the thread starts yields an empty
    /// cancelled report.
    pub fn start_crop(&self, job: CropJob, cancel: CancelToken) -> CropHandle {
        let tx = self.tx.clone();
        let worker_cancel = cancel.clone();

        let thread = thread::spawn(move || {
            Self::run_crop_pipeline(job, &worker_cancel, &tx);
        });

        CropHandle { cancel, thread }
    }

    fn run_crop_pipeline(job: CropJob, cancel: &CancelToken, tx: &Sender<AppMsg>) {
        let CropJob {
            source_dir,
            output_dir,
            names,
            policy,
            skip_existing,
            ktech,
        } = job;

        let mut batch = CropBatch::new(source_dir, output_dir, names)
            .with_policy(policy)
            .with_skip_existing(skip_existing);
        if let Some(ktech) = ktech.as_ref() {
            let _ = tx.send(AppMsg::LogMessage(format!(
                "Missing atlas images will be rebuilt with {}",
                ktech.exe().display()
            )));
            batch = batch.with_synthesizer(ktech as &dyn ImageSynthesizer);
        }

        let outcome = batch.run(cancel, |event| {
            let msg = match event {
                BatchEvent::Started { total, atlases } => {
                    let _ = tx.send(AppMsg::LogMessage(format!(
                        "Found {} atlases, cropping {} icons",
                        atlases, total
                    )));
                    AppMsg::PipelineStarted { total, atlases }
                }
                BatchEvent::ItemFinished {
                    index,
                    total,
                    key,
                    result,
                } => {
                    let _ = tx.send(AppMsg::ItemFinished(key, result));
                    AppMsg::PipelineProgress(index + 1, total)
                }
                BatchEvent::Log(LogLevel::Info, line) => AppMsg::LogMessage(line),
                BatchEvent::Log(LogLevel::Warn, line) => AppMsg::WarnMessage(line),
            };
            let _ = tx.send(msg);
        });

        let msg = match outcome {
            Ok(report) if report.is_cancelled() => AppMsg::PipelineCancelled(report),
            Ok(report) => AppMsg::PipelineCompleted(report),
            Err(e) => AppMsg::PipelineFailed(e.to_string()),
        };
        let _ = tx.send(msg);
    }
}
