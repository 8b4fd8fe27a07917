use crate::pipeline::{BatchReport, CropResult, IconKey};

#[derive(Clone, Debug)]
pub enum AppMsg {
    // Pipeline control
    PipelineStarted { total: usize, atlases: usize },
    PipelineProgress(usize, usize),
    ItemFinished(IconKey, CropResult),
    PipelineCompleted(BatchReport),
    PipelineCancelled(BatchReport),
    PipelineFailed(String),

    // General
    LogMessage(String),
    WarnMessage(String),
}
