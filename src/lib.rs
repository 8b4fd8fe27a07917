// Library exports for tex2icon

pub mod config;
pub mod event;
pub mod pipeline;
pub mod pipeline_worker;

// Re-export commonly used types from pipeline
pub use pipeline::{
    BatchReport, CancelToken, CropBatch, CropPolicy, CropResult, IconKey, ImageSynthesizer,
    KtechSynthesizer,
};
