pub mod atlas;
pub mod batch;
pub mod crop;
pub mod fs_ops;
pub mod names;
pub mod rect;
pub mod synth;

pub use atlas::{AtlasCatalog, AtlasIndex, Element};
pub use batch::{
    BatchError, BatchEvent, BatchReport, BatchState, CancelToken, CropBatch, LogLevel, Summary,
};
pub use crop::{CropOptions, CropResult};
pub use names::{IconKey, canonical_requests, normalize};
pub use rect::{CropPolicy, PixelRect, UvRect};
pub use synth::{ImageSynthesizer, KtechSynthesizer};
