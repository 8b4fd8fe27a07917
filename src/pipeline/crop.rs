// Per-icon crop execution

use anyhow::{Context, Result};
use image::{RgbaImage, imageops};
use std::fmt;
use std::path::{Path, PathBuf};

use super::atlas::{AtlasHit, AtlasIndex};
use super::fs_ops::write_png;
use super::names::IconKey;
use super::rect::{CropPolicy, resolve};

#[derive(Debug, Clone, PartialEq)]
pub enum CropResult {
    Success(PathBuf),
    Skipped,
    NotFound,
    Failed(String),
}

impl CropResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CropResult::Success(_))
    }

    /// One-line progress text, e.g. `meat - Success!`.
    pub fn status_line(&self, key: &IconKey) -> String {
        match self {
            CropResult::Success(_) => format!("{} - Success!", key.stem()),
            CropResult::Skipped => format!("{} - Skipped", key.stem()),
            CropResult::NotFound => format!("{} - File not found", key.stem()),
            CropResult::Failed(reason) => format!("{} - Failed: {}", key.stem(), reason),
        }
    }
}

impl fmt::Display for CropResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropResult::Success(path) => write!(f, "written to {}", path.display()),
            CropResult::Skipped => f.write_str("skipped"),
            CropResult::NotFound => f.write_str("not found"),
            CropResult::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CropOptions {
    pub output_dir: PathBuf,
    pub policy: CropPolicy,
    pub skip_existing: bool,
}

impl CropOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy: CropPolicy::default(),
            skip_existing: false,
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
}

pub fn output_path(output_dir: &Path, key: &IconKey) -> PathBuf {
    output_dir.join(format!("{}.png", key.stem()))
}

/// Looks `key` up in `index` and writes its crop, never failing the caller.
pub fn crop_icon(index: &mut AtlasIndex<'_>, key: &IconKey, options: &CropOptions) -> CropResult {
    let Some(hit) = index.find(key) else {
        return CropResult::NotFound;
    };

    let output = output_path(&options.output_dir, key);
    if options.skip_existing && output.exists() {
        return CropResult::Skipped;
    }

    match crop_to_file(index, hit, &output, options.policy) {
        Ok(()) => CropResult::Success(output),
        Err(e) => CropResult::Failed(format!("{:#}", e)),
    }
}

fn crop_to_file(
    index: &mut AtlasIndex<'_>,
    hit: AtlasHit,
    output: &Path,
    policy: CropPolicy,
) -> Result<()> {
    let element = index
        .element(hit)
        .ok_or_else(|| anyhow::anyhow!("Matched element is no longer indexed"))?;
    let name = element.name.clone();
    let uv = element
        .uv()
        .with_context(|| format!("Bad coordinates for {}", name))?;

    let image = index.image(hit)?;
    let (width, height) = image.dimensions();

    let rect = resolve(&uv, width, height, policy);
    if rect.is_empty() {
        anyhow::bail!("Empty crop rectangle {:?} for {}", rect, name);
    }

    // Parts of the rectangle beyond the atlas stay transparent.
    let mut canvas = RgbaImage::new(rect.width(), rect.height());
    let clipped = rect.intersect(width, height);
    if !clipped.is_empty() {
        let inside = imageops::crop_imm(
            image,
            clipped.left as u32,
            clipped.top as u32,
            clipped.width(),
            clipped.height(),
        )
        .to_image();
        imageops::replace(&mut canvas, &inside, clipped.left - rect.left, clipped.top - rect.top);
    }

    write_png(&canvas, output)
}
