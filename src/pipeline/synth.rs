// Recovery of missing atlas images through an external converter

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Produces a raster image from a raw texture asset.
///
/// Implementations deposit `<asset stem>.png` into `target_dir` and report
/// whether the step succeeded. The atlas index still checks that the image
/// exists afterwards.
pub trait ImageSynthesizer {
    fn synthesize(&self, asset: &Path, target_dir: &Path) -> bool;
}

/// Runs Klei's `ktech` converter as `ktech <asset> <target_dir>`.
#[derive(Debug, Clone)]
pub struct KtechSynthesizer {
    exe: PathBuf,
}

impl KtechSynthesizer {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Finds `ktech` inside `dir`, or on `PATH` when no directory is given.
    pub fn locate(dir: Option<&Path>) -> Result<Self> {
        let exe = match dir {
            Some(dir) => {
                let exe = dir.join(executable_name());
                if !exe.is_file() {
                    anyhow::bail!("ktech not found at {}", exe.display());
                }
                exe
            }
            None => which::which("ktech").context("ktech not found on PATH")?,
        };
        Ok(Self::new(exe))
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn run(&self, asset: &Path, target_dir: &Path) -> Result<()> {
        let status = Command::new(&self.exe)
            .arg(asset)
            .arg(target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("Failed to execute `{}`", self.exe.display()))?;

        if !status.success() {
            anyhow::bail!("`{}` exited with {}", self.exe.display(), status);
        }

        let stem = asset
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("Asset has no file name: {}", asset.display()))?;
        let expected = target_dir.join(format!("{}.png", stem.to_string_lossy()));
        if !expected.exists() {
            anyhow::bail!("`{}` produced no {}", self.exe.display(), expected.display());
        }
        Ok(())
    }
}

impl ImageSynthesizer for KtechSynthesizer {
    fn synthesize(&self, asset: &Path, target_dir: &Path) -> bool {
        match self.run(asset, target_dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("image synthesis failed for {}: {:#}", asset.display(), e);
                false
            }
        }
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "ktech.exe" } else { "ktech" }
}
