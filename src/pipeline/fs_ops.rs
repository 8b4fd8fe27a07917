use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::Path;

pub fn ensure_dir<P: AsRef<Path>>(p: P) -> std::io::Result<()> {
    if !p.as_ref().exists() {
        fs::create_dir_all(&p)?;
    }
    Ok(())
}

pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    #[test]
    fn test_write_png_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("icon.png");

        let image = RgbaImage::from_pixel(16, 8, Rgba([255, 0, 0, 255]));
        write_png(&image, &path).unwrap();
        assert!(path.exists());

        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), 16);
        assert_eq!(loaded.height(), 8);
    }

    #[test]
    fn test_ensure_dir_existing() {
        let dir = tempdir().unwrap();
        ensure_dir(dir.path()).unwrap();
        ensure_dir(dir.path().join("a/b")).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }
}
