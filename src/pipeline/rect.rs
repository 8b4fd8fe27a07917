// UV to pixel rectangle resolution

use serde::{Deserialize, Serialize};

pub const DEFAULT_HALF_SIZE: u32 = 32;

/// Normalized texture coordinates of an atlas element.
///
/// `v` grows upwards: `v = 0` is the bottom row of the texture and `v = 1` the
/// top row, the opposite of pixel row order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u1: f64,
    pub u2: f64,
    pub v1: f64,
    pub v2: f64,
}

/// Pixel rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl PixelRect {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).clamp(0, u32::MAX as i64) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).clamp(0, u32::MAX as i64) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Clips the rectangle to a `width` x `height` image.
    pub fn intersect(&self, width: u32, height: u32) -> Self {
        Self {
            left: self.left.clamp(0, width as i64),
            top: self.top.clamp(0, height as i64),
            right: self.right.clamp(0, width as i64),
            bottom: self.bottom.clamp(0, height as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CropPolicy {
    /// Crop exactly the element's UV bounds.
    #[default]
    BoundingBox,
    /// Crop a `2 * half` square around the element's center, clamped per edge.
    FixedCentered { half: u32 },
}

impl CropPolicy {
    pub fn fixed() -> Self {
        CropPolicy::FixedCentered { half: DEFAULT_HALF_SIZE }
    }
}

fn px(value: f64) -> i64 {
    value.round() as i64
}

pub fn resolve(uv: &UvRect, width: u32, height: u32, policy: CropPolicy) -> PixelRect {
    let w = width as f64;
    let h = height as f64;

    match policy {
        CropPolicy::BoundingBox => PixelRect {
            left: px(uv.u1 * w),
            top: px((1.0 - uv.v2) * h),
            right: px(uv.u2 * w),
            bottom: px((1.0 - uv.v1) * h),
        },
        CropPolicy::FixedCentered { half } => {
            let half = half as i64;
            let cx = px(((uv.u1 + uv.u2) / 2.0) * w);
            let cy = px(((2.0 - uv.v1 - uv.v2) / 2.0) * h);
            PixelRect {
                left: (cx - half).max(0),
                top: (cy - half).max(0),
                right: (cx + half).min(width as i64),
                bottom: (cy + half).min(height as i64),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uv(u1: f64, u2: f64, v1: f64, v2: f64) -> UvRect {
        UvRect { u1, u2, v1, v2 }
    }

    #[test]
    fn test_bounding_box_flips_v() {
        let rect = resolve(&uv(0.25, 0.75, 0.0, 0.5), 100, 100, CropPolicy::BoundingBox);
        assert_eq!(rect, PixelRect::new(25, 50, 75, 100));
        assert_eq!(rect.width(), 50);
        assert_eq!(rect.height(), 50);
    }

    #[test]
    fn test_bounding_box_full_texture() {
        let rect = resolve(&uv(0.0, 1.0, 0.0, 1.0), 256, 128, CropPolicy::BoundingBox);
        assert_eq!(rect, PixelRect::new(0, 0, 256, 128));
    }

    #[test]
    fn test_fixed_centered_interior() {
        // center (50, 50)
        let rect = resolve(&uv(0.4, 0.6, 0.4, 0.6), 100, 100, CropPolicy::fixed());
        assert_eq!(rect, PixelRect::new(18, 18, 82, 82));
    }

    #[test]
    fn test_fixed_centered_clamps_per_edge() {
        // center (5, 5): u mid = 0.05, v mid = 0.95
        let rect = resolve(&uv(0.0, 0.1, 0.9, 1.0), 100, 100, CropPolicy::fixed());
        assert_eq!(rect, PixelRect::new(0, 0, 37, 37));
        assert_eq!(rect.width(), 37);
    }

    #[test]
    fn test_fixed_centered_clamps_far_edge() {
        let rect = resolve(&uv(0.9, 1.0, 0.0, 0.1), 100, 100, CropPolicy::fixed());
        assert_eq!(rect, PixelRect::new(63, 63, 100, 100));
    }

    #[test]
    fn test_malformed_uv_is_empty() {
        let rect = resolve(&uv(0.75, 0.25, 0.0, 0.5), 100, 100, CropPolicy::BoundingBox);
        assert!(rect.is_empty());
        assert_eq!(rect.width(), 0);
    }

    #[test]
    fn test_intersect() {
        let rect = PixelRect::new(-10, 90, 20, 130).intersect(100, 100);
        assert_eq!(rect, PixelRect::new(0, 90, 20, 100));
        assert!(PixelRect::new(120, 0, 150, 10).intersect(100, 100).is_empty());
    }
}
