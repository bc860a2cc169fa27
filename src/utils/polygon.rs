// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 掩码转多边形 (Mask → polygon)
///
/// The core only depends on the [`PolygonExtractor`] contract; the bundled
/// [`ContourExtractor`] traces outer borders with imageproc and simplifies
/// the largest one with Douglas-Peucker.
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;

use super::mask::Mask;

/// Polygon vertex `(x, y)` in original-image pixel space.
pub type Vertex = (f32, f32);

/// Per-axis scale applied to traced contour points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Scale {
    pub fn uniform(s: f32) -> Self {
        Self { x: s, y: s }
    }

    pub fn per_axis(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn identity() -> Self {
        Self::uniform(1.0)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<f32> for Scale {
    fn from(s: f32) -> Self {
        Self::uniform(s)
    }
}

impl From<(f32, f32)> for Scale {
    fn from((x, y): (f32, f32)) -> Self {
        Self::per_axis(x, y)
    }
}

/// Converts a binary mask into an ordered polygon.
///
/// Must return an empty list when the mask has no contour. Callers treat
/// fewer than three vertices as a degenerate shape.
pub trait PolygonExtractor {
    fn extract(&self, mask: &Mask, scale: Scale, tolerance: f32) -> Vec<Vertex>;
}

/// Outer-border tracing + Douglas-Peucker simplification.
///
/// `tolerance` is the simplification epsilon in mask pixels; `0.0` keeps
/// every traced border pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourExtractor;

impl ContourExtractor {
    pub fn new() -> Self {
        Self
    }
}

// 2x shoelace area, exact in integer space
fn twice_area(points: &[Point<i32>]) -> i64 {
    if points.len() < 3 {
        return 0;
    }
    let mut acc: i64 = 0;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        acc += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    acc.abs()
}

// 四周补一圈背景像素, 贴边的前景才会被识别为外轮廓
fn padded_image(mask: &Mask) -> GrayImage {
    let (h, w) = mask.dim();
    let data = mask.data();
    GrayImage::from_fn(w as u32 + 2, h as u32 + 2, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if x >= 1 && y >= 1 && x <= w && y <= h && data[[y - 1, x - 1]] {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

impl PolygonExtractor for ContourExtractor {
    fn extract(&self, mask: &Mask, scale: Scale, tolerance: f32) -> Vec<Vertex> {
        if mask.is_blank() {
            return Vec::new();
        }

        let contours: Vec<Contour<i32>> = find_contours(&padded_image(mask));
        let Some(outer) = contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .max_by_key(|c| (twice_area(&c.points), c.points.len()))
        else {
            return Vec::new();
        };

        let mut points = if tolerance > 0.0 && outer.points.len() >= 3 {
            approximate_polygon_dp(&outer.points, tolerance as f64, true)
        } else {
            outer.points
        };

        // closed curves may repeat the start vertex at the end
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        points
            .iter()
            .map(|p| ((p.x - 1) as f32 * scale.x, (p.y - 1) as f32 * scale.y))
            .collect()
    }
}
