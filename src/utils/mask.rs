// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 二值掩码 (Binary instance mask)
///
/// Row-major `(rows, cols)` raster aligned to full-image coordinates.
use image::{imageops, GrayImage, Luma};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mask(Array2<bool>);

impl Mask {
    pub fn new(data: Array2<bool>) -> Self {
        Self(data)
    }

    /// All-background mask of `height x width`.
    pub fn empty(height: usize, width: usize) -> Self {
        Self(Array2::from_elem((height, width), false))
    }

    /// Binarize a score map: a pixel is foreground when `score > threshold`.
    pub fn from_scores(scores: &Array2<f32>, threshold: f32) -> Self {
        Self(scores.mapv(|v| v > threshold))
    }

    pub fn from_gray_image(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            img.get_pixel(x as u32, y as u32).0[0] > 0
        });
        Self(data)
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            if self.0[[y as usize, x as usize]] {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    pub fn data(&self) -> &Array2<bool> {
        &self.0
    }

    pub fn height(&self) -> usize {
        self.0.nrows()
    }

    pub fn width(&self) -> usize {
        self.0.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> usize {
        self.0.iter().filter(|&&v| v).count()
    }

    pub fn is_blank(&self) -> bool {
        !self.0.iter().any(|&v| v)
    }

    fn check_dim(&self, other: &Mask) -> Result<()> {
        if self.dim() != other.dim() {
            return Err(DetectError::MaskSize {
                left: self.dim(),
                right: other.dim(),
            });
        }
        Ok(())
    }

    pub fn intersection_area(&self, other: &Mask) -> Result<usize> {
        self.check_dim(other)?;
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .filter(|(&a, &b)| a && b)
            .count())
    }

    pub fn union_area(&self, other: &Mask) -> Result<usize> {
        self.check_dim(other)?;
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .filter(|(&a, &b)| a || b)
            .count())
    }

    /// Intersection over union. An empty union yields 0.0.
    pub fn iou(&self, other: &Mask) -> Result<f32> {
        let inter = self.intersection_area(other)?;
        let union = self.union_area(other)?;
        if union == 0 {
            return Ok(0.0);
        }
        Ok(inter as f32 / union as f32)
    }

    /// Pixel-wise logical OR.
    pub fn union(&self, other: &Mask) -> Result<Mask> {
        self.check_dim(other)?;
        let data = Zip::from(&self.0)
            .and(&other.0)
            .map_collect(|&a, &b| a || b);
        Ok(Mask(data))
    }

    /// Nearest-neighbour resize to `width x height`.
    pub fn resize(&self, width: u32, height: u32) -> Mask {
        if self.width() == width as usize && self.height() == height as usize {
            return self.clone();
        }
        if self.width() == 0 || self.height() == 0 || width == 0 || height == 0 {
            return Mask::empty(height as usize, width as usize);
        }
        let resized = imageops::resize(
            &self.to_gray_image(),
            width,
            height,
            imageops::FilterType::Nearest,
        );
        Mask::from_gray_image(&resized)
    }
}
