//
// Image management
//
// Load and save grey PNGs into a vector of floats, plus the few
// manipulations needed to look at sinograms and reconstructed slices.
//

use std::path::Path;

use image::error::{ParameterError, ParameterErrorKind};
use image::{GrayImage, ImageError, ImageResult, Pixel};

use crate::backprojection::ReconstructedSlice;
use crate::error::{ReconError, Result};
use crate::sinogram::Sinogram;

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Image {
    pub fn load(path: &Path) -> ImageResult<Image> {
        let grey_img = image::open(path)?.into_luma8();

        let width = grey_img.width() as usize;
        let height = grey_img.height() as usize;

        Ok(Image {
            width,
            height,
            data: grey_img.pixels().map(|p| p.channels()[0] as f32).collect(),
        })
    }

    // Values are clamped to 0..255, not rescaled. Use `rescaled` first
    // for anything not already in that range.
    pub fn save(&self, path: &Path) -> ImageResult<()> {
        let data_as_u8 = self
            .data
            .iter()
            .map(|x| x.max(0.0).min(255.0) as u8)
            .collect::<Vec<_>>();
        let img = GrayImage::from_vec(self.width as u32, self.height as u32, data_as_u8)
            .ok_or_else(|| {
                ImageError::Parameter(ParameterError::from_kind(
                    ParameterErrorKind::DimensionMismatch,
                ))
            })?;
        img.save(path)
    }

    // Rows are iy, columns iz.
    pub fn from_slice(slice: &ReconstructedSlice) -> Image {
        Image {
            width: slice.size,
            height: slice.size,
            data: slice.data.clone(),
        }
    }

    // One row per tilt, one column per ray.
    pub fn from_sinogram(sinogram: &Sinogram) -> Image {
        Image {
            width: sinogram.rays,
            height: sinogram.tilts,
            data: sinogram.data.clone(),
        }
    }

    /// Stretch the value range onto 0..255 for viewing. A flat image
    /// maps to all zeros.
    pub fn rescaled(&self) -> Image {
        let (min, max) = self
            .data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let range = max - min;
        let data = if range > 0.0 {
            self.data.iter().map(|v| (v - min) * 255.0 / range).collect()
        } else {
            vec![0.0; self.data.len()]
        };
        Image {
            width: self.width,
            height: self.height,
            data,
        }
    }

    pub fn diff(&self, other: &Image) -> Result<Image> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(ReconError::InvalidArgument(format!(
                "cannot diff a {}x{} image against a {}x{} one",
                self.width, self.height, other.width, other.height
            )));
        }
        Ok(Image {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        })
    }

    pub fn offset_values(&self, offset: f32) -> Image {
        Image {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| v + offset).collect(),
        }
    }

    // Root-mean-square per-pixel difference.
    pub fn rms_diff(&self, other: &Image) -> Result<f64> {
        let diff = self.diff(other)?;
        let sum_sq: f64 = diff.data.iter().map(|v| (*v as f64) * (*v as f64)).sum();
        Ok((sum_sq / diff.data.len().max(1) as f64).sqrt())
    }
}
