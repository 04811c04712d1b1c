//
// Reconstruction configuration
//
// Everything a run needs besides the tilt series itself. The defaults
// give the plain, interactive reconstruction: native resolution, no
// filter, linear interpolation, standard normalisation, and serial
// slice order.
//

use crate::backprojection::{BackProjectionOptions, Interpolation, Normalization};
use crate::error::{ReconError, Result};
use crate::filter::ProjectionFilter;
use crate::sinogram::SinogramOptions;

pub const MAX_OUTPUT_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Execution {
    /// One slice after another, progress reported in slice order.
    #[default]
    Serial,
    /// Slices spread over the rayon thread pool.
    Parallel,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconstructionConfig {
    /// Side of each reconstructed slice. `None` keeps the detector's
    /// own ray count.
    pub output_size: Option<usize>,
    pub filter: ProjectionFilter,
    pub interpolation: Interpolation,
    pub normalization: Normalization,
    pub clip_negative: bool,
    /// Rotation axis offset from the detector centre, in detector pixels.
    pub axis_shift: f64,
    /// Rotation axis tilt within the projection plane, in degrees.
    pub axis_angle: f64,
    pub execution: Execution,
}

impl ReconstructionConfig {
    pub fn with_output_size(mut self, size: usize) -> ReconstructionConfig {
        self.output_size = Some(size);
        self
    }

    pub fn with_filter(mut self, filter: ProjectionFilter) -> ReconstructionConfig {
        self.filter = filter;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> ReconstructionConfig {
        self.interpolation = interpolation;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> ReconstructionConfig {
        self.normalization = normalization;
        self
    }

    pub fn with_clip_negative(mut self, clip: bool) -> ReconstructionConfig {
        self.clip_negative = clip;
        self
    }

    pub fn with_axis_shift(mut self, shift: f64) -> ReconstructionConfig {
        self.axis_shift = shift;
        self
    }

    pub fn with_axis_angle(mut self, angle: f64) -> ReconstructionConfig {
        self.axis_angle = angle;
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> ReconstructionConfig {
        self.execution = execution;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.output_size {
            if size == 0 || size > MAX_OUTPUT_SIZE {
                return Err(ReconError::InvalidArgument(format!(
                    "output size {} outside 1..={}",
                    size, MAX_OUTPUT_SIZE
                )));
            }
        }
        self.sinogram_options().validate()
    }

    /// Side of the reconstructed slices for a detector of `num_rays`.
    pub fn slice_size(&self, num_rays: usize) -> usize {
        self.output_size.unwrap_or(num_rays)
    }

    pub fn sinogram_options(&self) -> SinogramOptions {
        SinogramOptions {
            ray_count: self.output_size,
            axis_shift: self.axis_shift,
            axis_angle: self.axis_angle,
        }
    }

    pub fn back_projection_options(&self) -> BackProjectionOptions {
        BackProjectionOptions {
            normalization: self.normalization,
            interpolation: self.interpolation,
            clip_negative: self.clip_negative,
        }
    }
}
