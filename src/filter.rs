//
// Projection weighting filters
//
// Plain back-projection blurs everything with a 1/r point-spread
// function. Weighting each projection with a ramp in frequency space
// before back-projecting undoes that blur. The softer variants trade
// some resolution for less high-frequency noise.
//
// Each projection is zero-padded to a power of two, so the circular
// convolution of the FFT does not wrap one edge of the projection onto
// the other.
//

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::error::{ReconError, Result};
use crate::sinogram::Sinogram;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProjectionFilter {
    #[default]
    None,
    Ramp,
    SheppLogan,
    Cosine,
    Hamming,
    Hann,
}

impl ProjectionFilter {
    pub const ALL: [ProjectionFilter; 6] = [
        ProjectionFilter::None,
        ProjectionFilter::Ramp,
        ProjectionFilter::SheppLogan,
        ProjectionFilter::Cosine,
        ProjectionFilter::Hamming,
        ProjectionFilter::Hann,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProjectionFilter::None => "none",
            ProjectionFilter::Ramp => "ramp",
            ProjectionFilter::SheppLogan => "shepp-logan",
            ProjectionFilter::Cosine => "cosine",
            ProjectionFilter::Hamming => "hamming",
            ProjectionFilter::Hann => "hann",
        }
    }

    // Gain at a frequency given in cycles per sample, |freq| <= 0.5.
    fn response(self, freq: f64) -> f64 {
        let ramp = 2.0 * freq.abs();
        let omega = 2.0 * PI * freq;
        match self {
            ProjectionFilter::None => 1.0,
            _ if freq == 0.0 => 0.0,
            ProjectionFilter::Ramp => ramp,
            ProjectionFilter::SheppLogan => ramp * omega.sin() / omega,
            ProjectionFilter::Cosine => ramp * (omega / 2.0).cos(),
            ProjectionFilter::Hamming => ramp * (0.54 + 0.46 * (omega / 2.0).cos()),
            ProjectionFilter::Hann => ramp * (1.0 + (omega / 2.0).cos()) / 2.0,
        }
    }
}

impl fmt::Display for ProjectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectionFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProjectionFilter::ALL
            .iter()
            .copied()
            .find(|filter| filter.name() == s)
            .ok_or_else(|| {
                let names = ProjectionFilter::ALL.map(|f| f.name());
                format!("unknown filter \"{}\" (expected one of: {})", s, names.join(", "))
            })
    }
}

// Frequency of FFT bin `k` out of `n`, in cycles per sample: 0, 1/n,
// ..., then the negative frequencies.
fn bin_frequency(k: usize, n: usize) -> f64 {
    if k < (n + 1) / 2 {
        k as f64 / n as f64
    } else {
        k as f64 / n as f64 - 1.0
    }
}

/// A filter planned for one projection length. Plans and the response
/// are reused across every projection and slice of a run.
pub struct FilterPlan {
    filter: ProjectionFilter,
    rays: usize,
    response: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl FilterPlan {
    pub fn new(filter: ProjectionFilter, rays: usize) -> FilterPlan {
        let padded = rays.max(1).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(padded);
        let inverse = planner.plan_fft_inverse(padded);
        let response = (0..padded)
            .map(|k| filter.response(bin_frequency(k, padded)) as f32)
            .collect();

        FilterPlan {
            filter,
            rays,
            response,
            forward,
            inverse,
        }
    }

    pub fn filter(&self) -> ProjectionFilter {
        self.filter
    }

    pub fn padded_len(&self) -> usize {
        self.response.len()
    }

    /// Filter every projection of `sinogram` in place. The sinogram
    /// must have the ray count the plan was made for.
    pub fn apply(&self, sinogram: &mut Sinogram) -> Result<()> {
        if sinogram.rays != self.rays {
            return Err(ReconError::InvalidArgument(format!(
                "sinogram has {} rays, filter plan expects {}",
                sinogram.rays, self.rays
            )));
        }
        if self.filter == ProjectionFilter::None {
            return Ok(());
        }

        const ZERO: Complex32 = Complex32::new(0.0, 0.0);
        let n = self.padded_len();
        // rustfft does not normalise; fold the 1/n of the inverse into
        // the copy back.
        let scale = 1.0 / n as f32;
        let mut buffer = vec![ZERO; n];
        let mut scratch = vec![
            ZERO;
            self.forward
                .get_inplace_scratch_len()
                .max(self.inverse.get_inplace_scratch_len())
        ];

        for t in 0..sinogram.tilts {
            let projection = sinogram.projection_mut(t);
            for (b, v) in buffer.iter_mut().zip(projection.iter().chain(std::iter::repeat(&0.0))) {
                *b = Complex32::new(*v, 0.0);
            }

            self.forward.process_with_scratch(&mut buffer, &mut scratch);
            for (b, g) in buffer.iter_mut().zip(self.response.iter()) {
                *b *= *g;
            }
            self.inverse.process_with_scratch(&mut buffer, &mut scratch);

            for (v, b) in projection.iter_mut().zip(buffer.iter()) {
                *v = b.re * scale;
            }
        }
        Ok(())
    }
}

/// One-off convenience for filtering a single sinogram.
pub fn filter_sinogram(sinogram: &mut Sinogram, filter: ProjectionFilter) -> Result<()> {
    FilterPlan::new(filter, sinogram.rays).apply(sinogram)
}
