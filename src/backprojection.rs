//
// Unweighted back-projection
//
// Smear every projection of a sinogram back across a square image,
// along the direction the rays travelled. Each image pixel collects,
// for every tilt, the value of the ray passing through its centre,
// interpolated between the two nearest measured rays.
//
// Without a weighting filter (see filter.rs) the result is the true
// slice blurred by a 1/r point-spread function. That is still useful as
// a fast live preview while a tilt series is being aligned.
//
// Image geometry: an N x N grid for N rays, pixel (iy, iz) centred at
// (iy + 0.5 - N/2, iz + 0.5 - N/2). Ray r sits at offset r - N/2 along
// the detector, with N/2 in integer arithmetic.
//

use std::f32::consts::PI;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use crate::angles::trig_table;
use crate::error::{ReconError, Result};
use crate::sinogram::Sinogram;

/// A reconstructed N x N slice, `data[iy * size + iz]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructedSlice {
    pub size: usize,
    pub data: Vec<f32>,
}

impl ReconstructedSlice {
    pub fn zeros(size: usize) -> ReconstructedSlice {
        ReconstructedSlice {
            size,
            data: vec![0.0; size * size],
        }
    }
}

impl Index<(usize, usize)> for ReconstructedSlice {
    type Output = f32;

    #[inline]
    fn index(&self, (iy, iz): (usize, usize)) -> &f32 {
        &self.data[iy * self.size + iz]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Scale by pi / (2 * number of tilts), so the slice is in the same
    /// units whatever the tilt count.
    #[default]
    Standard,
    /// Raw sums, for previews where only relative contrast matters.
    None,
}

impl Normalization {
    pub fn factor(self, num_tilts: usize) -> f32 {
        match self {
            Normalization::Standard => PI / (2.0 * num_tilts as f32),
            Normalization::None => 1.0,
        }
    }
}

/// How a ray value is read off a projection between measured rays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

impl Interpolation {
    pub const ALL: [Interpolation; 2] = [Interpolation::Linear, Interpolation::Nearest];

    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Linear => "linear",
            Interpolation::Nearest => "nearest",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Interpolation::ALL
            .iter()
            .copied()
            .find(|i| i.name() == s)
            .ok_or_else(|| format!("unknown interpolation \"{}\" (expected linear or nearest)", s))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BackProjectionOptions {
    pub normalization: Normalization,
    pub interpolation: Interpolation,
    /// Zero out negative values after normalisation. Only meaningful
    /// after a weighting filter, which introduces negative lobes.
    pub clip_negative: bool,
}

fn check_inputs(sinogram: &Sinogram, tilt_angles: &[f64]) -> Result<()> {
    if sinogram.rays == 0 || sinogram.tilts == 0 {
        return Err(ReconError::InvalidArgument(format!(
            "cannot back-project an empty {}x{} sinogram",
            sinogram.rays, sinogram.tilts
        )));
    }
    if sinogram.data.len() != sinogram.rays * sinogram.tilts {
        return Err(ReconError::InvalidInput(format!(
            "{} values do not fill a {}x{} sinogram",
            sinogram.data.len(),
            sinogram.rays,
            sinogram.tilts
        )));
    }
    if tilt_angles.len() != sinogram.tilts {
        return Err(ReconError::InvalidArgument(format!(
            "{} tilt angles given for a sinogram of {} tilts",
            tilt_angles.len(),
            sinogram.tilts
        )));
    }
    Ok(())
}

/// Reconstruct one slice from its sinogram by linearly interpolated,
/// unweighted back-projection.
pub fn unweighted_back_projection(
    sinogram: &Sinogram,
    tilt_angles: &[f64],
    normalization: Normalization,
) -> Result<ReconstructedSlice> {
    let options = BackProjectionOptions {
        normalization,
        ..BackProjectionOptions::default()
    };
    back_project(sinogram, tilt_angles, &options)
}

pub fn back_project(
    sinogram: &Sinogram,
    tilt_angles: &[f64],
    options: &BackProjectionOptions,
) -> Result<ReconstructedSlice> {
    check_inputs(sinogram, tilt_angles)?;
    let mut slice = ReconstructedSlice::zeros(sinogram.rays);
    back_project_into(sinogram, &trig_table(tilt_angles), options, &mut slice.data);
    Ok(slice)
}

// Worker behind back_project. The caller has already checked its
// inputs, and hands in the trig table so a run can share one across
// all slices.
pub(crate) fn back_project_into(
    sinogram: &Sinogram,
    trig: &[(f32, f32)],
    options: &BackProjectionOptions,
    image: &mut [f32],
) {
    let n = sinogram.rays;
    debug_assert_eq!(trig.len(), sinogram.tilts);
    debug_assert_eq!(image.len(), n * n);

    image.fill(0.0);
    let half_pixels = n as f32 / 2.0;
    let half_rays = (n / 2) as f32;
    let centres = (0..n)
        .map(|i| i as f32 + 0.5 - half_pixels)
        .collect::<Vec<_>>();

    for (tilt, &(cos, sin)) in trig.iter().enumerate() {
        let projection = sinogram.projection(tilt);
        for (iy, &y) in centres.iter().enumerate() {
            let row = &mut image[iy * n..(iy + 1) * n];
            for (pixel, &z) in row.iter_mut().zip(centres.iter()) {
                // Signed distance of the ray through this pixel from
                // the rotation axis.
                let t = y * cos + z * sin;
                if t < -half_rays || t > half_rays {
                    continue;
                }
                *pixel += match options.interpolation {
                    Interpolation::Linear => {
                        let ray = (t + half_rays).floor();
                        let r0 = ray as isize;
                        if r0 < 0 || r0 as usize + 1 >= n {
                            continue;
                        }
                        let (q1, q2) = (projection[r0 as usize], projection[r0 as usize + 1]);
                        q1 + (t - (ray - half_rays)) * (q2 - q1)
                    }
                    Interpolation::Nearest => {
                        let r = (t + half_rays).round() as isize;
                        if r < 0 || r as usize >= n {
                            continue;
                        }
                        projection[r as usize]
                    }
                };
            }
        }
    }

    let factor = options.normalization.factor(sinogram.tilts);
    for v in image.iter_mut() {
        *v *= factor;
        if options.clip_negative && *v < 0.0 {
            *v = 0.0;
        }
    }
}
