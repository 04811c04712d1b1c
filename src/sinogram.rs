//
// Sinogram extraction
//
// A sinogram is everything one x-slice of the specimen contributed to
// the tilt series: one row of rays per tilt. Plain extraction is a
// strided copy; resampled extraction interpolates each tilt's rays to
// a new ray count, optionally shifted and rotated to correct for a
// misplaced tilt axis.
//

use std::ops::{Index, IndexMut};

use log::trace;
use rand::Rng;

use crate::angles::to_radians;
use crate::error::{ReconError, Result};
use crate::volume::TiltSeries;

#[derive(Clone, Debug, PartialEq)]
pub struct Sinogram {
    pub rays: usize,
    pub tilts: usize,
    // Tilt-major: data[tilt * rays + ray].
    pub data: Vec<f32>,
}

impl Index<(usize, usize)> for Sinogram {
    type Output = f32;
    fn index(&self, (ray, tilt): (usize, usize)) -> &f32 {
        &self.data[tilt * self.rays + ray]
    }
}

impl IndexMut<(usize, usize)> for Sinogram {
    fn index_mut(&mut self, (ray, tilt): (usize, usize)) -> &mut f32 {
        &mut self.data[tilt * self.rays + ray]
    }
}

impl Sinogram {
    pub fn zeros(rays: usize, tilts: usize) -> Sinogram {
        Sinogram {
            rays,
            tilts,
            data: vec![0.0; rays * tilts],
        }
    }

    /// The rays of a single tilt.
    pub fn projection(&self, tilt: usize) -> &[f32] {
        &self.data[tilt * self.rays..(tilt + 1) * self.rays]
    }

    pub fn projection_mut(&mut self, tilt: usize) -> &mut [f32] {
        &mut self.data[tilt * self.rays..(tilt + 1) * self.rays]
    }

    /// Add uniform noise of amplitude `fraction` times the largest
    /// value in the sinogram.
    pub fn add_noise<R: Rng>(&self, rng: &mut R, fraction: f64) -> Sinogram {
        let max = self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let amplitude = (fraction * max as f64) as f32;
        let data = if amplitude > 0.0 {
            self.data
                .iter()
                .map(|v| v + rng.gen_range(-amplitude..=amplitude))
                .collect()
        } else {
            self.data.clone()
        };
        Sinogram {
            rays: self.rays,
            tilts: self.tilts,
            data,
        }
    }
}

/// How to sample rays when extracting a sinogram.
///
/// `ray_count` resamples each projection onto that many rays of width
/// `num_rays / ray_count`. `axis_shift` moves the tilt axis along the
/// rays, in input ray units. `axis_angle` (degrees) rotates the tilt
/// axis in the projection plane; it composes with resampling, and the
/// rotated sample points are interpolated bilinearly. Samples that
/// land outside the projection read as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SinogramOptions {
    pub ray_count: Option<usize>,
    pub axis_shift: f64,
    pub axis_angle: f64,
}

impl SinogramOptions {
    pub fn with_ray_count(mut self, ray_count: usize) -> SinogramOptions {
        self.ray_count = Some(ray_count);
        self
    }

    pub fn with_axis_shift(mut self, axis_shift: f64) -> SinogramOptions {
        self.axis_shift = axis_shift;
        self
    }

    pub fn with_axis_angle(mut self, axis_angle: f64) -> SinogramOptions {
        self.axis_angle = axis_angle;
        self
    }

    pub fn output_rays(&self, num_rays: usize) -> usize {
        self.ray_count.unwrap_or(num_rays)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ray_count == Some(0) {
            return Err(ReconError::InvalidArgument("ray count must be positive".to_string()));
        }
        if !self.axis_shift.is_finite() || !self.axis_angle.is_finite() {
            return Err(ReconError::InvalidArgument(format!(
                "axis shift {} and axis angle {} must be finite",
                self.axis_shift, self.axis_angle
            )));
        }
        Ok(())
    }

    fn is_plain_copy(&self, num_rays: usize) -> bool {
        self.output_rays(num_rays) == num_rays && self.axis_shift == 0.0 && self.axis_angle == 0.0
    }
}

fn check_slice(series: &TiltSeries, slice: usize) -> Result<()> {
    if slice >= series.num_slices() {
        return Err(ReconError::InvalidArgument(format!(
            "slice index {} out of range for {} slices",
            slice,
            series.num_slices()
        )));
    }
    Ok(())
}

/// Copy out the sinogram of one x-slice: `rays x tilts`, unchanged.
pub fn extract_sinogram(series: &TiltSeries, slice: usize) -> Result<Sinogram> {
    check_slice(series, slice)?;
    let [x_dim, y_dim, z_dim] = series.dims();
    let data = series.data();

    let mut sinogram = Sinogram::zeros(y_dim, z_dim);
    for t in 0..z_dim {
        let row = sinogram.projection_mut(t);
        for (r, v) in row.iter_mut().enumerate() {
            *v = data[t * x_dim * y_dim + r * x_dim + slice];
        }
    }
    Ok(sinogram)
}

/// Extract the sinogram of one x-slice, resampled and axis-corrected
/// according to `options`. With default options this is the same as
/// `extract_sinogram`.
pub fn extract_sinogram_with(
    series: &TiltSeries,
    slice: usize,
    options: &SinogramOptions,
) -> Result<Sinogram> {
    check_slice(series, slice)?;
    options.validate()?;
    let [x_dim, y_dim, z_dim] = series.dims();
    if options.is_plain_copy(y_dim) {
        return extract_sinogram(series, slice);
    }

    let rays = options.output_rays(y_dim);
    let taps = sample_taps(series.dims(), slice, options);
    trace!("slice {}: resampling {} rays onto {}", slice, y_dim, rays);

    let plane = x_dim * y_dim;
    let data = series.data();
    let mut sinogram = Sinogram::zeros(rays, z_dim);
    for t in 0..z_dim {
        let projection = &data[t * plane..(t + 1) * plane];
        for (out, ray_taps) in sinogram.projection_mut(t).iter_mut().zip(taps.iter()) {
            *out = ray_taps.iter().map(|&(i, w)| projection[i] * w).sum();
        }
    }
    Ok(sinogram)
}

// For each output ray, the (index into one projection plane, weight)
// pairs it interpolates from. These depend only on the slice, so they
// are worked out once and reused for every tilt.
fn sample_taps(
    [x_dim, y_dim, _]: [usize; 3],
    slice: usize,
    options: &SinogramOptions,
) -> Vec<Vec<(usize, f32)>> {
    let rays = options.output_rays(y_dim);
    let ray_width = y_dim as f64 / rays as f64;
    let y_centre = (y_dim / 2) as f64;

    let in_bounds = |x: i64, y: i64| 0 <= x && x < x_dim as i64 && 0 <= y && y < y_dim as i64;
    let plane_index = |x: i64, y: i64| y as usize * x_dim + x as usize;

    let mut taps = Vec::with_capacity(rays);
    for r in 0..rays {
        let ray_coord = (r as f64 - (rays / 2) as f64) * ray_width + options.axis_shift;
        let mut ray_taps = Vec::with_capacity(4);

        if options.axis_angle == 0.0 {
            // Linear interpolation along the rays of this slice only.
            let y = ray_coord + y_centre;
            let y0 = y.floor();
            let fy = (y - y0) as f32;
            let y0 = y0 as i64;
            for (dy, w) in [(0, 1.0 - fy), (1, fy)] {
                if w != 0.0 && in_bounds(slice as i64, y0 + dy) {
                    ray_taps.push((plane_index(slice as i64, y0 + dy), w));
                }
            }
        } else {
            // Rotate (slice offset, ray coordinate) about the centre of
            // the projection, then interpolate bilinearly.
            let (sin, cos) = to_radians(options.axis_angle).sin_cos();
            let x_centre = (x_dim / 2) as f64;
            let dx = slice as f64 - x_centre;
            let x = x_centre + dx * cos - ray_coord * sin;
            let y = y_centre + dx * sin + ray_coord * cos;

            let (x0, y0) = (x.floor(), y.floor());
            let (fx, fy) = ((x - x0) as f32, (y - y0) as f32);
            let (x0, y0) = (x0 as i64, y0 as i64);
            for (dx, dy, w) in [
                (0, 0, (1.0 - fx) * (1.0 - fy)),
                (1, 0, fx * (1.0 - fy)),
                (0, 1, (1.0 - fx) * fy),
                (1, 1, fx * fy),
            ] {
                if w != 0.0 && in_bounds(x0 + dx, y0 + dy) {
                    ray_taps.push((plane_index(x0 + dx, y0 + dy), w));
                }
            }
        }
        taps.push(ray_taps);
    }
    taps
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg64;

    fn random_series(dims: [usize; 3], seed: u64) -> TiltSeries {
        let mut rng = Pcg64::seed_from_u64(seed);
        let len = dims[0] * dims[1] * dims[2];
        let data = (0..len).map(|_| rng.gen_range(0.0f32..10.0)).collect();
        let angles = crate::angles::evenly_spaced(-60.0, 60.0, dims[2]);
        TiltSeries::new(dims, data, angles).unwrap()
    }

    // value = y at every (x, z)
    fn ramp_series(dims: [usize; 3]) -> TiltSeries {
        let [x_dim, y_dim, z_dim] = dims;
        let data = (0..x_dim * y_dim * z_dim)
            .map(|i| ((i / x_dim) % y_dim) as f32)
            .collect();
        TiltSeries::new(dims, data, vec![0.0; z_dim]).unwrap()
    }

    #[test]
    fn test_extract_matches_indexing() {
        let series = random_series([5, 7, 3], 1);
        for slice in 0..5 {
            let sinogram = extract_sinogram(&series, slice).unwrap();
            assert_eq!((sinogram.rays, sinogram.tilts), (7, 3));
            for t in 0..3 {
                for r in 0..7 {
                    assert_eq!(sinogram[(r, t)], series.get(slice, r, t));
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_slice() {
        let series = random_series([4, 4, 3], 2);
        let err = extract_sinogram(&series, 4).unwrap_err();
        assert!(matches!(err, ReconError::InvalidArgument(_)));
        let options = SinogramOptions::default().with_ray_count(8);
        let err = extract_sinogram_with(&series, 4, &options).unwrap_err();
        assert!(matches!(err, ReconError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_ray_count() {
        let series = random_series([4, 4, 3], 3);
        let options = SinogramOptions::default().with_ray_count(0);
        let err = extract_sinogram_with(&series, 0, &options).unwrap_err();
        assert!(matches!(err, ReconError::InvalidArgument(_)));
    }

    #[test]
    fn test_native_resampling_is_identity() {
        for dims in [[3, 6, 4], [2, 7, 5]] {
            let series = random_series(dims, 4);
            let options = SinogramOptions::default().with_ray_count(dims[1]);
            for slice in 0..dims[0] {
                let plain = extract_sinogram(&series, slice).unwrap();
                let resampled = extract_sinogram_with(&series, slice, &options).unwrap();
                assert_eq!(plain, resampled);

                // Bypass the shortcut and go through the taps.
                let taps = sample_taps(dims, slice, &options);
                for (r, ray_taps) in taps.iter().enumerate() {
                    assert_eq!(ray_taps.len(), 1);
                    assert_eq!(ray_taps[0], (r * dims[0] + slice, 1.0));
                }
            }
        }
    }

    #[test]
    fn test_upsampling_interpolates() {
        let series = ramp_series([2, 4, 2]);
        let options = SinogramOptions::default().with_ray_count(8);
        let sinogram = extract_sinogram_with(&series, 1, &options).unwrap();
        assert_eq!((sinogram.rays, sinogram.tilts), (8, 2));
        for t in 0..2 {
            // Ray r samples input coordinate r / 2.
            for r in 0..7 {
                assert!((sinogram[(r, t)] - r as f32 * 0.5).abs() < 1e-6);
            }
            // Last ray straddles the edge; the missing neighbour is zero.
            assert!((sinogram[(7, t)] - 1.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_downsampling() {
        let series = ramp_series([1, 8, 1]);
        let options = SinogramOptions::default().with_ray_count(4);
        let sinogram = extract_sinogram_with(&series, 0, &options).unwrap();
        assert_eq!(sinogram.data, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_axis_shift() {
        let series = random_series([3, 6, 2], 5);
        let plain = extract_sinogram(&series, 2).unwrap();

        let whole = SinogramOptions::default().with_axis_shift(1.0);
        let shifted = extract_sinogram_with(&series, 2, &whole).unwrap();
        for t in 0..2 {
            for r in 0..5 {
                assert!((shifted[(r, t)] - plain[(r + 1, t)]).abs() < 1e-6);
            }
            assert_eq!(shifted[(5, t)], 0.0);
        }

        let half = SinogramOptions::default().with_axis_shift(-0.5);
        let shifted = extract_sinogram_with(&series, 2, &half).unwrap();
        for t in 0..2 {
            assert!((shifted[(0, t)] - 0.5 * plain[(0, t)]).abs() < 1e-5);
            for r in 1..6 {
                let expected = 0.5 * (plain[(r - 1, t)] + plain[(r, t)]);
                assert!((shifted[(r, t)] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_axis_angle_rotates_sampling() {
        // value = 10 * x + y
        let dims = [4, 4, 1];
        let data = (0..16).map(|i| (10 * (i % 4) + i / 4) as f32).collect();
        let series = TiltSeries::new(dims, data, vec![0.0]).unwrap();

        // A quarter turn samples along x instead of y: ray r of slice s
        // reads the pixel at x = 4 - r, y = s.
        let options = SinogramOptions::default().with_axis_angle(90.0);
        for slice in 0..4 {
            let sinogram = extract_sinogram_with(&series, slice, &options).unwrap();
            assert!(sinogram[(0, 0)].abs() < 1e-4);
            for r in 1..4 {
                let expected = (10 * (4 - r) + slice) as f32;
                assert!((sinogram[(r, 0)] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_small_axis_angle_is_continuous() {
        let series = random_series([5, 8, 3], 6);
        let flat = SinogramOptions::default().with_ray_count(16).with_axis_shift(0.25);
        let tilted = flat.with_axis_angle(1e-9);
        let a = extract_sinogram_with(&series, 2, &flat).unwrap();
        let b = extract_sinogram_with(&series, 2, &tilted).unwrap();
        for (x, y) in a.data.iter().zip(b.data.iter()) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_add_noise() {
        let series = random_series([1, 16, 4], 7);
        let sinogram = extract_sinogram(&series, 0).unwrap();
        let max = sinogram.data.iter().fold(0.0f32, |m, v| m.max(*v));

        let mut rng = Pcg64::seed_from_u64(42);
        assert_eq!(sinogram.add_noise(&mut rng, 0.0), sinogram);

        let noisy = sinogram.add_noise(&mut rng, 0.1);
        assert_ne!(noisy, sinogram);
        for (a, b) in noisy.data.iter().zip(sinogram.data.iter()) {
            assert!((a - b).abs() <= 0.1 * max + 1e-6);
        }
    }
}
