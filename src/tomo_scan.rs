//
// Scan generation
//
// Given an image, generate a sinogram of it at a set of tilt angles,
// so reconstructions can be checked against a known phantom.
//
// This is the exact adjoint of the linear back-projector: each pixel
// deposits its value on the two rays either side of where its centre
// projects, with the same weights the back-projector reads them back
// with. A square image with as many pixels across as there are rays
// therefore projects and back-projects onto the same grid.
//

use itertools::iproduct;

use crate::angles::trig_table;
use crate::error::{ReconError, Result};
use crate::sinogram::Sinogram;
use crate::tomo_image::Image;
use crate::volume::TiltSeries;

/// Project `image` onto `rays` parallel rays at each of `angles_deg`.
/// Image rows play the part of y, columns z.
pub fn project(image: &Image, angles_deg: &[f64], rays: usize) -> Result<Sinogram> {
    if rays < 2 {
        return Err(ReconError::InvalidArgument(format!(
            "need at least 2 rays to project onto, got {}",
            rays
        )));
    }
    if image.width == 0 || image.height == 0 || image.data.len() != image.width * image.height {
        return Err(ReconError::InvalidInput(format!(
            "{} pixels do not fill a {}x{} image",
            image.data.len(),
            image.width,
            image.height
        )));
    }

    let half_rays = (rays / 2) as f32;
    let y_centres = pixel_centres(image.height);
    let z_centres = pixel_centres(image.width);

    let mut sinogram = Sinogram::zeros(rays, angles_deg.len());
    for (tilt, &(cos, sin)) in trig_table(angles_deg).iter().enumerate() {
        let projection = sinogram.projection_mut(tilt);
        for (row, &y) in image.data.chunks_exact(image.width).zip(y_centres.iter()) {
            for (&v, &z) in row.iter().zip(z_centres.iter()) {
                if v == 0.0 {
                    continue;
                }
                let t = y * cos + z * sin;
                if t < -half_rays || t > half_rays {
                    continue;
                }
                let ray = (t + half_rays).floor();
                let r0 = ray as isize;
                if r0 < 0 || r0 as usize + 1 >= rays {
                    continue;
                }
                let frac = t - (ray - half_rays);
                projection[r0 as usize] += v * (1.0 - frac);
                projection[r0 as usize + 1] += v * frac;
            }
        }
    }
    Ok(sinogram)
}

fn pixel_centres(n: usize) -> Vec<f32> {
    let half = n as f32 / 2.0;
    (0..n).map(|i| i as f32 + 0.5 - half).collect()
}

/// Build a tilt series from one phantom cross-section per x-slice.
pub fn tilt_series_from_phantoms(
    phantoms: &[Image],
    angles_deg: &[f64],
    rays: usize,
) -> Result<TiltSeries> {
    let sinograms = phantoms
        .iter()
        .map(|phantom| project(phantom, angles_deg, rays))
        .collect::<Result<Vec<_>>>()?;
    tilt_series_from_sinograms(&sinograms, angles_deg)
}

/// Interleave per-slice sinograms into an X-fastest tilt series.
pub fn tilt_series_from_sinograms(sinograms: &[Sinogram], angles_deg: &[f64]) -> Result<TiltSeries> {
    let first = sinograms
        .first()
        .ok_or_else(|| ReconError::InvalidInput("no sinograms to stack".to_string()))?;
    let (rays, tilts) = (first.rays, first.tilts);
    if sinograms.iter().any(|s| s.rays != rays || s.tilts != tilts) {
        return Err(ReconError::InvalidInput(
            "sinograms of different shapes cannot be stacked".to_string(),
        ));
    }

    let slices = sinograms.len();
    let mut data = vec![0.0f32; slices * rays * tilts];
    for (x, sinogram) in sinograms.iter().enumerate() {
        for (t, r) in iproduct!(0..tilts, 0..rays) {
            data[(t * rays + r) * slices + x] = sinogram[(r, t)];
        }
    }
    TiltSeries::new([slices, rays, tilts], data, angles_deg.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::evenly_spaced;
    use crate::backprojection::{unweighted_back_projection, Normalization, ReconstructedSlice};
    use crate::filter::{filter_sinogram, ProjectionFilter};
    use crate::sinogram::extract_sinogram;

    fn point_phantom(size: usize, (iy, iz): (usize, usize)) -> Image {
        let mut data = vec![0.0; size * size];
        data[iy * size + iz] = 1.0;
        Image {
            width: size,
            height: size,
            data,
        }
    }

    fn disk_phantom(size: usize, radius: f32) -> Image {
        let centres = pixel_centres(size);
        let mut data = Vec::with_capacity(size * size);
        for y in centres.iter() {
            for z in centres.iter() {
                data.push(if y * y + z * z <= radius * radius { 1.0 } else { 0.0 });
            }
        }
        Image {
            width: size,
            height: size,
            data,
        }
    }

    fn argmax(slice: &ReconstructedSlice) -> (usize, usize) {
        let (i, _) = slice
            .data
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
        (i / slice.size, i % slice.size)
    }

    #[test]
    fn test_project_blank() {
        let image = Image {
            width: 4,
            height: 4,
            data: vec![0.0; 16],
        };
        let sinogram = project(&image, &[0.0, 45.0, 90.0], 4).unwrap();
        assert_eq!((sinogram.rays, sinogram.tilts), (4, 3));
        assert!(sinogram.data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_project_conserves_mass() {
        // Away from the edges every pixel's value lands on the rays in
        // full.
        let image = point_phantom(16, (7, 9));
        let angles = evenly_spaced(0.0, 170.0, 18);
        let sinogram = project(&image, &angles, 16).unwrap();
        for t in 0..angles.len() {
            let total: f32 = sinogram.projection(t).iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "tilt {}: {}", t, total);
        }
    }

    #[test]
    fn test_zero_degree_projection_sums_rows() {
        let image = Image {
            width: 2,
            height: 2,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        // At 0 degrees t = y. Row 0 at t = -0.5 splits evenly over rays
        // 0 and 1; row 1 at t = 0.5 would need a ray 2, so is dropped
        // just as the back-projector drops it.
        let sinogram = project(&image, &[0.0], 2).unwrap();
        assert_eq!(sinogram.data, vec![1.5, 1.5]);
    }

    #[test]
    fn test_project_is_adjoint_of_back_projection() {
        // <P x, s> == <x, B s> with B the raw (unnormalised) back-projector.
        let size = 12;
        let angles = evenly_spaced(-60.0, 60.0, 9);
        let image = disk_phantom(size, 4.0);
        let projected = project(&image, &angles, size).unwrap();

        let sinogram = Sinogram {
            rays: size,
            tilts: angles.len(),
            data: (0..size * angles.len()).map(|i| ((i * 7) % 5) as f32).collect(),
        };
        let back = unweighted_back_projection(&sinogram, &angles, Normalization::None).unwrap();

        let lhs: f64 = projected
            .data
            .iter()
            .zip(sinogram.data.iter())
            .map(|(a, b)| (a * b) as f64)
            .sum();
        let rhs: f64 = image
            .data
            .iter()
            .zip(back.data.iter())
            .map(|(a, b)| (a * b) as f64)
            .sum();
        assert!((lhs - rhs).abs() < 1e-3 * lhs.abs().max(1.0), "{} vs {}", lhs, rhs);
    }

    #[test]
    fn test_point_source_round_trip() {
        let size = 32;
        let point = (12, 19);
        let angles = evenly_spaced(0.0, 178.0, 90);
        let sinogram = project(&point_phantom(size, point), &angles, size).unwrap();

        // Unfiltered: the peak lands on the point, smeared by 1/r.
        let blurred = unweighted_back_projection(&sinogram, &angles, Normalization::Standard).unwrap();
        assert_eq!(argmax(&blurred), point);
        let peak = blurred[point];
        assert!(blurred[(point.0, point.1 + 3)] < 0.5 * peak);
        assert!(blurred[(point.0 - 3, point.1)] < 0.5 * peak);

        // The ramp filter sharpens the peak relative to its surroundings.
        let mut filtered = sinogram.clone();
        filter_sinogram(&mut filtered, ProjectionFilter::Ramp).unwrap();
        let sharp = unweighted_back_projection(&filtered, &angles, Normalization::Standard).unwrap();
        assert_eq!(argmax(&sharp), point);
        let ratio = |s: &ReconstructedSlice| s[(point.0, point.1 + 3)].abs() / s[point];
        assert!(ratio(&sharp) < ratio(&blurred));
    }

    #[test]
    fn test_filtered_disk_recovers_values() {
        let size = 32;
        let angles = evenly_spaced(0.0, 178.0, 90);
        let disk = disk_phantom(size, 8.0);
        let mut sinogram = project(&disk, &angles, size).unwrap();
        filter_sinogram(&mut sinogram, ProjectionFilter::Ramp).unwrap();
        let slice = unweighted_back_projection(&sinogram, &angles, Normalization::Standard).unwrap();

        let centre = slice[(16, 16)];
        assert!(centre > 0.7 && centre < 1.3, "centre {}", centre);
        let outside = slice[(16, 30)];
        assert!(outside.abs() < 0.3, "outside {}", outside);
    }

    #[test]
    fn test_tilt_series_from_phantoms() {
        let angles = [0.0, 60.0, 120.0];
        let phantoms = vec![point_phantom(4, (1, 1)), point_phantom(4, (2, 3))];
        let series = tilt_series_from_phantoms(&phantoms, &angles, 4).unwrap();
        assert_eq!(series.dims(), [2, 4, 3]);
        assert_eq!(series.tilt_angles(), &angles[..]);

        for (x, phantom) in phantoms.iter().enumerate() {
            let expected = project(phantom, &angles, 4).unwrap();
            assert_eq!(extract_sinogram(&series, x).unwrap(), expected);
        }
    }

    #[test]
    fn test_stacking_checks() {
        assert!(matches!(
            tilt_series_from_sinograms(&[], &[]),
            Err(ReconError::InvalidInput(_))
        ));
        let a = Sinogram::zeros(4, 2);
        let b = Sinogram::zeros(5, 2);
        assert!(tilt_series_from_sinograms(&[a, b], &[0.0, 1.0]).is_err());
        assert!(matches!(
            project(&point_phantom(4, (0, 0)), &[0.0], 1),
            Err(ReconError::InvalidArgument(_))
        ));
    }
}
