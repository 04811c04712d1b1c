//
// Tilt angles
//
// Angles are kept in degrees everywhere outside the inner loops, since
// that is how they are acquired and edited.
//

use std::f64::consts::PI;

#[inline]
pub fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

// Inclusive, evenly spaced angles from start to end, the usual way a
// tilt scheme is written down ("-70 to 70 in 71 steps").
pub fn evenly_spaced(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + i as f64 * step).collect()
        }
    }
}

// Precomputed (cos, sin) of each tilt, in f32 for the inner loops.
pub(crate) fn trig_table(angles_deg: &[f64]) -> Vec<(f32, f32)> {
    angles_deg
        .iter()
        .map(|&a| {
            let rad = to_radians(a);
            (rad.cos() as f32, rad.sin() as f32)
        })
        .collect()
}
