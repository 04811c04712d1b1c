//
// Volumes
//
// The tilt series that goes into a reconstruction, the pipeline-shaped
// image volume it is usually unpacked from, and the reconstructed
// volume that comes out.
//
// Tilt series are stored X-fastest, Z-slowest: X indexes the slices
// that are reconstructed independently, Y indexes rays along a
// projection, and Z indexes the tilts.
//

use std::collections::BTreeMap;
use std::ops::Index;

use itertools::iproduct;

use crate::backprojection::ReconstructedSlice;
use crate::error::{ReconError, Result};

/// Name of the field array holding one tilt angle (degrees) per Z index.
pub const TILT_ANGLES: &str = "tilt_angles";

////////////////////////////////////////////////////////////////////////
// Numeric element kinds
//
// Input data comes in one of a closed set of element types. Everything
// is converted to f32 once, when the tilt series is built, and all the
// numerics afterwards work in f32.
//

mod sealed {
    pub trait Sealed {}
}

pub trait Voxel: Copy + sealed::Sealed {
    fn to_f32(self) -> f32;
}

macro_rules! impl_voxel {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl Voxel for $t {
                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_voxel!(u8, i8, u16, i16, u32, i32, f32, f64);

pub fn widen<T: Voxel>(data: &[T]) -> Vec<f32> {
    data.iter().map(|v| v.to_f32()).collect()
}

/// Scalars as handed over by the data pipeline, tagged with their type.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarArray {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ScalarArray {
    pub fn len(&self) -> usize {
        match self {
            ScalarArray::U8(v) => v.len(),
            ScalarArray::I8(v) => v.len(),
            ScalarArray::U16(v) => v.len(),
            ScalarArray::I16(v) => v.len(),
            ScalarArray::U32(v) => v.len(),
            ScalarArray::I32(v) => v.len(),
            ScalarArray::F32(v) => v.len(),
            ScalarArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            ScalarArray::U8(v) => widen(v),
            ScalarArray::I8(v) => widen(v),
            ScalarArray::U16(v) => widen(v),
            ScalarArray::I16(v) => widen(v),
            ScalarArray::U32(v) => widen(v),
            ScalarArray::I32(v) => widen(v),
            ScalarArray::F32(v) => v.clone(),
            ScalarArray::F64(v) => widen(v),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// Extents and pipeline-shaped volumes
//

/// Inclusive index bounds `[x_min, x_max, y_min, y_max, z_min, z_max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent(pub [i32; 6]);

impl Extent {
    pub fn from_dims([x, y, z]: [usize; 3]) -> Extent {
        Extent([0, x as i32 - 1, 0, y as i32 - 1, 0, z as i32 - 1])
    }

    pub fn dims(&self) -> Result<[usize; 3]> {
        let e = &self.0;
        let mut dims = [0; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            let (lo, hi) = (e[2 * axis], e[2 * axis + 1]);
            if hi < lo {
                return Err(ReconError::InvalidInput(format!(
                    "empty extent {:?} along axis {}",
                    e, axis
                )));
            }
            *dim = (hi as i64 - lo as i64 + 1) as usize;
        }
        Ok(dims)
    }
}

/// A 3D scalar image plus named side arrays, the way the surrounding
/// pipeline hands data over.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageVolume {
    pub extent: Extent,
    pub scalars: ScalarArray,
    pub field_data: BTreeMap<String, Vec<f64>>,
}

impl ImageVolume {
    pub fn new(extent: Extent, scalars: ScalarArray) -> ImageVolume {
        ImageVolume {
            extent,
            scalars,
            field_data: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, values: Vec<f64>) -> ImageVolume {
        self.field_data.insert(name.to_string(), values);
        self
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.field_data.get(name).map(|v| v.as_slice())
    }
}

////////////////////////////////////////////////////////////////////////
// Tilt series
//

#[derive(Clone, Debug, PartialEq)]
pub struct TiltSeries {
    dims: [usize; 3],
    data: Vec<f32>,
    tilt_angles: Vec<f64>,
}

impl TiltSeries {
    pub fn new(dims: [usize; 3], data: Vec<f32>, tilt_angles: Vec<f64>) -> Result<TiltSeries> {
        let [x, y, z] = dims;
        if x == 0 || y == 0 || z == 0 {
            return Err(ReconError::InvalidInput(format!(
                "tilt series dimensions {:?} must all be non-zero",
                dims
            )));
        }
        let expected = x
            .checked_mul(y)
            .and_then(|xy| xy.checked_mul(z))
            .ok_or_else(|| ReconError::InvalidInput(format!("dimensions {:?} overflow", dims)))?;
        if data.len() != expected {
            return Err(ReconError::InvalidInput(format!(
                "{} scalars do not fill dimensions {:?} ({} expected)",
                data.len(),
                dims,
                expected
            )));
        }
        check_tilt_angles(&tilt_angles, z)?;

        Ok(TiltSeries {
            dims,
            data,
            tilt_angles,
        })
    }

    pub fn from_voxels<T: Voxel>(
        dims: [usize; 3],
        data: &[T],
        tilt_angles: Vec<f64>,
    ) -> Result<TiltSeries> {
        TiltSeries::new(dims, widen(data), tilt_angles)
    }

    pub fn from_image_volume(volume: &ImageVolume) -> Result<TiltSeries> {
        let dims = volume.extent.dims()?;
        let tilt_angles = volume.field(TILT_ANGLES).ok_or_else(|| {
            ReconError::InvalidInput(format!("no \"{}\" array on the volume", TILT_ANGLES))
        })?;
        TiltSeries::new(dims, volume.scalars.to_f32(), tilt_angles.to_vec())
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn num_slices(&self) -> usize {
        self.dims[0]
    }

    pub fn num_rays(&self) -> usize {
        self.dims[1]
    }

    pub fn num_tilts(&self) -> usize {
        self.dims[2]
    }

    pub fn tilt_angles(&self) -> &[f64] {
        &self.tilt_angles
    }

    /// Replace the tilt angles, e.g. after the user corrected them.
    pub fn set_tilt_angles(&mut self, tilt_angles: Vec<f64>) -> Result<()> {
        check_tilt_angles(&tilt_angles, self.num_tilts())?;
        self.tilt_angles = tilt_angles;
        Ok(())
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self[(x, y, z)]
    }

    /// Mean over all tilts of each (x, y) projection pixel, X-fastest.
    pub fn average_projection(&self) -> Vec<f32> {
        let [x_dim, y_dim, z_dim] = self.dims;
        let plane = x_dim * y_dim;
        let mut average = vec![0.0f32; plane];
        for projection in self.data.chunks_exact(plane) {
            for (acc, v) in average.iter_mut().zip(projection) {
                *acc += v;
            }
        }
        let scale = 1.0 / z_dim as f32;
        average.iter_mut().for_each(|v| *v *= scale);
        average
    }
}

impl Index<(usize, usize, usize)> for TiltSeries {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &f32 {
        let [x_dim, y_dim, _] = self.dims;
        &self.data[(z * y_dim + y) * x_dim + x]
    }
}

fn check_tilt_angles(tilt_angles: &[f64], num_tilts: usize) -> Result<()> {
    if tilt_angles.len() != num_tilts {
        return Err(ReconError::InvalidInput(format!(
            "{} tilt angles for {} tilts",
            tilt_angles.len(),
            num_tilts
        )));
    }
    if let Some(bad) = tilt_angles.iter().find(|a| !a.is_finite()) {
        return Err(ReconError::InvalidInput(format!("non-finite tilt angle {}", bad)));
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// Reconstructed volume
//
// Stored slice-major, each x-slice a contiguous size * size block laid
// out like a ReconstructedSlice (iy * size + iz), so slices can be
// written independently.
//

#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructedVolume {
    num_slices: usize,
    size: usize,
    data: Vec<f32>,
}

impl ReconstructedVolume {
    pub fn zeroed(num_slices: usize, size: usize) -> Result<ReconstructedVolume> {
        let len = num_slices
            .checked_mul(size)
            .and_then(|v| v.checked_mul(size))
            .ok_or(ReconError::AllocationFailure { bytes: usize::MAX })?;
        let bytes = len.saturating_mul(std::mem::size_of::<f32>());

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ReconError::AllocationFailure { bytes })?;
        data.resize(len, 0.0);

        Ok(ReconstructedVolume {
            num_slices,
            size,
            data,
        })
    }

    /// `[num_slices, size, size]`
    pub fn dims(&self) -> [usize; 3] {
        [self.num_slices, self.size, self.size]
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn slice(&self, x: usize) -> &[f32] {
        let n = self.size * self.size;
        &self.data[x * n..(x + 1) * n]
    }

    pub fn slice_mut(&mut self, x: usize) -> &mut [f32] {
        let n = self.size * self.size;
        &mut self.data[x * n..(x + 1) * n]
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self[(x, y, z)]
    }

    pub fn insert_slice(&mut self, x: usize, slice: &ReconstructedSlice) -> Result<()> {
        if x >= self.num_slices {
            return Err(ReconError::InvalidArgument(format!(
                "slice {} outside volume of {} slices",
                x, self.num_slices
            )));
        }
        if slice.size != self.size {
            return Err(ReconError::InvalidArgument(format!(
                "slice of size {} does not fit volume of size {}",
                slice.size, self.size
            )));
        }
        self.slice_mut(x).copy_from_slice(&slice.data);
        Ok(())
    }

    /// Export in the pipeline's image layout: X fastest, then Y, then Z.
    pub fn to_x_fastest(&self) -> Vec<f32> {
        let (nx, n) = (self.num_slices, self.size);
        let mut out = vec![0.0f32; self.data.len()];
        for (x, y, z) in iproduct!(0..nx, 0..n, 0..n) {
            out[(z * n + y) * nx + x] = self[(x, y, z)];
        }
        out
    }
}

impl Index<(usize, usize, usize)> for ReconstructedVolume {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &f32 {
        &self.data[(x * self.size + y) * self.size + z]
    }
}
