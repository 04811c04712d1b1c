//
// Tilt-series reconstruction
//
// Reconstructs a volume from a tomographic tilt series one x-slice at a
// time: pull out the slice's sinogram, optionally weight it, and
// back-project it onto a square grid.
//

pub mod angles;
pub mod backprojection;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod sinogram;
pub mod tomo_image;
pub mod tomo_scan;
pub mod volume;

pub use backprojection::{
    back_project, unweighted_back_projection, BackProjectionOptions, Interpolation, Normalization,
    ReconstructedSlice,
};
pub use config::{Execution, ReconstructionConfig};
pub use driver::{
    CancelToken, ChannelProgress, DriverState, NoProgress, Progress, ReconstructionDriver,
    RunOutcome, SliceEvent,
};
pub use error::{ReconError, Result};
pub use filter::{FilterPlan, ProjectionFilter};
pub use sinogram::{extract_sinogram, extract_sinogram_with, Sinogram, SinogramOptions};
pub use volume::{Extent, ImageVolume, ReconstructedVolume, ScalarArray, TiltSeries, Voxel, TILT_ANGLES};
