//
// Reconstruction driver
//
// Runs sinogram extraction, optional weighting and back-projection over
// every x-slice of a tilt series, and assembles the slices into a
// volume. After each slice it hands the finished slice to a Progress
// observer (for a live preview) and checks a shared cancel flag.
//
// The per-slice work only reads the tilt series and writes its own
// block of the output volume, so slices can run in parallel.
//

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::angles::trig_table;
use crate::backprojection::{back_project_into, BackProjectionOptions, ReconstructedSlice};
use crate::config::{Execution, ReconstructionConfig};
use crate::error::Result;
use crate::filter::FilterPlan;
use crate::sinogram::{extract_sinogram_with, SinogramOptions};
use crate::volume::{ReconstructedVolume, TiltSeries};

////////////////////////////////////////////////////////////////////////
// Cancellation and progress
//

/// Shared cancel flag. Cloning shares the flag; a canceled token stays
/// canceled until `reset`, so a fresh run needs a reset (or new) token.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Told about every finished slice. In parallel runs calls arrive from
/// worker threads and out of slice order.
pub trait Progress: Sync {
    fn slice_done(&self, index: usize, slice: &ReconstructedSlice);
}

impl<F> Progress for F
where
    F: Fn(usize, &ReconstructedSlice) + Sync,
{
    fn slice_done(&self, index: usize, slice: &ReconstructedSlice) {
        self(index, slice)
    }
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn slice_done(&self, _index: usize, _slice: &ReconstructedSlice) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct SliceEvent {
    pub index: usize,
    pub slice: ReconstructedSlice,
}

/// Forwards each finished slice down a channel, for a consumer on
/// another thread. Events are dropped once the receiver hangs up.
pub struct ChannelProgress {
    sender: Mutex<Sender<SliceEvent>>,
}

impl ChannelProgress {
    pub fn new() -> (ChannelProgress, Receiver<SliceEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            ChannelProgress {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl Progress for ChannelProgress {
    fn slice_done(&self, index: usize, slice: &ReconstructedSlice) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(SliceEvent {
                index,
                slice: slice.clone(),
            });
        }
    }
}

////////////////////////////////////////////////////////////////////////
// Driver
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Completed,
    Canceled,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(ReconstructedVolume),
    /// Only the slices that finished before the cancel are filled in,
    /// the rest are zero. In parallel runs these need not be a prefix.
    Canceled {
        volume: ReconstructedVolume,
        slices_done: usize,
    },
}

impl RunOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunOutcome::Canceled { .. })
    }

    pub fn volume(&self) -> &ReconstructedVolume {
        match self {
            RunOutcome::Completed(volume) => volume,
            RunOutcome::Canceled { volume, .. } => volume,
        }
    }

    pub fn into_volume(self) -> ReconstructedVolume {
        match self {
            RunOutcome::Completed(volume) => volume,
            RunOutcome::Canceled { volume, .. } => volume,
        }
    }
}

// Everything one slice needs, set up once per run.
struct SliceWork<'a> {
    series: &'a TiltSeries,
    sinogram: SinogramOptions,
    plan: FilterPlan,
    trig: Vec<(f32, f32)>,
    back_projection: BackProjectionOptions,
    size: usize,
}

impl<'a> SliceWork<'a> {
    fn new(config: &ReconstructionConfig, series: &'a TiltSeries) -> SliceWork<'a> {
        let size = config.slice_size(series.num_rays());
        SliceWork {
            series,
            sinogram: config.sinogram_options(),
            plan: FilterPlan::new(config.filter, size),
            trig: trig_table(series.tilt_angles()),
            back_projection: config.back_projection_options(),
            size,
        }
    }

    fn reconstruct(&self, x: usize) -> Result<ReconstructedSlice> {
        let mut sinogram = extract_sinogram_with(self.series, x, &self.sinogram)?;
        self.plan.apply(&mut sinogram)?;
        let mut slice = ReconstructedSlice::zeros(self.size);
        back_project_into(&sinogram, &self.trig, &self.back_projection, &mut slice.data);
        Ok(slice)
    }
}

pub struct ReconstructionDriver {
    config: ReconstructionConfig,
    state: DriverState,
}

impl ReconstructionDriver {
    pub fn new(config: ReconstructionConfig) -> ReconstructionDriver {
        ReconstructionDriver {
            config,
            state: DriverState::Idle,
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// One progress step per x-slice.
    pub fn total_progress_steps(&self, series: &TiltSeries) -> usize {
        series.num_slices()
    }

    /// Reconstruct every slice of `series`. Configuration problems and
    /// allocation failure are reported before any slice is touched.
    pub fn run<P: Progress + ?Sized>(
        &mut self,
        series: &TiltSeries,
        progress: &P,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        self.state = DriverState::Idle;
        self.config.validate()?;

        let total = self.total_progress_steps(series);
        let work = SliceWork::new(&self.config, series);
        let mut volume = ReconstructedVolume::zeroed(total, work.size)?;

        info!(
            "Reconstructing {} slices of {} rays x {} tilts onto {}x{} ({} filter, {:?})",
            total,
            series.num_rays(),
            series.num_tilts(),
            work.size,
            work.size,
            self.config.filter,
            self.config.execution
        );
        self.state = DriverState::Running;

        let result = match self.config.execution {
            Execution::Serial => run_serial(&work, &mut volume, progress, cancel),
            Execution::Parallel => run_parallel(&work, &mut volume, progress, cancel),
        };
        let slices_done = match result {
            Ok(done) => done,
            Err(e) => {
                self.state = DriverState::Idle;
                return Err(e);
            }
        };

        // A cancel raised while the last slice was being reported still
        // counts, even though nothing was left to skip.
        if slices_done == total && !cancel.is_canceled() {
            info!("Reconstruction complete");
            self.state = DriverState::Completed;
            Ok(RunOutcome::Completed(volume))
        } else {
            warn!("Reconstruction canceled after {} of {} slices", slices_done, total);
            self.state = DriverState::Canceled;
            Ok(RunOutcome::Canceled {
                volume,
                slices_done,
            })
        }
    }
}

fn run_serial<P: Progress + ?Sized>(
    work: &SliceWork,
    volume: &mut ReconstructedVolume,
    progress: &P,
    cancel: &CancelToken,
) -> Result<usize> {
    let total = volume.num_slices();
    for x in 0..total {
        if cancel.is_canceled() {
            return Ok(x);
        }
        let slice = work.reconstruct(x)?;
        volume.insert_slice(x, &slice)?;
        debug!("Slice {} of {} done", x + 1, total);
        progress.slice_done(x, &slice);
    }
    Ok(total)
}

fn run_parallel<P: Progress + ?Sized>(
    work: &SliceWork,
    volume: &mut ReconstructedVolume,
    progress: &P,
    cancel: &CancelToken,
) -> Result<usize> {
    let total = volume.num_slices();
    let done = AtomicUsize::new(0);
    volume
        .data_mut()
        .par_chunks_mut(work.size * work.size)
        .enumerate()
        .try_for_each(|(x, out)| -> Result<()> {
            if cancel.is_canceled() {
                return Ok(());
            }
            let slice = work.reconstruct(x)?;
            out.copy_from_slice(&slice.data);
            done.fetch_add(1, Ordering::Relaxed);
            debug!("Slice {} of {} done", x + 1, total);
            progress.slice_done(x, &slice);
            Ok(())
        })?;
    Ok(done.into_inner())
}
