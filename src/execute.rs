use crate::field::{FieldError, FieldSet};
use crate::io::results::RunSummary;
use crate::io::{OutputError, TrajectorySink};
use crate::kernels::{KernelChain, KernelError, Recovery, StepOutcome};
use crate::particle::ParticleSet;
use indicatif::ProgressBar;
use rayon::prelude::*;
use thiserror::Error;

// Snapshot times are compared with this slack to absorb rounding in `time += dt`
const TIME_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Field error: {0}")]
    Field(#[from] FieldError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Particle {id} failed without a recovery kernel: {source}")]
    Unrecovered {
        id: u64,
        #[source]
        source: KernelError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid schedule: {0}")]
    Schedule(String),
}

/// Integration window and output cadence, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// Start time relative to the field origin
    pub start: f64,
    pub runtime: f64,
    pub dt: f64,
    pub output_dt: f64,
}

impl Schedule {
    pub fn n_steps(&self) -> usize {
        (self.runtime / self.dt).round() as usize
    }

    fn validate(&self) -> Result<(), ExecuteError> {
        if !(self.dt > 0.0 && self.runtime >= 0.0 && self.output_dt > 0.0) {
            return Err(ExecuteError::Schedule(format!(
                "runtime={} dt={} output_dt={}",
                self.runtime, self.dt, self.output_dt
            )));
        }
        Ok(())
    }
}

/// How the run is carried out, as opposed to what is simulated.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions<'a> {
    /// Size of the rayon pool; 0 is treated as 1
    pub threads: usize,
    pub progress: Option<&'a ProgressBar>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StepTally {
    deleted: usize,
    recovered: usize,
}

impl StepTally {
    fn merge(self, other: StepTally) -> StepTally {
        StepTally {
            deleted: self.deleted + other.deleted,
            recovered: self.recovered + other.recovered,
        }
    }
}

/// Advance `pset` through `fieldset` for the whole schedule.
///
/// Each step releases any repeat batch that is due, loads the field slices
/// the step needs, then runs `chain` on every particle in parallel. Deleted
/// particles are dropped before the next snapshot, which is taken whenever
/// the clock reaches a multiple of `output_dt`.
pub fn execute(
    pset: &mut ParticleSet,
    fieldset: &mut FieldSet,
    chain: &KernelChain,
    recovery: &Recovery,
    schedule: Schedule,
    sink: &mut dyn TrajectorySink,
    options: ExecuteOptions<'_>,
) -> Result<RunSummary, ExecuteError> {
    schedule.validate()?;
    let threads = options.threads.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;

    let n_steps = schedule.n_steps();
    let dt = schedule.dt;
    let mut time = schedule.start;
    let mut next_output = schedule.start + schedule.output_dt;
    let mut summary = RunSummary::default();

    log::info!(
        "Executing {} steps of {} s with kernels {:?} on {} threads",
        n_steps,
        dt,
        chain.names(),
        threads
    );

    for step in 0..n_steps {
        let released = pset.release_due(time);
        if released > 0 {
            log::debug!("Step {}: released {} particles at t={}", step, released, time);
        }

        fieldset.prepare(time, time + dt)?;
        let fs: &FieldSet = fieldset;

        let tally = if pset.is_empty() {
            StepTally::default()
        } else {
            pool.install(|| {
                pset.particles_mut()
                    .par_iter_mut()
                    .map(|p| -> Result<StepTally, ExecuteError> {
                        let outcome = chain
                            .evaluate(p, fs, time, dt, recovery)
                            .map_err(|source| ExecuteError::Unrecovered { id: p.id, source })?;
                        p.time = time + dt;
                        Ok(match outcome {
                            StepOutcome::Completed => StepTally::default(),
                            StepOutcome::Deleted => StepTally { deleted: 1, recovered: 0 },
                            StepOutcome::Recovered(_) => StepTally {
                                deleted: usize::from(p.is_deleted()),
                                recovered: 1,
                            },
                        })
                    })
                    .try_reduce(StepTally::default, |a, b| Ok(a.merge(b)))
            })?
        };

        let removed = pset.remove_deleted();
        debug_assert_eq!(removed, tally.deleted);
        summary.deleted += removed;
        summary.recovered += tally.recovered;
        summary.steps += 1;
        time = schedule.start + (step + 1) as f64 * dt;

        if time + TIME_TOLERANCE >= next_output {
            sink.write_snapshot(time, pset.particles())?;
            summary.snapshots += 1;
            next_output += schedule.output_dt;
            log::debug!("Snapshot at t={} with {} particles", time, pset.len());
        }

        if let Some(pb) = options.progress {
            pb.inc(1);
            pb.set_message(format!("{} particles", pset.len()));
        }
    }

    sink.finish()?;
    if let Some(pb) = options.progress {
        pb.finish_with_message(format!("{} particles", pset.len()));
    }
    log::debug!(
        "Released {} batches of {} particles",
        pset.batches_released(),
        pset.release_points().len()
    );

    summary.released = pset.total_released();
    summary.alive = pset.len();
    summary.end_time = time;
    Ok(summary)
}
