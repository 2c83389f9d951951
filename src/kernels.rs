//! Per-particle update rules run once per timestep.
//!
//! Kernels are applied in the order they were added to a [`KernelChain`].
//! A kernel that deletes its particle ends that particle's step; the kernels
//! after it are skipped. Errors raised by a kernel are looked up in a
//! [`Recovery`] table, which may map them to another kernel (usually
//! [`DeleteParticle`]) instead of aborting the run.

use crate::field::{FieldError, FieldSet};
use crate::particle::{Particle, ParticleState};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("Particle {id} reached a non-finite position (lon={lon}, lat={lat})")]
    NonFinitePosition { id: u64, lon: f64, lat: f64 },
}

/// Category of a kernel failure, used as the key of a [`Recovery`] table.
///
/// Times outside the field range never reach a kernel: `FieldSet::prepare`
/// rejects them before the step starts, so they are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    OutOfBounds,
    Error,
}

impl ErrorCode {
    pub fn from_error(err: &KernelError) -> Self {
        match err {
            KernelError::Field(FieldError::OutOfBounds { .. }) => ErrorCode::OutOfBounds,
            _ => ErrorCode::Error,
        }
    }
}

pub trait Kernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Update `p` for the step from `time` to `time + dt` (seconds).
    fn apply(&self, p: &mut Particle, fieldset: &FieldSet, time: f64, dt: f64) -> Result<(), KernelError>;
}

/// Fourth-order Runge-Kutta advection in (lon, lat).
#[derive(Debug, Default, Clone, Copy)]
pub struct AdvectionRK4;

impl Kernel for AdvectionRK4 {
    fn name(&self) -> &'static str {
        "AdvectionRK4"
    }

    fn apply(&self, p: &mut Particle, fieldset: &FieldSet, time: f64, dt: f64) -> Result<(), KernelError> {
        let half = 0.5 * dt;
        let (u1, v1, hit) = fieldset.sample_uv(time, p.depth, p.lat, p.lon, p.cell)?;
        let hint = Some(hit.cell());

        let (lon1, lat1) = (p.lon + u1 * half, p.lat + v1 * half);
        let (u2, v2, _) = fieldset.sample_uv(time + half, p.depth, lat1, lon1, hint)?;

        let (lon2, lat2) = (p.lon + u2 * half, p.lat + v2 * half);
        let (u3, v3, _) = fieldset.sample_uv(time + half, p.depth, lat2, lon2, hint)?;

        let (lon3, lat3) = (p.lon + u3 * dt, p.lat + v3 * dt);
        let (u4, v4, _) = fieldset.sample_uv(time + dt, p.depth, lat3, lon3, hint)?;

        let lon = p.lon + (u1 + 2.0 * u2 + 2.0 * u3 + u4) / 6.0 * dt;
        let lat = p.lat + (v1 + 2.0 * v2 + 2.0 * v3 + v4) / 6.0 * dt;
        if !lon.is_finite() || !lat.is_finite() {
            return Err(KernelError::NonFinitePosition { id: p.id, lon, lat });
        }
        p.lon = lon;
        p.lat = lat;
        p.cell = hint;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodicBoundaryEast;

impl Kernel for PeriodicBoundaryEast {
    fn name(&self) -> &'static str {
        "PeriodicBoundaryEast"
    }

    fn apply(&self, p: &mut Particle, _: &FieldSet, _: f64, _: f64) -> Result<(), KernelError> {
        if p.lon > 180.0 {
            p.lon -= 360.0;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodicBoundaryWest;

impl Kernel for PeriodicBoundaryWest {
    fn name(&self) -> &'static str {
        "PeriodicBoundaryWest"
    }

    fn apply(&self, p: &mut Particle, _: &FieldSet, _: f64, _: f64) -> Result<(), KernelError> {
        if p.lon < -180.0 {
            p.lon += 360.0;
        }
        Ok(())
    }
}

/// Delete particles that drift north of `lat_cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct OffTheGrid {
    pub lat_cutoff: f64,
}

impl Kernel for OffTheGrid {
    fn name(&self) -> &'static str {
        "OffTheGrid"
    }

    fn apply(&self, p: &mut Particle, _: &FieldSet, _: f64, _: f64) -> Result<(), KernelError> {
        if p.lat > self.lat_cutoff {
            p.delete();
        }
        Ok(())
    }
}

/// Count drift time in fixed increments and delete once it reaches `max`.
#[derive(Debug, Clone, Copy)]
pub struct DriftTime {
    pub increment: f64,
    pub max: f64,
}

impl Kernel for DriftTime {
    fn name(&self) -> &'static str {
        "DriftTime"
    }

    fn apply(&self, p: &mut Particle, _: &FieldSet, _: f64, _: f64) -> Result<(), KernelError> {
        p.drift_time += self.increment;
        if p.drift_time >= self.max {
            p.delete();
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteParticle;

impl Kernel for DeleteParticle {
    fn name(&self) -> &'static str {
        "DeleteParticle"
    }

    fn apply(&self, p: &mut Particle, _: &FieldSet, _: f64, _: f64) -> Result<(), KernelError> {
        p.delete();
        Ok(())
    }
}

/// Kernels to run in place of a failed step, keyed by error category.
#[derive(Default)]
pub struct Recovery {
    handlers: HashMap<ErrorCode, Box<dyn Kernel>>,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, code: ErrorCode, kernel: impl Kernel + 'static) -> Self {
        self.handlers.insert(code, Box::new(kernel));
        self
    }

    pub fn handler(&self, code: ErrorCode) -> Option<&dyn Kernel> {
        self.handlers.get(&code).map(|k| k.as_ref())
    }
}

/// What happened to one particle during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Deleted,
    /// A kernel failed and the recovery kernel for this code ran instead
    Recovered(ErrorCode),
}

#[derive(Default)]
pub struct KernelChain {
    kernels: Vec<Box<dyn Kernel>>,
}

impl KernelChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, kernel: impl Kernel + 'static) -> Self {
        self.kernels.push(Box::new(kernel));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kernels.iter().map(|k| k.name()).collect()
    }

    /// Run the chain on one particle. Errors without a recovery handler are
    /// returned to the caller.
    pub fn evaluate(
        &self,
        p: &mut Particle,
        fieldset: &FieldSet,
        time: f64,
        dt: f64,
        recovery: &Recovery,
    ) -> Result<StepOutcome, KernelError> {
        p.state = ParticleState::Evaluate;
        for kernel in &self.kernels {
            if let Err(err) = kernel.apply(p, fieldset, time, dt) {
                let code = ErrorCode::from_error(&err);
                if code == ErrorCode::OutOfBounds {
                    p.state = ParticleState::ErrorOutOfBounds;
                }
                let Some(handler) = recovery.handler(code) else {
                    return Err(err);
                };
                log::debug!(
                    "Particle {} failed in {} ({}); running {}",
                    p.id,
                    kernel.name(),
                    err,
                    handler.name()
                );
                handler.apply(p, fieldset, time, dt)?;
                return Ok(StepOutcome::Recovered(code));
            }
            if p.is_deleted() {
                return Ok(StepOutcome::Deleted);
            }
        }
        p.state = ParticleState::Success;
        Ok(StepOutcome::Completed)
    }
}
