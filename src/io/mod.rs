pub mod csv;
pub mod filenames;
pub mod netcdf;
pub mod results;

use crate::particle::Particle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] ::netcdf::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Missing output variable: {0}")]
    MissingVariable(String),
}

/// Destination for particle snapshots taken at the output cadence.
pub trait TrajectorySink {
    /// Record the state of every live particle at `time` (seconds since the
    /// field origin). `particles` is in ascending id order.
    fn write_snapshot(&mut self, time: f64, particles: &[Particle]) -> Result<(), OutputError>;

    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl TrajectorySink for Vec<Box<dyn TrajectorySink>> {
    fn write_snapshot(&mut self, time: f64, particles: &[Particle]) -> Result<(), OutputError> {
        for sink in self.iter_mut() {
            sink.write_snapshot(time, particles)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        for sink in self.iter_mut() {
            sink.finish()?;
        }
        Ok(())
    }
}
