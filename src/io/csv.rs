use super::{OutputError, TrajectorySink};
use crate::particle::Particle;
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::path::Path;

/// Long-format trajectory output, one row per particle per snapshot.
pub struct CsvTrajectoryWriter {
    wtr: Writer<File>,
    rows: usize,
}

impl CsvTrajectoryWriter {
    // Create CSV writer with headers
    pub fn create(path: &Path) -> Result<Self, OutputError> {
        let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
        wtr.write_record(["trajectory", "time", "lon", "lat", "z", "drift_time"])?;
        Ok(CsvTrajectoryWriter { wtr, rows: 0 })
    }

    #[cfg(test)]
    pub fn rows_written(&self) -> usize {
        self.rows
    }
}

impl TrajectorySink for CsvTrajectoryWriter {
    fn write_snapshot(&mut self, time: f64, particles: &[Particle]) -> Result<(), OutputError> {
        for p in particles {
            self.wtr.write_record(&[
                p.id.to_string(),
                time.to_string(),
                p.lon.to_string(),
                p.lat.to_string(),
                p.depth.to_string(),
                p.drift_time.to_string(),
            ])?;
        }
        self.rows += particles.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.wtr.flush()?;
        log::info!("Wrote {} trajectory rows to CSV", self.rows);
        Ok(())
    }
}
