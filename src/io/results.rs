// Counters collected over a whole run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub snapshots: usize,
    pub released: u64,
    pub deleted: usize,
    /// Deletions caused by a recovered kernel error (subset of `deleted`)
    pub recovered: usize,
    pub alive: usize,
    pub end_time: f64,
}

impl RunSummary {
    pub fn log(&self) {
        log::info!(
            "Run finished after {} steps ({:.1} days): {} snapshots, {} released, {} deleted ({} out of bounds), {} alive",
            self.steps,
            self.end_time / 86_400.0,
            self.snapshots,
            self.released,
            self.deleted,
            self.recovered,
            self.alive
        );
    }
}
