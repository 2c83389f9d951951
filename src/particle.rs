use crate::seeding::ReleasePoint;

const RELEASE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleState {
    /// Not yet run through the kernels this step
    Evaluate,
    Success,
    /// Left the field domain; awaiting its recovery kernel
    ErrorOutOfBounds,
    Delete,
}

/// A virtual surface drifter.
#[derive(Debug, Clone)]
pub struct Particle {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
    pub depth: f64,
    /// Seconds since the field origin
    pub time: f64,
    /// Accumulated drift time in seconds
    pub drift_time: f64,
    pub state: ParticleState,
    /// Last grid cell the particle was found in
    pub cell: Option<(usize, usize)>,
}

impl Particle {
    pub fn new(id: u64, point: &ReleasePoint, time: f64) -> Self {
        Particle {
            id,
            lon: point.lon,
            lat: point.lat,
            depth: point.depth,
            time,
            drift_time: 0.0,
            state: ParticleState::Evaluate,
            cell: None,
        }
    }

    pub fn delete(&mut self) {
        self.state = ParticleState::Delete;
    }

    pub fn is_deleted(&self) -> bool {
        self.state == ParticleState::Delete
    }
}

/// Live particles plus the release schedule that feeds new batches in.
#[derive(Debug)]
pub struct ParticleSet {
    particles: Vec<Particle>,
    release_points: Vec<ReleasePoint>,
    repeat_dt: Option<f64>,
    next_release: f64,
    next_id: u64,
    batches_released: usize,
}

impl ParticleSet {
    /// Create the set and release the first batch at `start_time`. With
    /// `repeat_dt`, an identical batch follows every `repeat_dt` seconds.
    pub fn from_list(release_points: Vec<ReleasePoint>, start_time: f64, repeat_dt: Option<f64>) -> Self {
        let mut pset = ParticleSet {
            particles: Vec::with_capacity(release_points.len()),
            release_points,
            repeat_dt: repeat_dt.filter(|dt| *dt > 0.0),
            next_release: start_time,
            next_id: 0,
            batches_released: 0,
        };
        pset.release_batch(start_time);
        pset.next_release = match pset.repeat_dt {
            Some(dt) => start_time + dt,
            None => f64::INFINITY,
        };
        pset
    }

    fn release_batch(&mut self, time: f64) -> usize {
        for point in &self.release_points {
            self.particles.push(Particle::new(self.next_id, point, time));
            self.next_id += 1;
        }
        self.batches_released += 1;
        self.release_points.len()
    }

    /// Release every repeat batch scheduled at or before `time`. Returns the
    /// number of particles added.
    pub fn release_due(&mut self, time: f64) -> usize {
        let Some(dt) = self.repeat_dt else {
            return 0;
        };
        let mut added = 0;
        while self.next_release <= time + RELEASE_TOLERANCE {
            let release_time = self.next_release;
            added += self.release_batch(release_time);
            self.next_release = release_time + dt;
        }
        added
    }

    /// Drop deleted particles, keeping the others in id order.
    pub fn remove_deleted(&mut self) -> usize {
        let before = self.particles.len();
        self.particles.retain(|p| !p.is_deleted());
        before - self.particles.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn release_points(&self) -> &[ReleasePoint] {
        &self.release_points
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn batches_released(&self) -> usize {
        self.batches_released
    }

    pub fn total_released(&self) -> u64 {
        self.next_id
    }
}
